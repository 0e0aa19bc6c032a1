//! accdb configuration
//!
//! A single JSON file; every field is optional and falls back to its
//! default. Validation runs on load so a bad value fails before any data
//! file is opened.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CapPolicy, HuffmanConfig, LzwConfig};
use crate::index::IndexConfig;
use crate::lock::LockPolicy;
use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`Config`]
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        "ACCDB_CONFIG_ERROR"
    }
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the store and index files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Entries per index bucket
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: u32,

    /// Largest directory depth the index may grow to
    #[serde(default = "default_max_global_depth")]
    pub max_global_depth: u32,

    /// Lock retries after the first failed attempt
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Linear backoff step between lock attempts
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,

    /// Inputs shorter than this are stored raw by the Huffman codec
    #[serde(default = "default_huffman_min_compress_len")]
    pub huffman_min_compress_len: usize,

    /// Largest LZW code width
    #[serde(default = "default_lzw_max_width")]
    pub lzw_max_width: u8,

    /// "freeze" or "fail" once the LZW dictionary is full
    #[serde(default = "default_lzw_cap_policy")]
    pub lzw_cap_policy: String,

    /// Lowest log severity written to stderr
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./accdb-data")
}
fn default_bucket_capacity() -> u32 {
    IndexConfig::DEFAULT_BUCKET_CAPACITY
}
fn default_max_global_depth() -> u32 {
    IndexConfig::DEFAULT_MAX_GLOBAL_DEPTH
}
fn default_lock_retries() -> u32 {
    LockPolicy::DEFAULT_RETRIES
}
fn default_lock_backoff_ms() -> u64 {
    LockPolicy::DEFAULT_BACKOFF_MS
}
fn default_huffman_min_compress_len() -> usize {
    crate::codec::huffman::DEFAULT_MIN_COMPRESS_LEN
}
fn default_lzw_max_width() -> u8 {
    crate::codec::lzw::DEFAULT_MAX_WIDTH
}
fn default_lzw_cap_policy() -> String {
    "freeze".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bucket_capacity: default_bucket_capacity(),
            max_global_depth: default_max_global_depth(),
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
            huffman_min_compress_len: default_huffman_min_compress_len(),
            lzw_max_width: default_lzw_max_width(),
            lzw_cap_policy: default_lzw_cap_policy(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Check every value is in range
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bucket_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "bucket_capacity must be at least 2, got {}",
                self.bucket_capacity
            )));
        }
        if !(1..=32).contains(&self.max_global_depth) {
            return Err(ConfigError::Invalid(format!(
                "max_global_depth must be in 1..=32, got {}",
                self.max_global_depth
            )));
        }
        if !(crate::codec::lzw::MIN_WIDTH..=crate::codec::lzw::DEFAULT_MAX_WIDTH)
            .contains(&self.lzw_max_width)
        {
            return Err(ConfigError::Invalid(format!(
                "lzw_max_width must be in 9..=24, got {}",
                self.lzw_max_width
            )));
        }
        self.cap_policy()?;
        self.log_severity()?;
        Ok(())
    }

    /// Lock retry policy
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy::new(self.lock_retries, self.lock_backoff_ms)
    }

    /// Hash index settings
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            bucket_capacity: self.bucket_capacity,
            max_global_depth: self.max_global_depth,
            lock_policy: self.lock_policy(),
        }
    }

    /// Huffman codec settings
    pub fn huffman_config(&self) -> HuffmanConfig {
        HuffmanConfig {
            min_compress_len: self.huffman_min_compress_len,
        }
    }

    /// LZW codec settings
    pub fn lzw_config(&self) -> ConfigResult<LzwConfig> {
        Ok(LzwConfig {
            max_width: self.lzw_max_width,
            cap_policy: self.cap_policy()?,
        })
    }

    /// Parsed `log_level`
    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    fn cap_policy(&self) -> ConfigResult<CapPolicy> {
        match self.lzw_cap_policy.as_str() {
            "freeze" => Ok(CapPolicy::Freeze),
            "fail" => Ok(CapPolicy::Fail),
            other => Err(ConfigError::Invalid(format!(
                "lzw_cap_policy must be 'freeze' or 'fail', got '{}'",
                other
            ))),
        }
    }
}
