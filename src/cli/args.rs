//! CLI argument definitions using clap
//!
//! Commands:
//! - accdb db {append, import, get, delete, update, scan, repair, reindex, compact, verify}
//! - accdb codec {huff, lzw} {encode, decode} <in> <out>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// accdb - a tiny record database with Huffman and LZW file codecs
#[derive(Parser, Debug)]
#[command(name = "accdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record store and index operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Whole-file compression
    Codec {
        #[command(subcommand)]
        algorithm: CodecAlgorithm,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbAction {
    /// Append the contents of a file as a new record
    Append {
        /// File holding the payload
        payload: PathBuf,
        /// Require a 24-field ';'-separated accident row
        #[arg(long)]
        validate: bool,
    },

    /// Store every data row of a ';'-separated CSV file (header skipped)
    Import {
        /// CSV file
        csv: PathBuf,
        /// Accept rows with any number of fields
        #[arg(long)]
        no_validate: bool,
    },

    /// Print a record (payload base64-encoded unless --out is given)
    Get {
        /// Record id
        id: u32,
        /// Write the raw payload to this file instead
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Tombstone a record
    Delete {
        /// Record id
        id: u32,
    },

    /// Replace a record; the replacement gets a new id
    Update {
        /// Record id
        id: u32,
        /// File holding the new payload
        payload: PathBuf,
    },

    /// List records, one JSON line each
    Scan {
        /// Include tombstoned records
        #[arg(long)]
        all: bool,
    },

    /// Truncate a torn store tail and rebuild the index
    Repair,

    /// Rebuild the index from the store
    Reindex,

    /// Drop tombstoned frames and rebuild the index
    Compact,

    /// Check store checksums and index invariants
    Verify,
}

#[derive(Subcommand, Debug)]
pub enum CodecAlgorithm {
    /// Canonical Huffman
    Huff {
        #[command(subcommand)]
        direction: Direction,
    },

    /// Variable-width LZW
    Lzw {
        #[command(subcommand)]
        direction: Direction,
    },
}

#[derive(Subcommand, Debug)]
pub enum Direction {
    /// Compress <input> into <output>
    Encode {
        /// Input file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },

    /// Decompress <input> into <output>
    Decode {
        /// Input file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
}
