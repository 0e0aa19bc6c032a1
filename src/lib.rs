//! accdb - a tiny single-file record database
//!
//! - `storage`: append-only record store with SHA-256 framed records and tombstones
//! - `index`: disk-resident extendible hash index from record id to offset
//! - `db`: store plus index behind one facade
//! - `codec`: canonical Huffman and variable-width LZW file codecs over `bitio`
//! - `lock`: advisory file locks with bounded retry
//! - `config`, `observability`, `cli`: ambient plumbing

pub mod bitio;
pub mod cli;
pub mod codec;
pub mod config;
pub mod db;
pub mod index;
pub mod lock;
pub mod observability;
pub mod storage;
