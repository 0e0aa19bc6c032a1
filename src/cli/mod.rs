//! CLI module for accdb
//!
//! Provides command-line access to:
//! - db: append, get, delete, update, scan, repair, reindex, compact, verify
//! - codec: Huffman and LZW whole-file encode/decode

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, CodecAlgorithm, Command, DbAction, Direction};
pub use commands::{execute, run};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
