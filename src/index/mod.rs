//! Extendible hash index subsystem for accdb
//!
//! Maps `u32` record ids to `u64` store offsets on disk. A directory of
//! `2^global_depth` slots points at fixed-size bucket pages; a full bucket
//! splits on its next key bit, doubling the directory only when the
//! bucket is already as deep as the directory.
//!
//! # Invariants
//!
//! - `local_depth <= global_depth` for every bucket
//! - A bucket is referenced by exactly the slots sharing its low
//!   `local_depth` bits, and every key it holds carries those bits
//! - Keys are unique; `put` on an existing key overwrites, never splits
//!
//! The index is derived state: it can always be rebuilt from a store scan.

mod bucket;
mod directory;
mod errors;
mod hash_index;

pub use bucket::{page_size, Bucket};
pub use directory::Directory;
pub use errors::{IndexError, IndexResult};
pub use hash_index::{HashIndex, IndexConfig, IndexStats};
