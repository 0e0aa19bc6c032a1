//! Bit-level I/O shared by the codecs
//!
//! Both directions are MSB-first: the first bit written lands in the most
//! significant bit of the first byte. This ordering is part of the on-disk
//! format of every compressed file.

mod reader;
mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;
