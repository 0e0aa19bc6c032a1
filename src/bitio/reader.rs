//! MSB-first bit reader over a byte slice

/// Reads variable-width values from a byte slice, most significant bit first.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Next bit to read, counted from the start of `data`
    pos: u64,
    /// Number of readable bits (may be less than `data.len() * 8`)
    limit: u64,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over every bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len() as u64 * 8,
        }
    }

    /// Creates a reader that stops after `bit_len` bits, used when the
    /// trailing bits of the last byte are padding.
    pub fn with_bit_len(data: &'a [u8], bit_len: u64) -> Self {
        Self {
            data,
            pos: 0,
            limit: bit_len.min(data.len() as u64 * 8),
        }
    }

    /// Number of bits not yet consumed.
    pub fn remaining_bits(&self) -> u64 {
        self.limit - self.pos
    }

    /// Reads the next `width` bits (1..=32).
    ///
    /// Returns `None` without consuming anything when fewer than `width`
    /// bits remain.
    pub fn read_bits(&mut self, width: u8) -> Option<u32> {
        debug_assert!((1..=32).contains(&width), "bit width out of range: {}", width);
        let mut needed = u64::from(width);
        if self.remaining_bits() < needed {
            return None;
        }

        let mut value: u64 = 0;
        while needed > 0 {
            let byte = self.data[(self.pos / 8) as usize];
            let available = 8 - self.pos % 8;
            let take = available.min(needed);
            let shift = available - take;
            let chunk = (u64::from(byte) >> shift) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            self.pos += take;
            needed -= take;
        }
        Some(value as u32)
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitWriter;

    #[test]
    fn test_reads_msb_first() {
        let data = [0b1011_0001];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(1), Some(1));
        assert_eq!(r.read_bits(1), Some(0));
        assert_eq!(r.read_bits(6), Some(0b110001));
        assert_eq!(r.read_bits(1), None);
    }

    #[test]
    fn test_short_read_consumes_nothing() {
        let data = [0xFF, 0x80];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(12), Some(0xFF8));
        assert_eq!(r.remaining_bits(), 4);
        assert_eq!(r.read_bits(5), None);
        assert_eq!(r.remaining_bits(), 4);
        assert_eq!(r.read_bits(4), Some(0));
    }

    #[test]
    fn test_bit_len_limit_hides_padding() {
        let data = [0b1010_0000];
        let mut r = BitReader::with_bit_len(&data, 3);
        assert_eq!(r.remaining_bits(), 3);
        assert_eq!(r.read_bit(), Some(true));
        assert_eq!(r.read_bit(), Some(false));
        assert_eq!(r.read_bit(), Some(true));
        assert_eq!(r.read_bit(), None);
    }

    #[test]
    fn test_mixed_widths_match_writer() {
        let widths = [9u8, 10, 3, 32, 1, 17, 24];
        let values = [0x1AB, 0x3FF, 0x5, 0xCAFE_BABE, 0x1, 0x1_2345, 0xABCDEF];

        let mut w = BitWriter::new();
        for (v, width) in values.iter().zip(widths.iter()) {
            w.write_bits(*v, *width);
        }
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        for (v, width) in values.iter().zip(widths.iter()) {
            assert_eq!(r.read_bits(*width), Some(*v));
        }
        assert!(r.remaining_bits() < 8);
    }
}
