//! MSB-first bit writer over an in-memory byte buffer

/// Accumulates variable-width values into bytes, most significant bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    /// Completed bytes
    buf: Vec<u8>,
    /// Pending bits, right-aligned
    acc: u64,
    /// Number of pending bits in `acc` (always < 8 between calls)
    pending: u32,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer that appends after an already-written prefix
    /// (typically a codec header).
    pub fn with_prefix(prefix: Vec<u8>) -> Self {
        Self {
            buf: prefix,
            acc: 0,
            pending: 0,
        }
    }

    /// Appends the low `width` bits of `value`, most significant first.
    ///
    /// `width` must be in `1..=32`.
    pub fn write_bits(&mut self, value: u32, width: u8) {
        debug_assert!((1..=32).contains(&width), "bit width out of range: {}", width);
        let width = u32::from(width);
        let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };

        self.acc = (self.acc << width) | u64::from(value & mask);
        self.pending += width;

        while self.pending >= 8 {
            self.pending -= 8;
            self.buf.push((self.acc >> self.pending) as u8);
        }
        self.acc &= (1u64 << self.pending) - 1;
    }

    /// Appends a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(u32::from(bit), 1);
    }

    /// Zero-pads the final partial byte and returns how many padding bits
    /// were added (0–7).
    pub fn flush(&mut self) -> u8 {
        if self.pending == 0 {
            return 0;
        }
        let pad = 8 - self.pending;
        self.buf.push((self.acc << pad) as u8);
        self.acc = 0;
        self.pending = 0;
        pad as u8
    }

    /// Total number of bits written so far, including any prefix bytes.
    pub fn bit_len(&self) -> u64 {
        self.buf.len() as u64 * 8 + u64::from(self.pending)
    }

    /// Flushes and returns the underlying buffer.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush();
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_ordering() {
        let mut w = BitWriter::new();
        w.write_bits(0b1, 1);
        w.write_bits(0b0, 1);
        w.write_bits(0b110001, 6);
        assert_eq!(w.into_bytes(), vec![0b1011_0001]);
    }

    #[test]
    fn test_flush_reports_padding() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        assert_eq!(w.flush(), 5);
        assert_eq!(w.flush(), 0);
        assert_eq!(w.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn test_wide_values_span_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0x1FF, 9);
        w.write_bits(0x000, 9);
        assert_eq!(w.bit_len(), 18);
        assert_eq!(w.into_bytes(), vec![0xFF, 0x80, 0x00]);
    }

    #[test]
    fn test_full_32_bit_value() {
        let mut w = BitWriter::new();
        w.write_bits(0xDEAD_BEEF, 32);
        assert_eq!(w.into_bytes(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_high_bits_are_masked() {
        let mut w = BitWriter::new();
        w.write_bits(0xFFFF_FFF0, 4);
        w.write_bits(0xF, 4);
        assert_eq!(w.into_bytes(), vec![0x0F]);
    }

    #[test]
    fn test_prefix_is_preserved() {
        let mut w = BitWriter::with_prefix(vec![0xAA, 0xBB]);
        w.write_bit(true);
        assert_eq!(w.bit_len(), 17);
        assert_eq!(w.into_bytes(), vec![0xAA, 0xBB, 0x80]);
    }
}
