//! SPI mode bits and word-width capability flags

use bitflags::bitflags;

bitflags! {
    /// Per-device mode bits
    ///
    /// Bit values follow the Linux `spi_device.mode` encoding so that
    /// descriptors can be built from values user space already knows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpiMode: u16 {
        /// Clock phase: sample on the trailing edge
        const CPHA      = 0x01;
        /// Clock polarity: idle high
        const CPOL      = 0x02;
        /// Select line is active high
        const CS_HIGH   = 0x04;
        /// Shift least significant bit first
        const LSB_FIRST = 0x08;
        /// Single bidirectional data line
        const THREE_WIRE = 0x10;
        /// Internal loopback
        const LOOP      = 0x20;
        /// No select line at all
        const NO_CS     = 0x40;
        /// Slave pulls low to pause
        const READY     = 0x80;

        /// SPI mode 0: CPOL=0, CPHA=0
        const MODE_0 = 0;
        /// SPI mode 1: CPOL=0, CPHA=1
        const MODE_1 = Self::CPHA.bits();
        /// SPI mode 2: CPOL=1, CPHA=0
        const MODE_2 = Self::CPOL.bits();
        /// SPI mode 3: CPOL=1, CPHA=1
        const MODE_3 = Self::CPOL.bits() | Self::CPHA.bits();
    }
}

impl SpiMode {
    /// Mode bits this controller driver knows how to honour
    pub const SUPPORTED: SpiMode = SpiMode::CPHA
        .union(SpiMode::CPOL)
        .union(SpiMode::CS_HIGH)
        .union(SpiMode::LSB_FIRST)
        .union(SpiMode::LOOP);

    /// Build from a 0-3 clock mode number
    pub fn from_clock_mode(mode: u8) -> Self {
        SpiMode::from_bits_truncate(u16::from(mode & 0x3))
    }

    /// The 2-bit phase/polarity code
    pub fn clock_mode(self) -> u8 {
        (self.bits() & 0x3) as u8
    }
}

bitflags! {
    /// Word widths a controller can shift
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WordWidths: u8 {
        /// 8 bits per word
        const BITS8  = 1 << 0;
        /// 16 bits per word
        const BITS16 = 1 << 1;
    }
}

impl WordWidths {
    /// Whether `bits_per_word` is one of the enabled widths
    pub fn supports(self, bits_per_word: u8) -> bool {
        match bits_per_word {
            8 => self.contains(WordWidths::BITS8),
            16 => self.contains(WordWidths::BITS16),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_mode_roundtrip() {
        for m in 0..4u8 {
            assert_eq!(SpiMode::from_clock_mode(m).clock_mode(), m);
        }
        assert_eq!(SpiMode::MODE_3, SpiMode::CPOL | SpiMode::CPHA);
    }

    #[test]
    fn test_word_widths_only_8_and_16() {
        let all = WordWidths::all();
        assert!(all.supports(8));
        assert!(all.supports(16));
        assert!(!all.supports(12));
        assert!(!all.supports(32));
        assert!(!WordWidths::BITS8.supports(16));
    }
}
