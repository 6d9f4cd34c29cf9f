//! Logical device descriptors

use crate::mode::SpiMode;

/// Per-slave controller data supplied by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveConfig {
    /// Word width used when the device asks for none or for an unsupported one
    pub bits_per_word: u8,
    /// Whether DMA may be used for this slave
    pub dma_enabled: bool,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            bits_per_word: 8,
            dma_enabled: false,
        }
    }
}

/// One peripheral on the bus
///
/// Built by the client, then validated and defaulted in place by
/// `SpiController::configure_device`. Messages snapshot the descriptor when
/// they are submitted, so later setup calls never affect queued messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiDevice {
    /// Select line index
    pub chip_select: u8,
    /// Mode bits
    pub mode: SpiMode,
    /// Word width, 0 = slave default
    pub bits_per_word: u8,
    /// Clock ceiling, 0 = controller maximum
    pub max_speed_hz: u32,
    /// Controller data for this slave
    pub slave: SlaveConfig,
}

impl SpiDevice {
    /// Create a descriptor for select line `chip_select` with everything defaulted
    pub fn new(chip_select: u8) -> Self {
        Self {
            chip_select,
            mode: SpiMode::MODE_0,
            bits_per_word: 0,
            max_speed_hz: 0,
            slave: SlaveConfig::default(),
        }
    }

    /// Set the mode bits
    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the word width
    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }

    /// Set the clock ceiling in Hz
    pub fn with_max_speed(mut self, speed_hz: u32) -> Self {
        self.max_speed_hz = speed_hz;
        self
    }

    /// Set the per-slave controller data
    pub fn with_slave(mut self, slave: SlaveConfig) -> Self {
        self.slave = slave;
        self
    }

    /// Allow DMA for this device
    pub fn with_dma(mut self, enabled: bool) -> Self {
        self.slave.dma_enabled = enabled;
        self
    }
}
