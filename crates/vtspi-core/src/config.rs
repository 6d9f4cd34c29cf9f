//! Board descriptions
//!
//! A board file tells the engine what the controller instance can do and how
//! long to wait for it. Files are RON:
//!
//! ```ron
//! (
//!     name: "WM8425 EVB",
//!     input_clock_khz: 83333,
//!     hardware: (
//!         min_freq_hz: 21000,
//!         max_freq_hz: 41666000,
//!         bits_per_word: [8, 16],
//!         max_transfer_length: 4096,
//!         dma: true,
//!         select_drive: Program,
//!         port_mode: PointToPoint,
//!         num_chipselect: 2,
//!     ),
//! )
//! ```
//!
//! Every `timing` field is optional and defaults to the values the
//! controller was characterised with.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigFileError;
use crate::mode::WordWidths;

/// How the select line reaches the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SelectDrive {
    /// Controller drives select through the DFCR drive-value field
    Program,
    /// Select is an external GPIO pin only
    Pin,
}

/// Bus topology the controller is wired for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PortMode {
    /// Single slave
    PointToPoint,
    /// Shared bus with several select lines
    Multi,
}

/// Static capabilities of one controller instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    /// Lowest clock the divisor can produce
    pub min_freq_hz: u32,
    /// Highest clock the controller is rated for
    pub max_freq_hz: u32,
    /// Enabled word widths
    pub word_widths: WordWidths,
    /// Longest single transfer (also the DMA bounce buffer size)
    pub max_transfer_length: usize,
    /// DMA channels are wired to the FIFOs
    pub dma_support: bool,
    /// Select line drive variant
    pub select_drive: SelectDrive,
    /// Port mode
    pub port_mode: PortMode,
    /// Number of select lines
    pub num_chipselect: u8,
}

impl Default for HardwareInfo {
    fn default() -> Self {
        Self {
            min_freq_hz: 21_000,
            max_freq_hz: 41_666_000,
            word_widths: WordWidths::BITS8 | WordWidths::BITS16,
            max_transfer_length: 4096,
            dma_support: true,
            select_drive: SelectDrive::Program,
            port_mode: PortMode::PointToPoint,
            num_chipselect: 2,
        }
    }
}

/// Timeouts and delays used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Attempts for every bounded register poll
    pub poll_attempts: u32,
    /// Delay between register poll attempts in microseconds
    pub poll_delay_us: u64,
    /// Settle delay after each full FIFO chunk at slow clocks
    pub settle_delay_us: u64,
    /// Clocks below this get the settle delay
    pub slow_speed_hz: u32,
    /// Fallback clock when the requested one cannot be programmed
    pub default_speed_hz: u32,
    /// Highest clock used for DMA transfers
    pub dma_speed_cap_hz: u32,
    /// Delay around enabling the controller for DMA
    pub dma_settle_ms: u64,
    /// Wait for DMA completion
    pub dma_timeout_ms: u64,
    /// Queue drain poll interval
    pub drain_interval_ms: u64,
    /// Queue drain attempts
    pub drain_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_attempts: 10_000,
            poll_delay_us: 1,
            settle_delay_us: 2_000,
            slow_speed_hz: 5_000_000,
            default_speed_hz: 5_000_000,
            dma_speed_cap_hz: 15_000_000,
            dma_settle_ms: 2,
            dma_timeout_ms: 1_000,
            drain_interval_ms: 10,
            drain_attempts: 500,
        }
    }
}

impl Timing {
    /// Delay between register poll attempts
    pub fn poll_delay(&self) -> Duration {
        Duration::from_micros(self.poll_delay_us)
    }

    /// DMA completion timeout
    pub fn dma_timeout(&self) -> Duration {
        Duration::from_millis(self.dma_timeout_ms)
    }
}

/// Complete description of one controller instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Human readable board name
    pub name: String,
    /// Controller input clock in kHz
    pub input_clock_khz: u32,
    /// Capabilities
    pub hardware: HardwareInfo,
    /// Timeouts and delays
    pub timing: Timing,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: "WM8425 EVB".into(),
            input_clock_khz: 83_333,
            hardware: HardwareInfo::default(),
            timing: Timing::default(),
        }
    }
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, Deserialize)]
struct HardwareDef {
    min_freq_hz: u32,
    max_freq_hz: u32,
    #[serde(default = "default_widths")]
    bits_per_word: Vec<u8>,
    max_transfer_length: usize,
    #[serde(default)]
    dma: bool,
    select_drive: SelectDrive,
    port_mode: PortMode,
    #[serde(default = "default_chipselects")]
    num_chipselect: u8,
}

fn default_widths() -> Vec<u8> {
    vec![8]
}

fn default_chipselects() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
struct BoardDef {
    name: String,
    input_clock_khz: u32,
    hardware: HardwareDef,
    #[serde(default)]
    timing: Timing,
}

impl BoardConfig {
    /// Parse a board description from RON text
    pub fn from_ron(content: &str) -> Result<Self, ConfigFileError> {
        let def: BoardDef = ron::from_str(content)?;

        let mut word_widths = WordWidths::empty();
        for bits in def.hardware.bits_per_word {
            word_widths |= match bits {
                8 => WordWidths::BITS8,
                16 => WordWidths::BITS16,
                other => {
                    return Err(ConfigFileError::Invalid(format!(
                        "unsupported word width {}",
                        other
                    )))
                }
            };
        }

        let board = Self {
            name: def.name,
            input_clock_khz: def.input_clock_khz,
            hardware: HardwareInfo {
                min_freq_hz: def.hardware.min_freq_hz,
                max_freq_hz: def.hardware.max_freq_hz,
                word_widths,
                max_transfer_length: def.hardware.max_transfer_length,
                dma_support: def.hardware.dma,
                select_drive: def.hardware.select_drive,
                port_mode: def.hardware.port_mode,
                num_chipselect: def.hardware.num_chipselect,
            },
            timing: def.timing,
        };
        board.validate()?;
        Ok(board)
    }

    /// Load a board description from a RON file
    pub fn load_file(path: &Path) -> Result<Self, ConfigFileError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&content)
    }

    /// Controller input clock in Hz
    pub fn input_clock_hz(&self) -> u32 {
        self.input_clock_khz.saturating_mul(1000)
    }

    fn validate(&self) -> Result<(), ConfigFileError> {
        let hw = &self.hardware;
        if self.input_clock_khz == 0 {
            return Err(ConfigFileError::Invalid("input clock is zero".into()));
        }
        if hw.min_freq_hz == 0 || hw.min_freq_hz > hw.max_freq_hz {
            return Err(ConfigFileError::Invalid(format!(
                "bad frequency range {}..{} Hz",
                hw.min_freq_hz, hw.max_freq_hz
            )));
        }
        if hw.word_widths.is_empty() {
            return Err(ConfigFileError::Invalid("no word widths enabled".into()));
        }
        if hw.max_transfer_length == 0 {
            return Err(ConfigFileError::Invalid("max transfer length is zero".into()));
        }
        if hw.num_chipselect == 0 || hw.num_chipselect > 4 {
            return Err(ConfigFileError::Invalid(format!(
                "{} select lines, expected 1-4",
                hw.num_chipselect
            )));
        }
        if self.timing.default_speed_hz == 0 {
            return Err(ConfigFileError::Invalid("default speed is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVB: &str = r#"(
        name: "test board",
        input_clock_khz: 100000,
        hardware: (
            min_freq_hz: 25000,
            max_freq_hz: 50000000,
            bits_per_word: [8, 16],
            max_transfer_length: 2048,
            dma: true,
            select_drive: Pin,
            port_mode: Multi,
            num_chipselect: 2,
        ),
        timing: (
            poll_attempts: 50,
            dma_timeout_ms: 20,
        ),
    )"#;

    #[test]
    fn test_parse_board() {
        let board = BoardConfig::from_ron(EVB).unwrap();
        assert_eq!(board.name, "test board");
        assert_eq!(board.input_clock_hz(), 100_000_000);
        assert_eq!(board.hardware.select_drive, SelectDrive::Pin);
        assert_eq!(board.hardware.port_mode, PortMode::Multi);
        assert!(board.hardware.word_widths.supports(16));
        assert!(board.hardware.dma_support);
        assert_eq!(board.timing.poll_attempts, 50);
        assert_eq!(board.timing.dma_timeout_ms, 20);
        // Omitted timing fields keep their defaults
        assert_eq!(board.timing.drain_attempts, 500);
        assert_eq!(board.timing.default_speed_hz, 5_000_000);
    }

    #[test]
    fn test_reject_bad_word_width() {
        let bad = EVB.replace("[8, 16]", "[8, 12]");
        assert!(matches!(
            BoardConfig::from_ron(&bad),
            Err(ConfigFileError::Invalid(_))
        ));
    }

    #[test]
    fn test_reject_inverted_frequency_range() {
        let bad = EVB.replace("min_freq_hz: 25000", "min_freq_hz: 60000000");
        assert!(matches!(
            BoardConfig::from_ron(&bad),
            Err(ConfigFileError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(matches!(
            BoardConfig::from_ron("(name: 1)"),
            Err(ConfigFileError::Parse(_))
        ));
    }

    #[test]
    fn test_shipped_boards_parse() {
        let evb = BoardConfig::from_ron(include_str!("../../../boards/wm8425.ron")).unwrap();
        assert_eq!(evb, BoardConfig::default());

        let pin = BoardConfig::from_ron(include_str!("../../../boards/vt3426-pin-select.ron"))
            .unwrap();
        assert_eq!(pin.hardware.select_drive, SelectDrive::Pin);
        assert!(!pin.hardware.dma_support);
        assert!(!pin.hardware.word_widths.supports(16));
        assert_eq!(pin.timing, Timing::default());
    }
}
