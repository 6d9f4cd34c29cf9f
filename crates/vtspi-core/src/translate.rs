//! Device configuration to register field translation
//!
//! Pure functions: nothing here touches hardware. The dispatcher turns a
//! [`RegisterPlan`] into register writes once per message.
//!
//! Out-of-range requests are not errors at this level. The translator
//! substitutes a value the hardware can run with and records a
//! [`Substitution`] so the caller can log it.

use core::fmt;

use crate::config::{HardwareInfo, PortMode, SelectDrive};
use crate::device::SpiDevice;
use crate::mode::SpiMode;
use crate::regs::*;

/// Highest clock mode code
pub const SPI_CLK_MODE3: u8 = 3;

/// A requested setting replaced by a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// Clock divisor could not be derived from the requested speed
    Divisor {
        /// Requested clock in Hz
        requested_hz: u32,
        /// Clock programmed instead
        default_hz: u32,
    },
    /// Clock mode above 3
    ClockMode {
        /// Requested mode code
        requested: u8,
    },
    /// Program-driven select line requires clock phase 1
    SelectConflict {
        /// Clock mode in effect
        clock_mode: u8,
    },
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Divisor {
                requested_hz,
                default_hz,
            } => write!(
                f,
                "SPI frequency {}Hz not supported, using {}Hz",
                requested_hz, default_hz
            ),
            Self::ClockMode { requested } => {
                write!(f, "clock mode {} invalid, using clock mode 3", requested)
            }
            Self::SelectConflict { clock_mode } => write!(
                f,
                "program-driven select conflicts with clock mode {}, select control left off",
                clock_mode
            ),
        }
    }
}

/// Register field values for one device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPlan {
    /// Transmit clock divisor
    pub divisor: u16,
    /// Clock phase/polarity code
    pub clock_mode: u8,
    /// Shift LSB first in both directions
    pub lsb_first: bool,
    /// Enable the DFCR select-control field
    pub select_program: bool,
    /// Point-to-point port mode
    pub point_to_point: bool,
    /// Fallbacks applied while building the plan
    pub substitutions: Vec<Substitution>,
}

impl RegisterPlan {
    /// Control register value: master mode, select field 0, module disabled
    pub fn control(&self) -> u32 {
        ((u32::from(self.divisor) << SPI_CR_TCD_SHIFT) & SPI_CR_TCD_MASK)
            | ((u32::from(self.clock_mode) << SPI_CR_CPHS_SHIFT) & SPI_CR_CPHS_MASK)
    }

    /// Data format control register value
    pub fn data_format(&self) -> u32 {
        let mut dfcr = 0;
        if self.point_to_point {
            dfcr |= SPI_DFCR_SPM_MASK;
        }
        if self.lsb_first {
            dfcr |= SPI_DFCR_RSBO_MASK | SPI_DFCR_TSBO_MASK;
        }
        if self.select_program {
            dfcr |= SPI_DFCR_SC_MASK;
        }
        dfcr
    }
}

/// Divisor for `speed_hz` from an `input_hz` controller clock
///
/// Zero speed or a divisor wider than the 11-bit field falls back to the
/// divisor for `default_hz`.
pub fn clock_divisor(input_hz: u32, speed_hz: u32, default_hz: u32) -> (u16, Option<Substitution>) {
    let raw = |speed: u32| u64::from(input_hz) / (2 * u64::from(speed.max(1)));

    if speed_hz != 0 {
        let divisor = raw(speed_hz);
        if divisor <= u64::from(SPI_CR_TCD_MAX) {
            return (divisor as u16, None);
        }
    }

    let divisor = raw(default_hz).min(u64::from(SPI_CR_TCD_MAX));
    (
        divisor as u16,
        Some(Substitution::Divisor {
            requested_hz: speed_hz,
            default_hz,
        }),
    )
}

/// Clock mode code, anything above 3 becomes 3
pub fn clock_mode(requested: u8) -> (u8, Option<Substitution>) {
    if requested > SPI_CLK_MODE3 {
        (SPI_CLK_MODE3, Some(Substitution::ClockMode { requested }))
    } else {
        (requested, None)
    }
}

/// Translate a device descriptor for the controller described by `hw`
pub fn translate(
    device: &SpiDevice,
    hw: &HardwareInfo,
    input_hz: u32,
    default_speed_hz: u32,
) -> RegisterPlan {
    let mut substitutions = Vec::new();

    let (divisor, sub) = clock_divisor(input_hz, device.max_speed_hz, default_speed_hz);
    substitutions.extend(sub);

    let (clock_mode, sub) = clock_mode(device.mode.clock_mode());
    substitutions.extend(sub);

    let select_program = match hw.select_drive {
        SelectDrive::Program if device.mode.contains(SpiMode::CPHA) => true,
        SelectDrive::Program => {
            substitutions.push(Substitution::SelectConflict { clock_mode });
            false
        }
        SelectDrive::Pin => false,
    };

    RegisterPlan {
        divisor,
        clock_mode,
        lsb_first: device.mode.contains(SpiMode::LSB_FIRST),
        select_program,
        point_to_point: hw.port_mode == PortMode::PointToPoint,
        substitutions,
    }
}
