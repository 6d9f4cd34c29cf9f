//! vtspi-core - Core types for the VT34xx SPI master transfer engine
//!
//! This crate holds everything the engine needs that does not touch
//! hardware: the message model, device descriptors, board descriptions,
//! the register map, the configuration translator and the bounded polling
//! helper. It also defines the seams ([`hal`]) through which the controller
//! crate reaches registers, select pins and DMA channels.
//!
//! # Example
//!
//! ```
//! use vtspi_core::{translate, BoardConfig, SpiDevice, SpiMode};
//!
//! let board = BoardConfig::default();
//! let dev = SpiDevice::new(0)
//!     .with_mode(SpiMode::MODE_3)
//!     .with_max_speed(1_000_000);
//! let plan = translate::translate(
//!     &dev,
//!     &board.hardware,
//!     board.input_clock_hz(),
//!     board.timing.default_speed_hz,
//! );
//! assert_eq!(plan.divisor, 41);
//! assert_eq!(plan.clock_mode, 3);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod device;
pub mod error;
pub mod hal;
pub mod message;
pub mod mode;
pub mod poll;
#[allow(missing_docs)]
pub mod regs;
pub mod translate;

pub use config::{BoardConfig, HardwareInfo, PortMode, SelectDrive, Timing};
pub use device::{SlaveConfig, SpiDevice};
pub use error::{ConfigError, ConfigFileError, ShortTransfer, SpiError, SubmitError};
pub use message::{Completion, Message, Transfer};
pub use mode::{SpiMode, WordWidths};
pub use poll::{poll_until, PollPolicy};
pub use translate::{RegisterPlan, Substitution};
