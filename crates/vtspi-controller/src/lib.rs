//! vtspi-controller - Queued SPI master transfer engine
//!
//! Drives a VT34xx SPI controller through the seams defined in
//! [`vtspi_core::hal`]. Client code configures devices and submits
//! messages from any thread; a single dispatcher thread per controller
//! programs the registers, runs the select line and moves each transfer
//! through either the polled FIFO engine or the DMA engine.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use vtspi_controller::{Hardware, SpiController};
//! use vtspi_core::{BoardConfig, Message, SpiDevice, SpiMode, Transfer};
//! use vtspi_sim::SimController;
//!
//! let sim = SimController::new();
//! let ctrl = SpiController::new(
//!     BoardConfig::default(),
//!     Hardware {
//!         registers: Box::new(sim.registers()),
//!         pins: Box::new(sim.pins()),
//!         dma: Some(Box::new(sim.dma())),
//!     },
//! )
//! .unwrap();
//!
//! let mut dev = SpiDevice::new(0).with_mode(SpiMode::MODE_3);
//! ctrl.configure_device(&mut dev).unwrap();
//!
//! let (tx, rx) = mpsc::channel();
//! let msg = Message::new()
//!     .with_transfer(Transfer::duplex(vec![0x9f, 0, 0, 0]))
//!     .on_complete(move |m| tx.send(m).unwrap());
//! ctrl.submit(&dev, msg).unwrap();
//!
//! let done = rx.recv().unwrap();
//! assert_eq!(done.actual_length(), 4);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod chipselect;
mod controller;
mod dispatch;
pub mod dma;
pub mod error;
#[cfg(feature = "mmio")]
pub mod mmio;
pub mod polled;
mod queue;

pub use controller::{Hardware, SpiController};
pub use error::ControllerError;
#[cfg(feature = "mmio")]
pub use mmio::MmioRegisters;
