//! Error types for the SPI master engine

use std::path::PathBuf;

use thiserror::Error;

use crate::hal::DmaDirection;

/// Errors reported by device setup
///
/// The device descriptor keeps its previous values when one of these is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Mode bits this engine does not understand
    #[error("unsupported mode bits {0:#06x}")]
    UnsupportedMode(u16),

    /// Neither the requested nor the slave default word width is supported
    #[error("unsupported bits per word: {requested} and slave default {fallback}")]
    UnsupportedBitsPerWord {
        /// Width asked for
        requested: u8,
        /// Slave default width
        fallback: u8,
    },

    /// Requested clock is below what the controller can generate
    #[error("speed {requested} Hz is below the controller minimum of {min} Hz")]
    SpeedTooLow {
        /// Clock asked for
        requested: u32,
        /// Controller minimum
        min: u32,
    },

    /// Select line index beyond the number of select lines
    #[error("chip select {index} out of range (controller has {count})")]
    ChipSelectOutOfRange {
        /// Requested line
        index: u8,
        /// Lines available
        count: u8,
    },
}

/// Reasons a message is rejected at submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Message has no transfers
    #[error("message rejected: no transfers")]
    NoTransfers,

    /// Message has no completion callback
    #[error("message rejected: no completion callback")]
    NoCompletion,

    /// Nonzero-length transfer with neither buffer
    #[error("message rejected: transfer {index} has no data buffer")]
    MissingBuffer {
        /// Transfer position in the message
        index: usize,
    },

    /// Transmit buffer shorter than the transfer length
    #[error("message rejected: transfer {index} transmit buffer holds {have} of {len} bytes")]
    ShortTxBuffer {
        /// Transfer position in the message
        index: usize,
        /// Bytes in the buffer
        have: usize,
        /// Transfer length
        len: usize,
    },

    /// Transfer longer than the controller can move in one go
    #[error(
        "message rejected: transfer {index} length {len} exceeds {max}, \
         split it into smaller chunks and submit them separately"
    )]
    TransferTooLong {
        /// Transfer position in the message
        index: usize,
        /// Transfer length
        len: usize,
        /// Controller maximum
        max: usize,
    },
}

/// Final status of a message that did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpiError {
    /// A bounded register poll ran out of attempts
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// DMA completion never arrived
    #[error("DMA transfer did not complete in time")]
    DmaTimeout,

    /// A DMA channel could not be acquired
    #[error("failed to request {0} DMA channel")]
    DmaUnavailable(DmaDirection),

    /// Message failed validation
    #[error(transparent)]
    Rejected(#[from] SubmitError),
}

/// A transfer that stopped early
///
/// `transferred` counts the bytes that were fully shifted before `cause`
/// stopped the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer aborted after {transferred} bytes: {cause}")]
pub struct ShortTransfer {
    /// Bytes moved before the failure
    pub transferred: usize,
    /// What stopped the transfer
    #[source]
    pub cause: SpiError,
}

impl ShortTransfer {
    /// Create a short transfer record
    pub fn new(transferred: usize, cause: SpiError) -> Self {
        Self { transferred, cause }
    }
}

/// Errors loading a board description file
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// RON syntax or schema error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Values parsed but are inconsistent
    #[error("invalid board description: {0}")]
    Invalid(String),
}
