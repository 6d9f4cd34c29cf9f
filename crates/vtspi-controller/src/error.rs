//! Error types for the controller crate

use thiserror::Error;
use vtspi_core::ConfigFileError;

/// Errors from controller lifecycle operations
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Queue did not drain within the attempt ceiling
    #[error("message queue still busy after {attempts} drain attempts")]
    Busy {
        /// Drain checks made before giving up
        attempts: u32,
    },

    /// Register window could not be mapped
    #[error("failed to map {size:#x} bytes at physical address {address:#x}")]
    MemoryMap {
        /// Physical base address
        address: u64,
        /// Window size
        size: usize,
    },

    /// Operation not available on this platform or build
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// Dispatcher thread could not be started
    #[error("failed to start dispatcher: {0}")]
    Spawn(#[source] std::io::Error),

    /// Board description problem
    #[error(transparent)]
    Board(#[from] ConfigFileError),
}
