//! Hardware seams used by the transfer engine
//!
//! The engine never touches hardware directly. It goes through three
//! collaborators, each supplied by the platform at controller creation:
//!
//! - [`RegisterBlock`]: volatile access to the controller register window
//! - [`SelectPins`]: the GPIO lines wired to the peripherals' select inputs
//! - [`DmaController`]: the system DMA engine's channel allocator
//!
//! Real hardware uses the MMIO block in `vtspi-controller`; tests and the
//! CLI's `sim` backend use `vtspi-sim`.

use core::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Volatile access to a controller register window
///
/// Offsets are byte offsets from the start of the window. Implementations
/// take `&self` because MMIO writes have no Rust-visible aliasing.
pub trait RegisterBlock: Send {
    /// Read a 32-bit register
    fn read32(&self, offset: usize) -> u32;
    /// Write a 32-bit register
    fn write32(&self, offset: usize, value: u32);
    /// Read an 8-bit data port
    fn read8(&self, offset: usize) -> u8;
    /// Write an 8-bit data port
    fn write8(&self, offset: usize, value: u8);
}

/// Select lines driven as plain GPIO outputs
pub trait SelectPins: Send {
    /// Drive select line `index` to `high`
    fn drive(&mut self, index: u8, high: bool);
}

/// Pins for boards where no select line is GPIO driven
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPins;

impl SelectPins for NoPins {
    fn drive(&mut self, _index: u8, _high: bool) {}
}

/// Direction of a DMA channel relative to memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaDirection {
    /// Memory to transmit FIFO
    Tx,
    /// Receive FIFO to memory
    Rx,
}

impl fmt::Display for DmaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx => write!(f, "TX"),
            Self::Rx => write!(f, "RX"),
        }
    }
}

/// Handle for an acquired DMA channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaChannel {
    /// Channel number assigned by the DMA controller
    pub id: u32,
    /// Direction the channel was requested for
    pub direction: DmaDirection,
}

/// A channel request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBusy;

/// System DMA channel allocator
///
/// Mirrors a request/setup/start/free platform DMA API. The completion
/// handed to [`request`](Self::request) is signalled from whatever context
/// the DMA hardware reports completion in.
pub trait DmaController: Send {
    /// Acquire a channel wired to the SPI FIFO in `direction`
    fn request(
        &mut self,
        direction: DmaDirection,
        done: DmaCompletion,
    ) -> Result<DmaChannel, DmaBusy>;

    /// Start moving `len` bytes between `buffer` and the FIFO
    fn start(&mut self, channel: DmaChannel, buffer: &DmaBuffer, len: usize);

    /// Release a channel
    fn free(&mut self, channel: DmaChannel);
}

/// One-shot completion flag shared with an asynchronous notifier
///
/// Single writer (the DMA completion source) and single reader (the
/// dispatcher). Waiters re-check the flag, so spurious wakeups are harmless.
#[derive(Debug, Clone, Default)]
pub struct DmaCompletion {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl DmaCompletion {
    /// Create a cleared completion
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark complete and wake the waiter
    pub fn signal(&self) {
        *self.flag() = true;
        self.inner.1.notify_all();
    }

    /// Reset for the next transfer
    pub fn clear(&self) {
        *self.flag() = false;
    }

    /// Check the flag without waiting
    pub fn is_signalled(&self) -> bool {
        *self.flag()
    }

    /// Wait for the flag, returning `false` on timeout
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.flag();
        let (guard, _) = self
            .inner
            .1
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Bounce buffer shared between the engine and a DMA channel
#[derive(Debug, Clone)]
pub struct DmaBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl DmaBuffer {
    /// Allocate a zeroed buffer of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vec![0; size])),
        }
    }

    /// Lock the buffer contents
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity in bytes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer has no capacity
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `data` to the start of the buffer
    pub fn fill_from(&self, data: &[u8]) {
        self.lock()[..data.len()].copy_from_slice(data);
    }

    /// Copy the first `out.len()` bytes out of the buffer
    pub fn copy_to(&self, out: &mut [u8]) {
        let len = out.len();
        out.copy_from_slice(&self.lock()[..len]);
    }

    /// Zero the first `len` bytes
    pub fn zero(&self, len: usize) {
        let mut buf = self.lock();
        let len = len.min(buf.len());
        buf[..len].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_completion_signalled_from_other_thread() {
        let done = DmaCompletion::new();
        let notifier = done.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            notifier.signal();
        });
        assert!(done.wait(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn test_completion_timeout_and_clear() {
        let done = DmaCompletion::new();
        assert!(!done.wait(Duration::from_millis(5)));
        done.signal();
        assert!(done.wait(Duration::from_millis(5)));
        done.clear();
        assert!(!done.is_signalled());
    }

    #[test]
    fn test_dma_buffer_copy_and_zero() {
        let buf = DmaBuffer::new(8);
        buf.fill_from(&[1, 2, 3]);
        let mut out = [0u8; 4];
        buf.copy_to(&mut out);
        assert_eq!(out, [1, 2, 3, 0]);
        buf.zero(2);
        buf.copy_to(&mut out);
        assert_eq!(out, [0, 0, 3, 0]);
    }
}
