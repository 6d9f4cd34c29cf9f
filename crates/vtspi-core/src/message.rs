//! Messages and transfers
//!
//! A [`Message`] is a batch of [`Transfer`]s that share one chip-select
//! session. It is owned by the client until submitted; after that the only
//! way back is the completion callback, which receives the message by value
//! with its status, byte count and receive buffers filled in.

use core::fmt;

use crate::error::SpiError;

/// Completion callback, invoked exactly once per submitted message
pub type Completion = Box<dyn FnOnce(Message) + Send + 'static>;

/// One data movement within a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    tx: Option<Vec<u8>>,
    rx: Option<Vec<u8>>,
    len: usize,
    speed_hz: u32,
    bits_per_word: u8,
    delay_us: u32,
    cs_change: bool,
}

impl Transfer {
    /// A transfer of `len` bytes with no buffers attached yet
    pub fn new(len: usize) -> Self {
        Self {
            len,
            ..Default::default()
        }
    }

    /// Transmit `data`, discarding whatever comes back
    pub fn write(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            len: data.len(),
            tx: Some(data),
            ..Default::default()
        }
    }

    /// Receive `len` bytes while shifting out zeros
    pub fn read(len: usize) -> Self {
        Self::new(len).with_rx()
    }

    /// Transmit `data` and capture the same number of bytes
    pub fn duplex(data: impl Into<Vec<u8>>) -> Self {
        Self::write(data).with_rx()
    }

    /// Attach a transmit buffer
    pub fn with_tx(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.tx = Some(data.into());
        self
    }

    /// Attach a zeroed receive buffer of the transfer length
    pub fn with_rx(mut self) -> Self {
        self.rx = Some(vec![0; self.len]);
        self
    }

    /// Override the clock for this transfer (0 = device default)
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Override the word width for this transfer (0 = device default)
    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }

    /// Delay after this transfer before the next one starts
    pub fn with_delay_us(mut self, delay_us: u32) -> Self {
        self.delay_us = delay_us;
        self
    }

    /// Release the select line after this transfer
    pub fn with_cs_change(mut self, cs_change: bool) -> Self {
        self.cs_change = cs_change;
        self
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the transfer moves no data
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transmit buffer
    pub fn tx(&self) -> Option<&[u8]> {
        self.tx.as_deref()
    }

    /// Receive buffer
    pub fn rx(&self) -> Option<&[u8]> {
        self.rx.as_deref()
    }

    /// Both buffers, receive side mutable
    pub fn buffers_mut(&mut self) -> (Option<&[u8]>, Option<&mut [u8]>) {
        (self.tx.as_deref(), self.rx.as_deref_mut())
    }

    /// Clock in Hz (0 = inherit)
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Word width (0 = inherit)
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Post-transfer delay in microseconds
    pub fn delay_us(&self) -> u32 {
        self.delay_us
    }

    /// Whether the select line is released after this transfer
    pub fn cs_change(&self) -> bool {
        self.cs_change
    }

    /// Replace the clock (used by submission normalization)
    pub fn set_speed_hz(&mut self, speed_hz: u32) {
        self.speed_hz = speed_hz;
    }

    /// Replace the word width (used by submission normalization)
    pub fn set_bits_per_word(&mut self, bits: u8) {
        self.bits_per_word = bits;
    }
}

/// A batch of transfers executed under one select session
pub struct Message {
    transfers: Vec<Transfer>,
    complete: Option<Completion>,
    status: Result<(), SpiError>,
    actual_length: usize,
    dma_mapped: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// An empty message
    pub fn new() -> Self {
        Self {
            transfers: Vec::new(),
            complete: None,
            status: Ok(()),
            actual_length: 0,
            dma_mapped: false,
        }
    }

    /// Build a message from a list of transfers
    pub fn from_transfers(transfers: Vec<Transfer>) -> Self {
        Self {
            transfers,
            ..Self::new()
        }
    }

    /// Append a transfer
    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.transfers.push(transfer);
        self
    }

    /// Append a transfer in place
    pub fn push(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    /// Set the completion callback
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    /// Mark the buffers as already mapped for DMA
    pub fn with_dma_mapped(mut self, mapped: bool) -> Self {
        self.dma_mapped = mapped;
        self
    }

    /// The transfers in execution order
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Mutable access to the transfers
    pub fn transfers_mut(&mut self) -> &mut [Transfer] {
        &mut self.transfers
    }

    /// Consume the message and return its transfers
    pub fn into_transfers(self) -> Vec<Transfer> {
        self.transfers
    }

    /// Final status, `Ok` until something failed
    pub fn status(&self) -> Result<(), SpiError> {
        self.status.clone()
    }

    /// Bytes actually moved
    pub fn actual_length(&self) -> usize {
        self.actual_length
    }

    /// Whether the buffers are pre-mapped for DMA
    pub fn is_dma_mapped(&self) -> bool {
        self.dma_mapped
    }

    /// Whether a completion callback is attached
    pub fn has_completion(&self) -> bool {
        self.complete.is_some()
    }

    /// Clear status and byte count before execution
    pub fn reset_result(&mut self) {
        self.status = Ok(());
        self.actual_length = 0;
    }

    /// Record the final status
    pub fn set_status(&mut self, status: Result<(), SpiError>) {
        self.status = status;
    }

    /// Add bytes moved by one transfer
    pub fn add_actual_length(&mut self, bytes: usize) {
        self.actual_length += bytes;
    }

    /// Hand the message back to its owner through the callback
    pub fn complete(mut self) {
        if let Some(complete) = self.complete.take() {
            complete(self);
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("transfers", &self.transfers)
            .field("status", &self.status)
            .field("actual_length", &self.actual_length)
            .field("dma_mapped", &self.dma_mapped)
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_transfer_constructors() {
        let t = Transfer::duplex(vec![1, 2, 3]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.tx(), Some(&[1u8, 2, 3][..]));
        assert_eq!(t.rx(), Some(&[0u8, 0, 0][..]));

        let t = Transfer::read(4).with_cs_change(true).with_speed(1_000_000);
        assert!(t.tx().is_none());
        assert_eq!(t.rx().map(<[u8]>::len), Some(4));
        assert!(t.cs_change());
        assert_eq!(t.speed_hz(), 1_000_000);

        assert!(Transfer::new(0).is_empty());
    }

    #[test]
    fn test_complete_returns_message() {
        let (tx, rx) = mpsc::channel();
        let mut msg = Message::new()
            .with_transfer(Transfer::write(vec![0xAA]))
            .on_complete(move |m| tx.send(m).unwrap());
        msg.add_actual_length(1);
        msg.complete();

        let back = rx.recv().unwrap();
        assert_eq!(back.actual_length(), 1);
        assert!(back.status().is_ok());
        assert!(!back.has_completion());
    }
}
