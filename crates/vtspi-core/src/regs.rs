//! VT34xx SPI controller register definitions
//!
//! Offsets are relative to the controller's register window. The layout is
//! shared by every VT34xx/WM84xx variant; what differs between boards (select
//! line drive, port mode, DMA) is described by [`crate::HardwareInfo`].
//!
//! # Register Layout
//!
//! - `CR`: control (enable, master/slave, clock divisor, clock mode, FIFO resets, DMA)
//! - `SR`: status (busy, FIFO empty flags), write all ones to clear
//! - `DFCR`: data format control (bit order, select line drive, port mode)
//! - `CRE`: control extension
//! - `RXFIFO`/`TXFIFO`: byte-wide FIFO data windows

// ============================================================================
// Register offsets
// ============================================================================

/// Control register (32 bits)
pub const SPI_CR: usize = 0x00;
/// Status register (32 bits)
pub const SPI_SR: usize = 0x04;
/// Data format control register (32 bits)
pub const SPI_DFCR: usize = 0x08;
/// Control extension register (32 bits)
pub const SPI_CRE: usize = 0x0C;
/// Receive FIFO data port (8 bits)
pub const SPI_RXFIFO: usize = 0x10;
/// Transmit FIFO data port (8 bits)
pub const SPI_TXFIFO: usize = 0x30;

/// Size of the register window
pub const SPI_REGS_SIZE: usize = 0x40;

/// Value written to CRE on every reprogram
pub const SPI_CRE_DEFAULT: u32 = 0x20;

/// Depth of the transmit and receive FIFOs in bytes
pub const SPI_FIFO_SIZE: usize = 32;

// ============================================================================
// Control register bits
// ============================================================================

/// Module enable (starts shifting)
pub const SPI_CR_ME_MASK: u32 = 1 << 0;
/// Transmit FIFO reset (self clearing)
pub const SPI_CR_TFR_MASK: u32 = 1 << 1;
/// Receive FIFO reset (self clearing)
pub const SPI_CR_RFR_MASK: u32 = 1 << 2;
/// Transmit FIFO threshold select
pub const SPI_CR_TFTS_MASK: u32 = 1 << 13;
/// Receive FIFO threshold select
pub const SPI_CR_RFTS_MASK: u32 = 1 << 14;
/// DMA request control
pub const SPI_CR_DRC_MASK: u32 = 1 << 15;
/// Master/slave mode select (set = slave)
pub const SPI_CR_MSMS_MASK: u32 = 1 << 16;
/// Clock phase/polarity field
pub const SPI_CR_CPHS_SHIFT: u32 = 17;
pub const SPI_CR_CPHS_MASK: u32 = 0x3 << SPI_CR_CPHS_SHIFT;
/// Slave select field
pub const SPI_CR_SS_SHIFT: u32 = 19;
pub const SPI_CR_SS_MASK: u32 = 0x3 << SPI_CR_SS_SHIFT;
/// Transmit clock divisor field (bits 21..31)
pub const SPI_CR_TCD_SHIFT: u32 = 21;
pub const SPI_CR_TCD_MAX: u32 = 0x7ff;
pub const SPI_CR_TCD_MASK: u32 = SPI_CR_TCD_MAX << SPI_CR_TCD_SHIFT;

/// All bits touched when switching into DMA/burst mode
pub const SPI_CR_DMA_MODE_MASK: u32 = SPI_CR_DRC_MASK | SPI_CR_RFTS_MASK | SPI_CR_TFTS_MASK;

// ============================================================================
// Status register bits
// ============================================================================

/// Controller busy shifting
pub const SPI_SR_BUSY_MASK: u32 = 1 << 0;
/// Transmit FIFO empty
pub const SPI_SR_TFEI_MASK: u32 = 1 << 2;
/// Receive FIFO empty
pub const SPI_SR_RFEI_MASK: u32 = 1 << 3;

/// Write-one-to-clear pattern for the status register
pub const SPI_SR_CLEAR_ALL: u32 = !0;

// ============================================================================
// Data format control register bits
// ============================================================================

/// Transmit LSB first
pub const SPI_DFCR_TSBO_MASK: u32 = 1 << 0;
/// Receive LSB first
pub const SPI_DFCR_RSBO_MASK: u32 = 1 << 1;
/// Select line drive value (1 = inactive/high)
pub const SPI_DFCR_DSV_MASK: u32 = 1 << 2;
/// Select line drive enable
pub const SPI_DFCR_DSE_MASK: u32 = 1 << 3;
/// Select line controlled by the SC field (program mode)
pub const SPI_DFCR_SC_MASK: u32 = 1 << 4;
/// Point-to-point port mode
pub const SPI_DFCR_SPM_MASK: u32 = 1 << 5;

/// Extract the divisor field from a control register value
#[inline]
pub fn cr_divisor(cr: u32) -> u16 {
    ((cr & SPI_CR_TCD_MASK) >> SPI_CR_TCD_SHIFT) as u16
}

/// Extract the clock mode field from a control register value
#[inline]
pub fn cr_clock_mode(cr: u32) -> u8 {
    ((cr & SPI_CR_CPHS_MASK) >> SPI_CR_CPHS_SHIFT) as u8
}
