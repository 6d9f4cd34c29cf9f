//! Register access layer
//!
//! Typed operations on the controller register window. Everything above
//! this module speaks in terms of FIFO resets, enable and status checks,
//! never raw offsets.

use vtspi_core::hal::RegisterBlock;
use vtspi_core::regs::*;
use vtspi_core::{poll_until, PollPolicy, RegisterPlan, SpiError};

/// The controller register window
pub struct Registers {
    block: Box<dyn RegisterBlock>,
}

impl Registers {
    /// Wrap a register block
    pub fn new(block: Box<dyn RegisterBlock>) -> Self {
        Self { block }
    }

    /// Read a 32-bit register
    #[inline]
    pub fn read(&self, offset: usize) -> u32 {
        self.block.read32(offset)
    }

    /// Write a 32-bit register
    #[inline]
    pub fn write(&self, offset: usize, value: u32) {
        self.block.write32(offset, value);
    }

    /// Read-modify-write: set `mask`
    pub fn set_bits(&self, offset: usize, mask: u32) {
        let value = self.read(offset);
        self.write(offset, value | mask);
    }

    /// Read-modify-write: clear `mask`
    pub fn clear_bits(&self, offset: usize, mask: u32) {
        let value = self.read(offset);
        self.write(offset, value & !mask);
    }

    /// Read-modify-write: replace the `mask` field with `bits`
    pub fn update_bits(&self, offset: usize, mask: u32, bits: u32) {
        let value = self.read(offset);
        self.write(offset, (value & !mask) | (bits & mask));
    }

    /// Push one byte into the transmit FIFO
    #[inline]
    pub fn push_tx(&self, byte: u8) {
        self.block.write8(SPI_TXFIFO, byte);
    }

    /// Pop one byte from the receive FIFO
    #[inline]
    pub fn pop_rx(&self) -> u8 {
        self.block.read8(SPI_RXFIFO)
    }

    /// Status register
    pub fn status(&self) -> u32 {
        self.read(SPI_SR)
    }

    /// Clear every status flag (write-one-to-clear)
    pub fn clear_status(&self) {
        self.write(SPI_SR, SPI_SR_CLEAR_ALL);
    }

    /// Transmit FIFO empty flag
    pub fn tx_empty(&self) -> bool {
        self.status() & SPI_SR_TFEI_MASK != 0
    }

    /// Receive FIFO empty flag
    pub fn rx_empty(&self) -> bool {
        self.status() & SPI_SR_RFEI_MASK != 0
    }

    /// Shift engine busy flag
    pub fn busy(&self) -> bool {
        self.status() & SPI_SR_BUSY_MASK != 0
    }

    /// Set module enable
    pub fn enable(&self) {
        self.set_bits(SPI_CR, SPI_CR_ME_MASK);
    }

    /// Clear module enable and wait for the shifter to stop
    ///
    /// A shifter that never goes idle is only logged.
    pub fn disable(&self, policy: PollPolicy) {
        self.clear_bits(SPI_CR, SPI_CR_ME_MASK);
        if poll_until(policy, "controller idle", || !self.busy()).is_err() {
            log::warn!("SPI controller still busy after disable");
        }
    }

    /// Reset the transmit then the receive FIFO
    pub fn reset_fifos(&self, policy: PollPolicy) -> Result<(), SpiError> {
        self.set_bits(SPI_CR, SPI_CR_TFR_MASK);
        poll_until(policy, "tx FIFO reset", || {
            self.read(SPI_CR) & SPI_CR_TFR_MASK == 0
        })?;
        self.set_bits(SPI_CR, SPI_CR_RFR_MASK);
        poll_until(policy, "rx FIFO reset", || {
            self.read(SPI_CR) & SPI_CR_RFR_MASK == 0
        })
    }

    /// Clear status and reset both FIFOs
    pub fn reset(&self, policy: PollPolicy) -> Result<(), SpiError> {
        self.clear_status();
        self.reset_fifos(policy)
    }

    /// Program the clock divisor field
    pub fn set_divisor(&self, divisor: u16) {
        self.update_bits(
            SPI_CR,
            SPI_CR_TCD_MASK,
            u32::from(divisor) << SPI_CR_TCD_SHIFT,
        );
    }

    /// Full reprogram for one message
    ///
    /// Leaves the module disabled in master mode with select field 0. The
    /// select drive bits in DFCR keep their current level.
    pub fn program(&self, plan: &RegisterPlan, policy: PollPolicy) -> Result<(), SpiError> {
        self.write(SPI_CR, 0);
        self.clear_status();
        self.write(SPI_CRE, SPI_CRE_DEFAULT);
        self.reset_fifos(policy)?;

        // MSMS clear is master, SS field left at 0
        self.write(SPI_CR, plan.control());

        let select = self.read(SPI_DFCR) & (SPI_DFCR_DSV_MASK | SPI_DFCR_DSE_MASK);
        self.write(SPI_DFCR, select | plan.data_format());

        log::debug!(
            "SPI programmed: CR={:#010x} DFCR={:#010x}",
            self.read(SPI_CR),
            self.read(SPI_DFCR)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vtspi_sim::SimController;

    const FAST: PollPolicy = PollPolicy::new(50, Duration::ZERO);

    fn plan() -> RegisterPlan {
        RegisterPlan {
            divisor: 41,
            clock_mode: 3,
            lsb_first: true,
            select_program: true,
            point_to_point: true,
            substitutions: Vec::new(),
        }
    }

    #[test]
    fn test_bit_helpers() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        regs.set_bits(SPI_CRE, 0x21);
        regs.clear_bits(SPI_CRE, 0x01);
        assert_eq!(regs.read(SPI_CRE), 0x20);
        regs.update_bits(SPI_CRE, 0x0f, 0x3);
        assert_eq!(regs.read(SPI_CRE), 0x23);
    }

    #[test]
    fn test_program_sequence() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        regs.write(SPI_CR, SPI_CR_ME_MASK | SPI_CR_MSMS_MASK);
        regs.write(SPI_DFCR, SPI_DFCR_DSV_MASK | SPI_DFCR_DSE_MASK);

        regs.program(&plan(), FAST).unwrap();

        let cr = sim.control();
        assert_eq!(cr_divisor(cr), 41);
        assert_eq!(cr_clock_mode(cr), 3);
        assert_eq!(cr & (SPI_CR_ME_MASK | SPI_CR_MSMS_MASK | SPI_CR_SS_MASK), 0);
        assert_eq!(sim.control_ext(), SPI_CRE_DEFAULT);
        assert_eq!(
            sim.data_format(),
            SPI_DFCR_DSV_MASK
                | SPI_DFCR_DSE_MASK
                | SPI_DFCR_SPM_MASK
                | SPI_DFCR_RSBO_MASK
                | SPI_DFCR_TSBO_MASK
                | SPI_DFCR_SC_MASK
        );
    }

    #[test]
    fn test_stuck_fifo_reset_times_out() {
        let sim = SimController::new();
        sim.inject(|f| f.stuck_fifo_reset = true);
        let regs = Registers::new(Box::new(sim.registers()));
        assert_eq!(
            regs.program(&plan(), FAST),
            Err(SpiError::Timeout("tx FIFO reset"))
        );
    }

    #[test]
    fn test_set_divisor_keeps_other_fields() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        regs.write(SPI_CR, 3 << SPI_CR_CPHS_SHIFT);
        regs.set_divisor(0x7ff);
        assert_eq!(cr_divisor(sim.control()), 0x7ff);
        assert_eq!(cr_clock_mode(sim.control()), 3);
    }
}
