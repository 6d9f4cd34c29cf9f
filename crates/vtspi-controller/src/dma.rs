//! DMA transfer engine
//!
//! Moves one transfer through a pair of system DMA channels wired to the
//! FIFOs. Data goes through bounce buffers sized for the longest transfer
//! the controller accepts; the transmit side is padded so the shifter keeps
//! clocking until the receive channel has its last byte.
//!
//! Channels are acquired per transfer and always released before
//! [`DmaEngine::execute`] returns, whatever the outcome.

use std::thread;
use std::time::Duration;

use vtspi_core::hal::{DmaBuffer, DmaChannel, DmaCompletion, DmaController, DmaDirection};
use vtspi_core::regs::*;
use vtspi_core::translate::clock_divisor;
use vtspi_core::{BoardConfig, PollPolicy, ShortTransfer, SpiDevice, SpiError};

use crate::bus::Registers;
use crate::chipselect::ChipSelect;

/// Extra bytes clocked out after the payload
pub const DMA_TX_PAD: usize = 7;

/// Block transfer engine
pub struct DmaEngine {
    dma: Box<dyn DmaController>,
    tx_buf: DmaBuffer,
    rx_buf: DmaBuffer,
    policy: PollPolicy,
    settle: Duration,
    timeout: Duration,
    speed_cap_hz: u32,
    input_hz: u32,
    default_speed_hz: u32,
}

impl DmaEngine {
    /// Allocate bounce buffers for `board` and take ownership of `dma`
    pub fn new(dma: Box<dyn DmaController>, board: &BoardConfig) -> Self {
        let max_len = board.hardware.max_transfer_length;
        let timing = &board.timing;
        log::debug!(
            "SPI DMA buffers: tx {} bytes, rx {} bytes",
            max_len + DMA_TX_PAD,
            max_len
        );
        Self {
            dma,
            tx_buf: DmaBuffer::new(max_len + DMA_TX_PAD),
            rx_buf: DmaBuffer::new(max_len),
            policy: PollPolicy::from(timing),
            settle: Duration::from_millis(timing.dma_settle_ms),
            timeout: timing.dma_timeout(),
            speed_cap_hz: timing.dma_speed_cap_hz,
            input_hz: board.input_clock_hz(),
            default_speed_hz: timing.default_speed_hz,
        }
    }

    /// Move `len` bytes for `device`
    ///
    /// Leaves the select line asserted on success. Any failure reports zero
    /// bytes: a DMA block either lands completely or not at all.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        regs: &Registers,
        select: &mut ChipSelect,
        device: &SpiDevice,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
        speed_hz: u32,
    ) -> Result<usize, ShortTransfer> {
        // Select must be inactive while the channels are armed
        select.deassert(regs, device);
        if speed_hz > self.speed_cap_hz {
            let (divisor, _) = clock_divisor(self.input_hz, self.speed_cap_hz, self.default_speed_hz);
            log::debug!("SPI DMA clock capped at {}Hz", self.speed_cap_hz);
            regs.set_divisor(divisor);
        }
        regs.set_bits(SPI_CR, SPI_CR_DMA_MODE_MASK);

        let mut channels = Vec::with_capacity(2);
        let result = self.transfer(regs, select, device, tx, rx, len, &mut channels);

        for channel in channels {
            self.dma.free(channel);
        }
        self.tx_buf.zero(len + DMA_TX_PAD);
        self.rx_buf.zero(len);
        regs.clear_bits(SPI_CR, SPI_CR_DMA_MODE_MASK);
        regs.disable(self.policy);

        result.map_err(|cause| {
            log::error!("SPI DMA transfer failed: {}", cause);
            ShortTransfer::new(0, cause)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer(
        &mut self,
        regs: &Registers,
        select: &mut ChipSelect,
        device: &SpiDevice,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
        channels: &mut Vec<DmaChannel>,
    ) -> Result<usize, SpiError> {
        regs.reset(self.policy)?;

        if let Some(tx) = tx {
            self.tx_buf.fill_from(&tx[..len]);
        }

        // Fresh flags per transfer: a notifier left over from a timed out
        // transfer can only reach its own
        let tx_done = DmaCompletion::new();
        let rx_done = DmaCompletion::new();

        let tx_channel = self
            .dma
            .request(DmaDirection::Tx, tx_done.clone())
            .map_err(|_| SpiError::DmaUnavailable(DmaDirection::Tx))?;
        channels.push(tx_channel);

        if rx.is_some() {
            let rx_channel = self
                .dma
                .request(DmaDirection::Rx, rx_done.clone())
                .map_err(|_| SpiError::DmaUnavailable(DmaDirection::Rx))?;
            channels.push(rx_channel);
            self.dma.start(rx_channel, &self.rx_buf, len);
        }
        self.dma.start(tx_channel, &self.tx_buf, len + DMA_TX_PAD);

        self.settle();
        regs.enable();
        self.settle();
        select.assert(regs, device);

        let done = if rx.is_some() { &rx_done } else { &tx_done };
        if !done.wait(self.timeout) {
            return Err(SpiError::DmaTimeout);
        }

        if let Some(rx) = rx {
            self.rx_buf.copy_to(&mut rx[..len]);
        }
        Ok(len)
    }

    fn settle(&self) {
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtspi_core::{SelectDrive, SpiMode, Timing};
    use vtspi_sim::{SimController, SimEvent};

    fn board() -> BoardConfig {
        BoardConfig {
            timing: Timing {
                poll_attempts: 50,
                poll_delay_us: 10,
                dma_settle_ms: 0,
                dma_timeout_ms: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    struct Rig {
        sim: SimController,
        regs: Registers,
        select: ChipSelect,
        engine: DmaEngine,
        dev: SpiDevice,
    }

    fn rig(sim: SimController) -> Rig {
        let board = board();
        Rig {
            regs: Registers::new(Box::new(sim.registers())),
            select: ChipSelect::new(SelectDrive::Program, Box::new(sim.pins())),
            engine: DmaEngine::new(Box::new(sim.dma()), &board),
            dev: SpiDevice::new(0).with_mode(SpiMode::MODE_3).with_dma(true),
            sim,
        }
    }

    impl Rig {
        fn run(
            &mut self,
            tx: Option<&[u8]>,
            rx: Option<&mut [u8]>,
            len: usize,
            speed: u32,
        ) -> Result<usize, ShortTransfer> {
            self.engine
                .execute(&self.regs, &mut self.select, &self.dev, tx, rx, len, speed)
        }
    }

    #[test]
    fn test_duplex_transfer() {
        let mut r = rig(SimController::with_peripheral(|b| !b));
        let tx: Vec<u8> = (0..100).collect();
        let mut rx = vec![0u8; 100];

        assert_eq!(r.run(Some(&tx), Some(&mut rx), 100, 1_000_000), Ok(100));
        let expected: Vec<u8> = tx.iter().map(|b| !b).collect();
        assert_eq!(rx, expected);

        let events = r.sim.events();
        assert!(events.contains(&SimEvent::DmaStart {
            direction: DmaDirection::Tx,
            len: 100 + DMA_TX_PAD
        }));
        assert!(events.contains(&SimEvent::DmaStart {
            direction: DmaDirection::Rx,
            len: 100
        }));
        assert_eq!(r.sim.open_dma_channels(), 0);
        assert_eq!(r.sim.control() & (SPI_CR_DMA_MODE_MASK | SPI_CR_ME_MASK), 0);
        assert_eq!(r.sim.pin(0), Some(false));
    }

    #[test]
    fn test_tx_only_waits_on_tx_channel() {
        let mut r = rig(SimController::new());
        let tx = vec![0xEE; 64];
        assert_eq!(r.run(Some(&tx), None, 64, 1_000_000), Ok(64));
        assert!(!r.sim.events().contains(&SimEvent::DmaRequest(DmaDirection::Rx)));
    }

    #[test]
    fn test_rx_refused_releases_tx() {
        let mut r = rig(SimController::new());
        r.sim.inject(|f| f.refuse_dma = Some(DmaDirection::Rx));
        let mut rx = vec![0u8; 40];

        let err = r.run(None, Some(&mut rx), 40, 1_000_000).unwrap_err();
        assert_eq!(err, ShortTransfer::new(0, SpiError::DmaUnavailable(DmaDirection::Rx)));
        assert_eq!(r.sim.open_dma_channels(), 0);
        assert!(r.sim.events().contains(&SimEvent::DmaFree(DmaDirection::Tx)));
    }

    #[test]
    fn test_tx_refused() {
        let mut r = rig(SimController::new());
        r.sim.inject(|f| f.refuse_dma = Some(DmaDirection::Tx));
        let err = r.run(Some(&[1; 40]), None, 40, 1_000_000).unwrap_err();
        assert_eq!(err.cause, SpiError::DmaUnavailable(DmaDirection::Tx));
        assert_eq!(err.transferred, 0);
    }

    #[test]
    fn test_timeout_tears_down_and_recovers() {
        let mut r = rig(SimController::new());
        r.sim.inject(|f| f.drop_dma_completion = true);
        let tx = vec![0x11; 48];

        let err = r.run(Some(&tx), None, 48, 1_000_000).unwrap_err();
        assert_eq!(err, ShortTransfer::new(0, SpiError::DmaTimeout));
        assert_eq!(r.sim.open_dma_channels(), 0);
        assert_eq!(r.sim.control() & (SPI_CR_DMA_MODE_MASK | SPI_CR_ME_MASK), 0);
        assert!(r.engine.tx_buf.lock().iter().all(|&b| b == 0));

        r.sim.clear_faults();
        let mut rx = vec![0u8; 48];
        assert_eq!(r.run(Some(&tx), Some(&mut rx), 48, 1_000_000), Ok(48));
        assert_eq!(rx, tx);
    }

    #[test]
    fn test_late_completion_does_not_finish_next_transfer() {
        let mut r = rig(SimController::new());
        // Completion lands 50 ms after the 100 ms wait gave up
        r.sim.set_dma_latency(Duration::from_millis(150));
        let tx = vec![0x22; 48];
        let err = r.run(Some(&tx), None, 48, 1_000_000).unwrap_err();
        assert_eq!(err.cause, SpiError::DmaTimeout);

        // The next transfer never completes; the stale signal must not count
        r.sim.inject(|f| f.drop_dma_completion = true);
        let err = r.run(Some(&tx), None, 48, 1_000_000).unwrap_err();
        assert_eq!(err, ShortTransfer::new(0, SpiError::DmaTimeout));
        assert_eq!(r.sim.open_dma_channels(), 0);
    }

    #[test]
    fn test_speed_capped() {
        let mut r = rig(SimController::new());
        r.regs.set_divisor(1);
        r.run(Some(&[0; 40]), None, 40, 40_000_000).unwrap();
        // 83.333 MHz / (2 * 15 MHz)
        assert_eq!(cr_divisor(r.sim.control()), 2);
    }
}
