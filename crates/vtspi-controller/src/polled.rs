//! Polled FIFO transfer engine
//!
//! Moves one transfer through the 32-byte FIFOs, a chunk at a time. Every
//! wait is a bounded register poll.

use std::thread;
use std::time::Duration;

use vtspi_core::regs::SPI_FIFO_SIZE;
use vtspi_core::{poll_until, PollPolicy, ShortTransfer, Timing};

use crate::bus::Registers;

/// Byte-wise FIFO engine
#[derive(Debug, Clone, Copy)]
pub struct PolledEngine {
    policy: PollPolicy,
    settle: Duration,
    slow_speed_hz: u32,
}

impl PolledEngine {
    /// Create an engine using `timing`
    pub fn new(timing: &Timing) -> Self {
        Self {
            policy: PollPolicy::from(timing),
            settle: Duration::from_micros(timing.settle_delay_us),
            slow_speed_hz: timing.slow_speed_hz,
        }
    }

    /// Shift `len` bytes
    ///
    /// Without `tx` zeros are shifted out; without `rx` received bytes are
    /// discarded. Returns the byte count, or on timeout the bytes of the
    /// chunks that completed before it.
    pub fn execute(
        &self,
        regs: &Registers,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
        speed_hz: u32,
    ) -> Result<usize, ShortTransfer> {
        let mut rx = rx;
        let mut done = 0;

        regs.reset(self.policy)
            .map_err(|e| ShortTransfer::new(0, e))?;

        while done < len {
            let chunk = (len - done).min(SPI_FIFO_SIZE);
            let full = chunk == SPI_FIFO_SIZE;

            match tx {
                Some(tx) => tx[done..done + chunk].iter().for_each(|&b| regs.push_tx(b)),
                None => (0..chunk).for_each(|_| regs.push_tx(0)),
            }

            regs.enable();
            if let Err(e) = poll_until(self.policy, "tx FIFO empty", || regs.tx_empty()) {
                regs.disable(self.policy);
                log::error!("SPI FIFO transfer stalled after {} of {} bytes", done, len);
                return Err(ShortTransfer::new(done, e));
            }
            regs.disable(self.policy);

            match rx.as_deref_mut() {
                Some(rx) => rx[done..done + chunk]
                    .iter_mut()
                    .for_each(|b| *b = regs.pop_rx()),
                None => (0..chunk).for_each(|_| {
                    regs.pop_rx();
                }),
            }
            poll_until(self.policy, "rx FIFO empty", || regs.rx_empty())
                .map_err(|e| ShortTransfer::new(done, e))?;

            done += chunk;

            if full {
                if speed_hz < self.slow_speed_hz && !self.settle.is_zero() {
                    thread::sleep(self.settle);
                }
                regs.reset(self.policy)
                    .map_err(|e| ShortTransfer::new(done, e))?;
            }
        }

        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use vtspi_core::SpiError;
    use vtspi_sim::SimController;

    fn timing() -> Timing {
        Timing {
            poll_attempts: 50,
            poll_delay_us: 10,
            settle_delay_us: 0,
            ..Default::default()
        }
    }

    fn setup(sim: &SimController) -> (PolledEngine, Registers) {
        (
            PolledEngine::new(&timing()),
            Registers::new(Box::new(sim.registers())),
        )
    }

    #[test]
    fn test_chunks_by_fifo_size() {
        let sim = SimController::with_peripheral(|b| b.wrapping_mul(3));
        let (engine, regs) = setup(&sim);
        let tx: Vec<u8> = (0..50).collect();
        let mut rx = vec![0u8; 50];

        let n = engine
            .execute(&regs, Some(&tx), Some(&mut rx), 50, 1_000_000)
            .unwrap();
        assert_eq!(n, 50);
        assert_eq!(sim.shifted_chunks(), vec![32, 18]);
        let expected: Vec<u8> = tx.iter().map(|b| b.wrapping_mul(3)).collect();
        assert_eq!(rx, expected);
    }

    #[test]
    fn test_exact_fifo_multiple() {
        let sim = SimController::new();
        let (engine, regs) = setup(&sim);
        let tx = vec![0x5A; 64];
        assert_eq!(engine.execute(&regs, Some(&tx), None, 64, 10_000_000), Ok(64));
        assert_eq!(sim.shifted_chunks(), vec![32, 32]);
    }

    #[test]
    fn test_no_tx_shifts_zeros() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let sim = SimController::with_peripheral(move |b| {
            log.lock().unwrap().push(b);
            0xC3
        });
        let (engine, regs) = setup(&sim);
        let mut rx = vec![0u8; 5];

        assert_eq!(engine.execute(&regs, None, Some(&mut rx), 5, 1_000_000), Ok(5));
        assert_eq!(*seen.lock().unwrap(), vec![0u8; 5]);
        assert_eq!(rx, vec![0xC3; 5]);
    }

    #[test]
    fn test_tx_order_preserved() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let sim = SimController::with_peripheral(move |b| {
            log.lock().unwrap().push(b);
            b
        });
        let (engine, regs) = setup(&sim);
        let tx: Vec<u8> = (0..=99).rev().collect();

        engine.execute(&regs, Some(&tx), None, tx.len(), 1_000_000).unwrap();
        assert_eq!(*seen.lock().unwrap(), tx);
        assert_ne!(regs.status() & vtspi_core::regs::SPI_SR_RFEI_MASK, 0);
    }

    #[test]
    fn test_stall_reports_whole_chunks() {
        let sim = SimController::new();
        sim.inject(|f| f.stall_after_shifts = Some(1));
        let (engine, regs) = setup(&sim);
        let tx = vec![1u8; 50];

        let err = engine
            .execute(&regs, Some(&tx), None, 50, 1_000_000)
            .unwrap_err();
        assert_eq!(err.transferred, 32);
        assert_eq!(err.cause, SpiError::Timeout("tx FIFO empty"));
    }

    #[test]
    fn test_stall_on_first_chunk() {
        let sim = SimController::new();
        sim.inject(|f| f.stall_shift = true);
        let (engine, regs) = setup(&sim);

        let err = engine
            .execute(&regs, Some(&[1, 2, 3]), None, 3, 1_000_000)
            .unwrap_err();
        assert_eq!(err.transferred, 0);
    }

    #[test]
    fn test_settle_delay_only_at_slow_clock() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        let engine = PolledEngine::new(&Timing {
            settle_delay_us: 20_000,
            ..timing()
        });
        let tx = vec![0u8; 64];

        let start = Instant::now();
        engine.execute(&regs, Some(&tx), None, 64, 1_000_000).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));

        let start = Instant::now();
        engine.execute(&regs, Some(&tx), None, 64, 10_000_000).unwrap();
        assert!(start.elapsed() < Duration::from_millis(40));
    }
}
