//! Controller handle and submission API

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use vtspi_core::hal::{DmaController, RegisterBlock, SelectPins};
use vtspi_core::{
    poll_until, BoardConfig, ConfigError, HardwareInfo, Message, PollPolicy, SpiDevice, SpiError,
    SpiMode, SubmitError,
};

use crate::bus::Registers;
use crate::chipselect::ChipSelect;
use crate::dispatch::Engine;
use crate::dma::DmaEngine;
use crate::error::ControllerError;
use crate::queue::{Job, Queue};

/// Platform collaborators for one controller instance
pub struct Hardware {
    /// Controller register window
    pub registers: Box<dyn RegisterBlock>,
    /// GPIO select lines
    pub pins: Box<dyn SelectPins>,
    /// System DMA channels, if wired
    pub dma: Option<Box<dyn DmaController>>,
}

/// One SPI master controller with its dispatcher
///
/// Submission never touches hardware: messages are validated, queued, and
/// executed one at a time by a dedicated dispatcher thread. Dropping the
/// controller lets the dispatcher finish what is queued, then joins it.
pub struct SpiController {
    board: BoardConfig,
    queue: Arc<Queue>,
    /// CS_HIGH as last configured, per select line
    cs_high: Mutex<Vec<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl SpiController {
    /// Take ownership of `hw`, quiesce it and start the dispatcher
    pub fn new(board: BoardConfig, hw: Hardware) -> Result<Self, ControllerError> {
        let regs = Registers::new(hw.registers);
        let select = ChipSelect::new(board.hardware.select_drive, hw.pins);

        let dma = match hw.dma {
            Some(dma) if board.hardware.dma_support => Some(DmaEngine::new(dma, &board)),
            Some(_) => {
                log::debug!("DMA channels supplied but board has no DMA, using FIFO only");
                None
            }
            None => {
                if board.hardware.dma_support {
                    log::warn!("board supports DMA but no DMA controller given, using FIFO only");
                }
                None
            }
        };

        let mut engine = Engine::new(board.clone(), regs, select, dma);
        engine.init();

        let queue = Arc::new(Queue::default());
        let worker = {
            let queue = queue.clone();
            thread::Builder::new()
                .name("vtspi-dispatch".into())
                .spawn(move || engine.run(queue))
                .map_err(ControllerError::Spawn)?
        };

        log::info!(
            "SPI controller '{}' ready: {} kHz input clock, {} select line(s), DMA {}",
            board.name,
            board.input_clock_khz,
            board.hardware.num_chipselect,
            if board.hardware.dma_support { "on" } else { "off" }
        );

        Ok(Self {
            cs_high: Mutex::new(vec![false; usize::from(board.hardware.num_chipselect)]),
            board,
            queue,
            worker: Some(worker),
        })
    }

    /// Board this controller was created for
    pub fn board(&self) -> &BoardConfig {
        &self.board
    }

    /// Controller capabilities
    pub fn hardware(&self) -> &HardwareInfo {
        &self.board.hardware
    }

    /// Validate `device` and fill in its defaults
    ///
    /// On error `device` is left exactly as it was.
    pub fn configure_device(&self, device: &mut SpiDevice) -> Result<(), ConfigError> {
        let hw = &self.board.hardware;

        let unknown = device.mode.difference(SpiMode::SUPPORTED);
        if !unknown.is_empty() {
            log::error!("SPI unsupported mode bits {:#06x}", unknown.bits());
            return Err(ConfigError::UnsupportedMode(unknown.bits()));
        }

        if device.chip_select >= hw.num_chipselect {
            return Err(ConfigError::ChipSelectOutOfRange {
                index: device.chip_select,
                count: hw.num_chipselect,
            });
        }

        let fallback = device.slave.bits_per_word;
        let mut bits = match device.bits_per_word {
            0 => fallback,
            bits => bits,
        };
        if !hw.word_widths.supports(bits) {
            if !hw.word_widths.supports(fallback) {
                log::error!("SPI unsupported {} and {} bits per word", bits, fallback);
                return Err(ConfigError::UnsupportedBitsPerWord {
                    requested: bits,
                    fallback,
                });
            }
            bits = fallback;
        }

        let mut speed = device.max_speed_hz;
        if speed == 0 || speed > hw.max_freq_hz {
            speed = hw.max_freq_hz;
        }
        if speed < hw.min_freq_hz {
            return Err(ConfigError::SpeedTooLow {
                requested: speed,
                min: hw.min_freq_hz,
            });
        }

        device.bits_per_word = bits;
        device.max_speed_hz = speed;

        let cs_high = device.mode.contains(SpiMode::CS_HIGH);
        let mut lines = self.cs_high.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = lines.get_mut(usize::from(device.chip_select)) {
            if *line != cs_high {
                // Park the line at the idle level of the new polarity
                *line = cs_high;
                self.queue.push(Job::Release(*device));
            }
        }
        log::debug!(
            "cs{}: mode {:#04x}, {} bits per word, {} Hz",
            device.chip_select,
            device.mode.bits(),
            bits,
            speed
        );
        Ok(())
    }

    fn validate(&self, message: &Message) -> Result<(), SubmitError> {
        if message.transfers().is_empty() {
            return Err(SubmitError::NoTransfers);
        }
        let max = self.board.hardware.max_transfer_length;
        for (index, t) in message.transfers().iter().enumerate() {
            let len = t.len();
            if len > 0 && t.tx().is_none() && t.rx().is_none() {
                return Err(SubmitError::MissingBuffer { index });
            }
            if let Some(tx) = t.tx() {
                if tx.len() < len {
                    return Err(SubmitError::ShortTxBuffer {
                        index,
                        have: tx.len(),
                        len,
                    });
                }
            }
            if len > max {
                return Err(SubmitError::TransferTooLong { index, len, max });
            }
        }
        Ok(())
    }

    /// Queue `message` for `device`
    ///
    /// Never blocks on hardware. A rejected message that carries a
    /// completion callback is completed with the failure before this
    /// returns. Accepted messages are completed from the dispatcher thread.
    pub fn submit(&self, device: &SpiDevice, mut message: Message) -> Result<(), SubmitError> {
        if !message.has_completion() {
            log::error!("cs{}: msg rejected: no completion callback", device.chip_select);
            return Err(SubmitError::NoCompletion);
        }
        message.reset_result();

        if let Err(e) = self.validate(&message) {
            log::error!("cs{}: {}", device.chip_select, e);
            message.set_status(Err(SpiError::Rejected(e.clone())));
            message.complete();
            return Err(e);
        }

        let hw = &self.board.hardware;
        for t in message.transfers_mut() {
            if t.bits_per_word() == 0 || !hw.word_widths.supports(t.bits_per_word()) {
                t.set_bits_per_word(device.bits_per_word);
            }
            let speed = t.speed_hz();
            if speed == 0 || speed < hw.min_freq_hz || speed > hw.max_freq_hz {
                t.set_speed_hz(device.max_speed_hz);
            }
        }

        log::trace!(
            "cs{}: queued message with {} transfer(s)",
            device.chip_select,
            message.transfers().len()
        );
        self.queue.push(Job::Message {
            device: *device,
            message,
        });
        Ok(())
    }

    /// Jobs waiting behind the one executing
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Wait for the queue to empty and the dispatcher to go idle
    pub fn drain(&self) -> Result<(), ControllerError> {
        let timing = &self.board.timing;
        let policy = PollPolicy::new(
            timing.drain_attempts,
            Duration::from_millis(timing.drain_interval_ms),
        );
        poll_until(policy, "queue drain", || self.queue.is_idle()).map_err(|_| {
            log::warn!("SPI message queue still busy");
            ControllerError::Busy {
                attempts: timing.drain_attempts,
            }
        })
    }

    /// Drain, stop the dispatcher and disable the controller
    ///
    /// The dispatcher still finishes everything queued even when draining
    /// gives up; the drain result is returned.
    pub fn shutdown(mut self) -> Result<(), ControllerError> {
        let drained = self.drain();
        self.stop();
        drained
    }

    fn stop(&mut self) {
        self.queue.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("SPI dispatcher thread panicked");
            }
        }
    }
}

impl fmt::Debug for SpiController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiController")
            .field("board", &self.board.name)
            .field("pending", &self.queue.len())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Drop for SpiController {
    fn drop(&mut self) {
        self.stop();
    }
}
