//! Message execution on the dispatcher thread
//!
//! The [`Engine`] owns every piece of hardware. It lives on the dispatcher
//! thread, so register programming, select timing and engine choice are
//! serialized without further locking.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vtspi_core::regs::{SPI_CR, SPI_FIFO_SIZE};
use vtspi_core::translate::{clock_divisor, translate};
use vtspi_core::{BoardConfig, Message, PollPolicy, SpiDevice, SpiError};

use crate::bus::Registers;
use crate::chipselect::ChipSelect;
use crate::dma::DmaEngine;
use crate::polled::PolledEngine;
use crate::queue::{Job, Queue};

pub(crate) struct Engine {
    board: BoardConfig,
    regs: Registers,
    select: ChipSelect,
    polled: PolledEngine,
    dma: Option<DmaEngine>,
    policy: PollPolicy,
}

impl Engine {
    pub fn new(
        board: BoardConfig,
        regs: Registers,
        select: ChipSelect,
        dma: Option<DmaEngine>,
    ) -> Self {
        let policy = PollPolicy::from(&board.timing);
        Self {
            polled: PolledEngine::new(&board.timing),
            board,
            regs,
            select,
            dma,
            policy,
        }
    }

    /// Quiesce the controller and release every select line
    pub fn init(&mut self) {
        self.regs.write(SPI_CR, 0);
        self.regs.clear_status();
        self.select
            .release_all(&self.regs, self.board.hardware.num_chipselect);
    }

    fn stop(&mut self) {
        self.regs.disable(self.policy);
        self.select
            .release_all(&self.regs, self.board.hardware.num_chipselect);
        log::debug!("SPI dispatcher stopped");
    }

    /// Dispatcher thread body
    pub fn run(mut self, queue: Arc<Queue>) {
        while let Some(job) = queue.next() {
            match job {
                Job::Message {
                    device,
                    mut message,
                } => {
                    self.execute(&device, &mut message);
                    complete(&device, message);
                }
                Job::Release(device) => self.select.deassert(&self.regs, &device),
            }
            queue.finish();
        }
        self.stop();
    }

    fn apply_speed(&self, speed_hz: u32) {
        let (divisor, sub) = clock_divisor(
            self.board.input_clock_hz(),
            speed_hz,
            self.board.timing.default_speed_hz,
        );
        if let Some(sub) = sub {
            log::warn!("{}", sub);
        }
        self.regs.set_divisor(divisor);
    }

    /// Run every transfer of `message` under one select session
    pub fn execute(&mut self, device: &SpiDevice, message: &mut Message) {
        message.reset_result();

        let plan = translate(
            device,
            &self.board.hardware,
            self.board.input_clock_hz(),
            self.board.timing.default_speed_hz,
        );
        for sub in &plan.substitutions {
            log::warn!("cs{}: {}", device.chip_select, sub);
        }
        if let Err(e) = self.regs.program(&plan, self.policy) {
            log::error!("SPI config register error: {}", e);
            message.set_status(Err(e));
            return;
        }

        let use_dma_for_message = self.board.hardware.dma_support
            && message.is_dma_mapped()
            && device.slave.dma_enabled;
        let mut cs_active = false;
        let mut total = 0;
        let mut status: Result<(), SpiError> = Ok(());

        for transfer in message.transfers_mut() {
            let len = transfer.len();
            let speed_hz = transfer.speed_hz();
            if speed_hz != 0 {
                self.apply_speed(speed_hz);
            }

            if !cs_active {
                self.select.assert(&self.regs, device);
                cs_active = true;
            }

            if len > 0 {
                let (tx, rx) = transfer.buffers_mut();
                let result = match self.dma.as_mut() {
                    Some(dma) if use_dma_for_message && len > SPI_FIFO_SIZE => {
                        log::debug!("cs{}: {} bytes by DMA", device.chip_select, len);
                        dma.execute(&self.regs, &mut self.select, device, tx, rx, len, speed_hz)
                    }
                    _ => {
                        log::trace!("cs{}: {} bytes by FIFO", device.chip_select, len);
                        self.polled.execute(&self.regs, tx, rx, len, speed_hz)
                    }
                };
                match result {
                    Ok(n) => total += n,
                    Err(short) => {
                        log::error!("cs{}: {}", device.chip_select, short);
                        total += short.transferred;
                        status = Err(short.cause);
                        break;
                    }
                }
            }

            if transfer.delay_us() > 0 {
                thread::sleep(Duration::from_micros(u64::from(transfer.delay_us())));
            }

            if transfer.cs_change() {
                self.select.deassert(&self.regs, device);
                cs_active = false;
            }
        }

        if cs_active {
            self.select.deassert(&self.regs, device);
        }
        message.add_actual_length(total);
        message.set_status(status);
    }
}

/// Hand `message` back to its submitter
///
/// A panicking callback is logged and swallowed so the dispatcher keeps
/// serving the queue.
fn complete(device: &SpiDevice, message: Message) {
    if panic::catch_unwind(AssertUnwindSafe(move || message.complete())).is_err() {
        log::error!("cs{}: completion callback panicked", device.chip_select);
    }
}
