//! vtspi-sim - In-memory VT34xx SPI controller emulator
//!
//! This crate emulates the controller register window, its FIFOs, the
//! board's select pins and the system DMA channels wired to the FIFOs. It is
//! useful for testing and development without real hardware.
//!
//! Every hardware-visible action is recorded as a [`SimEvent`], so tests can
//! check select timing, chunking and channel lifetimes after the fact.
//! Faults can be injected to make polls and DMA waits time out.
//!
//! The attached peripheral is a closure mapping each shifted-out byte to the
//! byte shifted in; the default is a loopback.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use vtspi_core::hal::{
    DmaBusy, DmaBuffer, DmaChannel, DmaCompletion, DmaController, DmaDirection, RegisterBlock,
    SelectPins,
};
use vtspi_core::regs::*;

/// Peripheral model: byte out, byte in
pub type Peripheral = Box<dyn FnMut(u8) -> u8 + Send>;

/// How long a started DMA transfer waits for the controller to be enabled
const DMA_ENABLE_WAIT: Duration = Duration::from_secs(2);

/// Something the emulated hardware observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A select pin was driven
    Pin { index: u8, high: bool },
    /// The DFCR select drive field changed (high = inactive)
    SelectField { high: bool },
    /// A new clock divisor was programmed
    Divisor(u16),
    /// The FIFO engine shifted a chunk
    Shift { bytes: usize },
    /// A DMA channel was handed out
    DmaRequest(DmaDirection),
    /// A DMA channel was started
    DmaStart { direction: DmaDirection, len: usize },
    /// A DMA channel was released
    DmaFree(DmaDirection),
}

/// Injectable hardware faults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Never shift, so the transmit FIFO never drains
    pub stall_shift: bool,
    /// Stop shifting after this many chunks
    pub stall_after_shifts: Option<usize>,
    /// FIFO reset bits never self-clear
    pub stuck_fifo_reset: bool,
    /// Refuse channel requests in this direction
    pub refuse_dma: Option<DmaDirection>,
    /// Started DMA transfers never signal completion
    pub drop_dma_completion: bool,
}

struct SimState {
    fifo_size: usize,
    cr: u32,
    dfcr: u32,
    cre: u32,
    tx_fifo: VecDeque<u8>,
    rx_fifo: VecDeque<u8>,
    peripheral: Peripheral,
    faults: Faults,
    events: Vec<SimEvent>,
    shifts: usize,
    pins: HashMap<u8, bool>,
    channels: HashMap<DmaDirection, (DmaChannel, DmaCompletion)>,
    dma_rx: Option<(DmaBuffer, usize)>,
    next_channel: u32,
    dma_latency: Duration,
}

impl SimState {
    fn shift(&mut self) {
        if self.tx_fifo.is_empty() {
            return;
        }
        let stalled = self.faults.stall_shift
            || self
                .faults
                .stall_after_shifts
                .is_some_and(|limit| self.shifts >= limit);
        if stalled {
            return;
        }

        let bytes = self.tx_fifo.len();
        while let Some(out) = self.tx_fifo.pop_front() {
            let input = (self.peripheral)(out);
            if self.rx_fifo.len() < self.fifo_size {
                self.rx_fifo.push_back(input);
            }
        }
        self.shifts += 1;
        self.events.push(SimEvent::Shift { bytes });
    }

    fn status(&self) -> u32 {
        let mut sr = 0;
        if self.cr & SPI_CR_ME_MASK != 0 && !self.tx_fifo.is_empty() {
            sr |= SPI_SR_BUSY_MASK;
        }
        if self.tx_fifo.is_empty() {
            sr |= SPI_SR_TFEI_MASK;
        }
        if self.rx_fifo.is_empty() {
            sr |= SPI_SR_RFEI_MASK;
        }
        sr
    }

    fn write_control(&mut self, mut value: u32) {
        if value & SPI_CR_TFR_MASK != 0 {
            self.tx_fifo.clear();
            if !self.faults.stuck_fifo_reset {
                value &= !SPI_CR_TFR_MASK;
            }
        }
        if value & SPI_CR_RFR_MASK != 0 {
            self.rx_fifo.clear();
            if !self.faults.stuck_fifo_reset {
                value &= !SPI_CR_RFR_MASK;
            }
        }
        if cr_divisor(value) != cr_divisor(self.cr) {
            self.events.push(SimEvent::Divisor(cr_divisor(value)));
        }
        self.cr = value;
        if value & SPI_CR_ME_MASK != 0 && value & SPI_CR_DRC_MASK == 0 {
            self.shift();
        }
    }

    fn write_data_format(&mut self, value: u32) {
        const DRIVE: u32 = SPI_DFCR_DSV_MASK | SPI_DFCR_DSE_MASK;
        if value & DRIVE != self.dfcr & DRIVE {
            self.events.push(SimEvent::SelectField {
                high: value & SPI_DFCR_DSV_MASK != 0,
            });
        }
        self.dfcr = value;
    }
}

/// Handle on one emulated controller
///
/// Clones share the same hardware state. Hand the parts to the engine with
/// [`registers`](Self::registers), [`pins`](Self::pins) and
/// [`dma`](Self::dma), keep a clone for inspection.
#[derive(Clone)]
pub struct SimController {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimController {
    /// Emulated controller with a loopback peripheral
    pub fn new() -> Self {
        Self::with_peripheral(|b| b)
    }

    /// Emulated controller with a custom peripheral model
    pub fn with_peripheral<F>(peripheral: F) -> Self
    where
        F: FnMut(u8) -> u8 + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(SimState {
                fifo_size: SPI_FIFO_SIZE,
                cr: 0,
                dfcr: 0,
                cre: 0,
                tx_fifo: VecDeque::new(),
                rx_fifo: VecDeque::new(),
                peripheral: Box::new(peripheral),
                faults: Faults::default(),
                events: Vec::new(),
                shifts: 0,
                pins: HashMap::new(),
                channels: HashMap::new(),
                dma_rx: None,
                next_channel: 0,
                dma_latency: Duration::from_micros(200),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register window for the engine
    pub fn registers(&self) -> SimRegisters {
        SimRegisters { sim: self.clone() }
    }

    /// Select pins for the engine
    pub fn pins(&self) -> SimPins {
        SimPins { sim: self.clone() }
    }

    /// DMA channel allocator for the engine
    pub fn dma(&self) -> SimDma {
        SimDma { sim: self.clone() }
    }

    /// Change the injected faults
    pub fn inject<F: FnOnce(&mut Faults)>(&self, f: F) {
        f(&mut self.state().faults);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }

    /// Everything observed so far
    pub fn events(&self) -> Vec<SimEvent> {
        self.state().events.clone()
    }

    /// Return and forget everything observed so far
    pub fn take_events(&self) -> Vec<SimEvent> {
        std::mem::take(&mut self.state().events)
    }

    /// Sizes of the chunks the FIFO engine shifted, in order
    pub fn shifted_chunks(&self) -> Vec<usize> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Shift { bytes } => Some(*bytes),
                _ => None,
            })
            .collect()
    }

    /// Current control register
    pub fn control(&self) -> u32 {
        self.state().cr
    }

    /// Current data format control register
    pub fn data_format(&self) -> u32 {
        self.state().dfcr
    }

    /// Current control extension register
    pub fn control_ext(&self) -> u32 {
        self.state().cre
    }

    /// Current level of select pin `index`, if it was ever driven
    pub fn pin(&self, index: u8) -> Option<bool> {
        self.state().pins.get(&index).copied()
    }

    /// DMA channels currently handed out
    pub fn open_dma_channels(&self) -> usize {
        self.state().channels.len()
    }

    /// Delay between the controller being enabled and DMA completion
    pub fn set_dma_latency(&self, latency: Duration) {
        self.state().dma_latency = latency;
    }
}

/// Emulated register window
pub struct SimRegisters {
    sim: SimController,
}

impl RegisterBlock for SimRegisters {
    fn read32(&self, offset: usize) -> u32 {
        let state = self.sim.state();
        match offset {
            SPI_CR => state.cr,
            SPI_SR => state.status(),
            SPI_DFCR => state.dfcr,
            SPI_CRE => state.cre,
            _ => {
                log::warn!("sim: read of unknown register {:#x}", offset);
                0
            }
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.sim.state();
        match offset {
            SPI_CR => state.write_control(value),
            // Status flags are computed, write-one-to-clear has nothing to clear
            SPI_SR => {}
            SPI_DFCR => state.write_data_format(value),
            SPI_CRE => state.cre = value,
            _ => log::warn!("sim: write of unknown register {:#x}", offset),
        }
    }

    fn read8(&self, offset: usize) -> u8 {
        let mut state = self.sim.state();
        match offset {
            SPI_RXFIFO => state.rx_fifo.pop_front().unwrap_or(0),
            _ => {
                log::warn!("sim: byte read of {:#x}", offset);
                0
            }
        }
    }

    fn write8(&self, offset: usize, value: u8) {
        let mut state = self.sim.state();
        match offset {
            SPI_TXFIFO => {
                if state.tx_fifo.len() < state.fifo_size {
                    state.tx_fifo.push_back(value);
                } else {
                    log::warn!("sim: transmit FIFO overflow");
                }
            }
            _ => log::warn!("sim: byte write of {:#x}", offset),
        }
    }
}

/// Emulated select pins
pub struct SimPins {
    sim: SimController,
}

impl SelectPins for SimPins {
    fn drive(&mut self, index: u8, high: bool) {
        let mut state = self.sim.state();
        state.pins.insert(index, high);
        state.events.push(SimEvent::Pin { index, high });
    }
}

/// Emulated DMA channels wired to the FIFOs
pub struct SimDma {
    sim: SimController,
}

impl SimDma {
    fn run_transfer(&self, tx_bytes: Vec<u8>) {
        let mut state = self.sim.state();
        if state.faults.drop_dma_completion {
            return;
        }

        let rx = state.dma_rx.take();
        let rx_bytes: Vec<u8> = match &rx {
            Some((_, len)) => tx_bytes
                .iter()
                .take(*len)
                .map(|&b| (state.peripheral)(b))
                .collect(),
            None => {
                for &b in &tx_bytes {
                    (state.peripheral)(b);
                }
                Vec::new()
            }
        };
        let tx_done = state.channels.get(&DmaDirection::Tx).map(|(_, d)| d.clone());
        let rx_done = state.channels.get(&DmaDirection::Rx).map(|(_, d)| d.clone());
        let latency = state.dma_latency;
        drop(state);

        let sim = self.sim.clone();
        thread::spawn(move || {
            // Data only moves once the controller is enabled
            let deadline = Instant::now() + DMA_ENABLE_WAIT;
            while sim.control() & SPI_CR_ME_MASK == 0 {
                if Instant::now() >= deadline {
                    return;
                }
                thread::sleep(Duration::from_micros(100));
            }
            thread::sleep(latency);

            if let (Some((buffer, _)), Some(done)) = (rx, rx_done) {
                buffer.fill_from(&rx_bytes);
                done.signal();
            }
            if let Some(done) = tx_done {
                done.signal();
            }
        });
    }
}

impl DmaController for SimDma {
    fn request(
        &mut self,
        direction: DmaDirection,
        done: DmaCompletion,
    ) -> Result<DmaChannel, DmaBusy> {
        let mut state = self.sim.state();
        if state.faults.refuse_dma == Some(direction) || state.channels.contains_key(&direction) {
            return Err(DmaBusy);
        }
        let channel = DmaChannel {
            id: state.next_channel,
            direction,
        };
        state.next_channel += 1;
        state.channels.insert(direction, (channel, done));
        state.events.push(SimEvent::DmaRequest(direction));
        Ok(channel)
    }

    fn start(&mut self, channel: DmaChannel, buffer: &DmaBuffer, len: usize) {
        let tx_bytes = {
            let mut state = self.sim.state();
            state.events.push(SimEvent::DmaStart {
                direction: channel.direction,
                len,
            });
            match channel.direction {
                DmaDirection::Rx => {
                    state.dma_rx = Some((buffer.clone(), len));
                    return;
                }
                DmaDirection::Tx => {
                    let data = buffer.lock();
                    data[..len.min(data.len())].to_vec()
                }
            }
        };
        self.run_transfer(tx_bytes);
    }

    fn free(&mut self, channel: DmaChannel) {
        let mut state = self.sim.state();
        if state.channels.remove(&channel.direction).is_some() {
            state.events.push(SimEvent::DmaFree(channel.direction));
        } else {
            log::warn!("sim: free of unknown DMA channel {}", channel.id);
        }
        if channel.direction == DmaDirection::Rx {
            state.dma_rx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_shift_loopback() {
        let sim = SimController::with_peripheral(|b| b ^ 0xFF);
        let regs = sim.registers();
        for b in [1u8, 2, 3] {
            regs.write8(SPI_TXFIFO, b);
        }
        assert_eq!(regs.read32(SPI_SR) & SPI_SR_TFEI_MASK, 0);
        regs.write32(SPI_CR, SPI_CR_ME_MASK);
        let sr = regs.read32(SPI_SR);
        assert_ne!(sr & SPI_SR_TFEI_MASK, 0);
        assert_eq!(sr & SPI_SR_RFEI_MASK, 0);
        let rx: Vec<u8> = (0..3).map(|_| regs.read8(SPI_RXFIFO)).collect();
        assert_eq!(rx, vec![0xFE, 0xFD, 0xFC]);
        assert_ne!(regs.read32(SPI_SR) & SPI_SR_RFEI_MASK, 0);
        assert_eq!(sim.shifted_chunks(), vec![3]);
    }

    #[test]
    fn test_fifo_reset_self_clears() {
        let sim = SimController::new();
        let regs = sim.registers();
        regs.write8(SPI_TXFIFO, 0xAA);
        regs.write32(SPI_CR, SPI_CR_TFR_MASK | SPI_CR_RFR_MASK);
        assert_eq!(regs.read32(SPI_CR) & (SPI_CR_TFR_MASK | SPI_CR_RFR_MASK), 0);
        assert_ne!(regs.read32(SPI_SR) & SPI_SR_TFEI_MASK, 0);

        sim.inject(|f| f.stuck_fifo_reset = true);
        regs.write32(SPI_CR, SPI_CR_TFR_MASK);
        assert_ne!(regs.read32(SPI_CR) & SPI_CR_TFR_MASK, 0);
    }

    #[test]
    fn test_dma_channels_are_exclusive() {
        let sim = SimController::new();
        let mut dma = sim.dma();
        let ch = dma.request(DmaDirection::Tx, DmaCompletion::new()).unwrap();
        assert_eq!(
            dma.request(DmaDirection::Tx, DmaCompletion::new()),
            Err(DmaBusy)
        );
        assert_eq!(sim.open_dma_channels(), 1);
        dma.free(ch);
        assert_eq!(sim.open_dma_channels(), 0);
    }

    #[test]
    fn test_dma_transfer_completes_after_enable() {
        let sim = SimController::with_peripheral(|b| b.wrapping_add(1));
        let mut dma = sim.dma();
        let tx_done = DmaCompletion::new();
        let rx_done = DmaCompletion::new();
        let tx_buf = DmaBuffer::new(8);
        let rx_buf = DmaBuffer::new(4);
        tx_buf.fill_from(&[10, 20, 30, 40]);

        let rx = dma.request(DmaDirection::Rx, rx_done.clone()).unwrap();
        dma.start(rx, &rx_buf, 4);
        let tx = dma.request(DmaDirection::Tx, tx_done.clone()).unwrap();
        dma.start(tx, &tx_buf, 8);

        assert!(!rx_done.wait(Duration::from_millis(5)));
        sim.registers()
            .write32(SPI_CR, SPI_CR_DRC_MASK | SPI_CR_ME_MASK);
        assert!(rx_done.wait(Duration::from_secs(2)));
        assert!(tx_done.wait(Duration::from_secs(2)));

        let mut out = [0u8; 4];
        rx_buf.copy_to(&mut out);
        assert_eq!(out, [11, 21, 31, 41]);
    }

    #[test]
    fn test_every_pin_drive_recorded() {
        let sim = SimController::new();
        let mut pins = sim.pins();
        pins.drive(1, true);
        pins.drive(1, true);
        pins.drive(1, false);
        assert_eq!(
            sim.events(),
            vec![
                SimEvent::Pin { index: 1, high: true },
                SimEvent::Pin { index: 1, high: true },
                SimEvent::Pin { index: 1, high: false },
            ]
        );
        assert_eq!(sim.pin(1), Some(false));
    }
}
