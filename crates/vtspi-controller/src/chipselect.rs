//! Chip-select control
//!
//! Every select line has a GPIO pin. With [`SelectDrive::Program`] the
//! controller's DFCR drive-value field follows the pin as well.

use vtspi_core::hal::SelectPins;
use vtspi_core::regs::*;
use vtspi_core::{SelectDrive, SpiDevice, SpiMode};

use crate::bus::Registers;

const DRIVE_FIELD: u32 = SPI_DFCR_DSV_MASK | SPI_DFCR_DSE_MASK;

/// Assert/deassert of a device's select line
pub struct ChipSelect {
    drive: SelectDrive,
    pins: Box<dyn SelectPins>,
    /// Inactive level per line, learned from the last deassert
    idle_high: Vec<bool>,
}

impl ChipSelect {
    /// Create the controller for `drive`
    pub fn new(drive: SelectDrive, pins: Box<dyn SelectPins>) -> Self {
        Self {
            drive,
            pins,
            idle_high: Vec::new(),
        }
    }

    /// Inactive level of line `index`; active-low until a device says otherwise
    pub fn idle_level(&self, index: u8) -> bool {
        self.idle_high.get(usize::from(index)).copied().unwrap_or(true)
    }

    /// Drive variant chosen at initialization
    pub fn drive(&self) -> SelectDrive {
        self.drive
    }

    /// Put `count` select lines in their inactive state
    pub fn release_all(&mut self, regs: &Registers, count: u8) {
        if self.drive == SelectDrive::Program {
            regs.set_bits(SPI_DFCR, DRIVE_FIELD);
        }
        for index in 0..count {
            let level = self.idle_level(index);
            self.pins.drive(index, level);
        }
    }

    /// Select `device`
    pub fn assert(&mut self, regs: &Registers, device: &SpiDevice) {
        let high = device.mode.contains(SpiMode::CS_HIGH);
        self.pins.drive(device.chip_select, high);
        if self.drive == SelectDrive::Program {
            regs.clear_bits(SPI_DFCR, DRIVE_FIELD);
        }
    }

    /// Deselect `device`
    pub fn deassert(&mut self, regs: &Registers, device: &SpiDevice) {
        if self.drive == SelectDrive::Program {
            regs.set_bits(SPI_DFCR, DRIVE_FIELD);
        }
        let high = !device.mode.contains(SpiMode::CS_HIGH);
        let index = usize::from(device.chip_select);
        if self.idle_high.len() <= index {
            self.idle_high.resize(index + 1, true);
        }
        self.idle_high[index] = high;
        self.pins.drive(device.chip_select, high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtspi_sim::{SimController, SimEvent};

    #[test]
    fn test_program_mode_drives_field_and_pin() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        let mut cs = ChipSelect::new(SelectDrive::Program, Box::new(sim.pins()));
        let dev = SpiDevice::new(1).with_mode(SpiMode::MODE_3);

        cs.assert(&regs, &dev);
        assert_eq!(sim.data_format() & DRIVE_FIELD, 0);
        cs.deassert(&regs, &dev);
        assert_eq!(sim.data_format() & DRIVE_FIELD, DRIVE_FIELD);

        assert_eq!(
            sim.events(),
            vec![
                SimEvent::Pin { index: 1, high: false },
                SimEvent::SelectField { high: true },
                SimEvent::Pin { index: 1, high: true },
            ]
        );
        assert_eq!(sim.pin(1), Some(true));
    }

    #[test]
    fn test_pin_mode_leaves_register_alone() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        let mut cs = ChipSelect::new(SelectDrive::Pin, Box::new(sim.pins()));
        let dev = SpiDevice::new(0);

        cs.assert(&regs, &dev);
        assert_eq!(sim.pin(0), Some(false));
        cs.deassert(&regs, &dev);
        assert_eq!(sim.pin(0), Some(true));
        assert_eq!(sim.data_format(), 0);
    }

    #[test]
    fn test_cs_high_inverts_pin() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        let mut cs = ChipSelect::new(SelectDrive::Pin, Box::new(sim.pins()));
        let dev = SpiDevice::new(0).with_mode(SpiMode::CS_HIGH);

        cs.assert(&regs, &dev);
        assert_eq!(sim.pin(0), Some(true));
        cs.deassert(&regs, &dev);
        assert_eq!(sim.pin(0), Some(false));
    }

    #[test]
    fn test_release_all_keeps_learned_polarity() {
        let sim = SimController::new();
        let regs = Registers::new(Box::new(sim.registers()));
        let mut cs = ChipSelect::new(SelectDrive::Pin, Box::new(sim.pins()));
        assert!(cs.idle_level(2));

        cs.deassert(&regs, &SpiDevice::new(1).with_mode(SpiMode::CS_HIGH));
        cs.release_all(&regs, 3);

        assert_eq!(sim.pin(0), Some(true));
        assert_eq!(sim.pin(1), Some(false));
        assert_eq!(sim.pin(2), Some(true));
        assert!(!cs.idle_level(1));
    }
}
