//! Command implementations

pub mod info;
pub mod stress;
pub mod xfer;

use std::sync::mpsc;
use std::time::Duration;

use vtspi_controller::SpiController;
use vtspi_core::{Message, SlaveConfig, SpiDevice, SpiMode};

use crate::cli::DeviceArgs;

/// How long a single message may take before the CLI gives up on it
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a device descriptor from the command line
pub fn device_from_args(args: &DeviceArgs) -> SpiDevice {
    let mut mode = SpiMode::from_clock_mode(args.mode);
    if args.lsb_first {
        mode |= SpiMode::LSB_FIRST;
    }
    if args.cs_high {
        mode |= SpiMode::CS_HIGH;
    }
    SpiDevice::new(args.cs)
        .with_mode(mode)
        .with_bits_per_word(args.bits)
        .with_max_speed(args.speed)
        .with_slave(SlaveConfig {
            dma_enabled: args.dma,
            ..Default::default()
        })
}

/// Submit `message` and wait for its completion
pub fn run_message(
    ctrl: &SpiController,
    device: &SpiDevice,
    message: Message,
) -> Result<Message, Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    ctrl.submit(
        device,
        message.on_complete(move |m| {
            let _ = tx.send(m);
        }),
    )?;
    let done = rx
        .recv_timeout(MESSAGE_TIMEOUT)
        .map_err(|_| "message did not complete")?;
    Ok(done)
}

/// Format bytes as space separated hex, 16 per line
pub fn hex_dump(data: &[u8]) -> String {
    data.chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_wraps() {
        let data: Vec<u8> = (0..18).collect();
        let dump = hex_dump(&data);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00 01 02"));
        assert_eq!(lines[1], "10 11");
    }

    #[test]
    fn test_device_from_args() {
        let args = DeviceArgs {
            cs: 1,
            mode: 1,
            speed: 2_000_000,
            bits: 16,
            lsb_first: true,
            cs_high: false,
            dma: true,
        };
        let dev = device_from_args(&args);
        assert_eq!(dev.chip_select, 1);
        assert_eq!(dev.mode, SpiMode::CPHA | SpiMode::LSB_FIRST);
        assert_eq!(dev.bits_per_word, 16);
        assert!(dev.slave.dma_enabled);
    }
}
