//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a byte string written as hex digits ("9f 00 00", "9f0000" or "0x9f0000")
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s
        .strip_prefix("0x")
        .unwrap_or(s)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits in '{}'", s));
    }
    if !digits.is_ascii() {
        return Err(format!("Non-hex characters in '{}'", s));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = String::from_utf8_lossy(pair);
            u8::from_str_radix(&pair, 16)
                .map_err(|e| format!("Invalid hex byte '{}': {}", pair, e))
        })
        .collect()
}

/// Raw bytes given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

fn hex_bytes_arg(s: &str) -> Result<HexBytes, String> {
    parse_hex_bytes(s).map(HexBytes)
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Controller backend [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "vtspi")]
#[command(author, version, about = "VT34xx SPI master transfer engine", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board description file (RON). Defaults to the built-in WM8425 EVB board
    #[arg(long, global = true)]
    pub board: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Select line index
    #[arg(long, default_value_t = 0)]
    pub cs: u8,

    /// Clock mode 0-3 (CPOL/CPHA)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub mode: u8,

    /// Clock ceiling in Hz (0 = controller maximum)
    #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
    pub speed: u32,

    /// Bits per word (0 = slave default)
    #[arg(long, default_value_t = 0)]
    pub bits: u8,

    /// Shift least significant bit first
    #[arg(long)]
    pub lsb_first: bool,

    /// Select line is active high
    #[arg(long)]
    pub cs_high: bool,

    /// Allow DMA for transfers longer than the FIFO
    #[arg(long)]
    pub dma: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show board capabilities and the register setup for a device
    Info {
        /// Controller backend
        #[arg(short, long, default_value = "sim", help = backend_help())]
        backend: String,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Run one message: write, then optionally read
    Xfer {
        /// Controller backend
        #[arg(short, long, default_value = "sim", help = backend_help())]
        backend: String,

        #[command(flatten)]
        device: DeviceArgs,

        /// Bytes to send, in hex
        #[arg(short, long, value_parser = hex_bytes_arg)]
        tx: Option<HexBytes>,

        /// Bytes to read after the write
        #[arg(short, long, default_value_t = 0)]
        read: usize,

        /// Capture the bytes clocked in while writing
        #[arg(long)]
        duplex: bool,
    },

    /// Queue many messages and report throughput
    Stress {
        /// Controller backend
        #[arg(short, long, default_value = "sim", help = backend_help())]
        backend: String,

        #[command(flatten)]
        device: DeviceArgs,

        /// Number of messages
        #[arg(short = 'n', long, default_value_t = 100)]
        messages: usize,

        /// Bytes per message
        #[arg(short, long, default_value_t = 256)]
        len: usize,

        /// Check that every message read back what it sent (loopback bus)
        #[arg(long)]
        verify: bool,
    },

    /// List available backends
    ListBackends,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("9f0000"), Ok(vec![0x9f, 0, 0]));
        assert_eq!(parse_hex_bytes("0x0102"), Ok(vec![1, 2]));
        assert_eq!(parse_hex_bytes("de ad:be ef"), Ok(vec![0xde, 0xad, 0xbe, 0xef]));
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn test_parse_hex_bytes_non_ascii() {
        assert!(parse_hex_bytes("aéb").is_err());
        assert!(parse_hex_bytes("9fé0").is_err());
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x10"), Ok(16));
        assert_eq!(parse_hex_u32("1000000"), Ok(1_000_000));
        assert!(parse_hex_u32("ten").is_err());
    }

    #[test]
    fn test_cli_parses_xfer() {
        let cli = Cli::try_parse_from([
            "vtspi", "-v", "xfer", "--tx", "9f", "--read", "3", "--mode", "0", "--speed", "1000000",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Xfer {
                backend,
                device,
                tx,
                read,
                duplex,
            } => {
                assert_eq!(backend, "sim");
                assert_eq!(device.mode, 0);
                assert_eq!(device.speed, 1_000_000);
                assert_eq!(tx, Some(HexBytes(vec![0x9f])));
                assert_eq!(read, 3);
                assert!(!duplex);
            }
            _ => panic!("expected xfer"),
        }
    }
}
