//! vtspi - VT34xx SPI master transfer engine front-end
//!
//! Drives the queued transfer engine against either the built-in controller
//! emulator or a memory-mapped controller.
//!
//! # Architecture
//!
//! - `vtspi-core` holds the message model, board descriptions and the
//!   configuration translator
//! - `vtspi-controller` owns the hardware and runs the dispatcher thread
//! - `vtspi-sim` emulates registers, FIFOs, select pins and DMA channels
//!
//! Every command opens a backend, starts a controller on it, configures one
//! device and then submits messages exactly like a driver client would.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs};
use std::path::Path;
use vtspi_controller::SpiController;
use vtspi_core::{BoardConfig, SpiDevice};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let board = match load_board(cli.board.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            eprintln!("Failed to load board description: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Info { backend, device } => {
            let (ctrl, dev) = open(&backend, &board, &device)?;
            let result = commands::info::run_info(&ctrl, &dev);
            finish(ctrl, result)
        }
        Commands::Xfer {
            backend,
            device,
            tx,
            read,
            duplex,
        } => {
            let (ctrl, dev) = open(&backend, &board, &device)?;
            let result = commands::xfer::run_xfer(
                &ctrl,
                &dev,
                tx.map(|t| t.0),
                read,
                duplex,
                device.dma,
            );
            finish(ctrl, result)
        }
        Commands::Stress {
            backend,
            device,
            messages,
            len,
            verify,
        } => {
            let (ctrl, dev) = open(&backend, &board, &device)?;
            let result =
                commands::stress::run_stress(&ctrl, &dev, messages, len, verify, device.dma);
            finish(ctrl, result)
        }
        Commands::ListBackends => {
            println!("Available backends:");
            for b in backends::available_backends() {
                println!("  {:<8} {}", b.name, b.description);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Load the board from `path`, or the built-in default board
fn load_board(path: Option<&Path>) -> Result<BoardConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let board = BoardConfig::load_file(path)?;
            log::info!("Loaded board '{}' from {}", board.name, path.display());
            Ok(board)
        }
        None => {
            log::debug!("Using built-in board description");
            Ok(BoardConfig::default())
        }
    }
}

/// Start a controller on `backend` and configure the device described by `args`
fn open(
    backend: &str,
    board: &BoardConfig,
    args: &DeviceArgs,
) -> Result<(SpiController, SpiDevice), Box<dyn std::error::Error>> {
    let ctrl = backends::open_controller(backend, board)?;
    let mut dev = commands::device_from_args(args);
    ctrl.configure_device(&mut dev)?;
    Ok((ctrl, dev))
}

/// Shut the controller down, keeping the command's own error first
fn finish(
    ctrl: SpiController,
    result: Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = ctrl.shutdown();
    result?;
    shutdown?;
    Ok(())
}
