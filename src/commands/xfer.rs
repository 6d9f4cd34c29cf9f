//! Xfer command

use vtspi_controller::SpiController;
use vtspi_core::{Message, SpiDevice, Transfer};

use super::{hex_dump, run_message};

/// Write `tx` then read `read` bytes in one select session
pub fn run_xfer(
    ctrl: &SpiController,
    device: &SpiDevice,
    tx: Option<Vec<u8>>,
    read: usize,
    duplex: bool,
    dma: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut message = Message::new().with_dma_mapped(dma);
    if let Some(data) = tx {
        message.push(if duplex {
            Transfer::duplex(data)
        } else {
            Transfer::write(data)
        });
    }
    if read > 0 {
        message.push(Transfer::read(read));
    }
    if message.transfers().is_empty() {
        return Err("nothing to do: give --tx and/or --read".into());
    }

    let done = run_message(ctrl, device, message)?;
    done.status()?;

    log::info!("Transferred {} bytes", done.actual_length());
    for (index, transfer) in done.transfers().iter().enumerate() {
        if let Some(rx) = transfer.rx() {
            println!("rx[{}]:", index);
            println!("{}", hex_dump(rx));
        }
    }
    Ok(())
}
