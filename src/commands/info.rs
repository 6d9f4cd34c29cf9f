//! Info command

use vtspi_controller::SpiController;
use vtspi_core::regs::{cr_clock_mode, cr_divisor};
use vtspi_core::translate::translate;
use vtspi_core::SpiDevice;

/// Print the board, its capabilities and the register setup for `device`
pub fn run_info(
    ctrl: &SpiController,
    device: &SpiDevice,
) -> Result<(), Box<dyn std::error::Error>> {
    let board = ctrl.board();
    let hw = &board.hardware;

    println!("Board: {}", board.name);
    println!("  Input clock:      {} kHz", board.input_clock_khz);
    println!(
        "  Clock range:      {} Hz - {} Hz",
        hw.min_freq_hz, hw.max_freq_hz
    );
    println!("  Word widths:      {:?}", hw.word_widths);
    println!("  Max transfer:     {} bytes", hw.max_transfer_length);
    println!("  DMA:              {}", if hw.dma_support { "yes" } else { "no" });
    println!("  Select drive:     {:?}", hw.select_drive);
    println!("  Port mode:        {:?}", hw.port_mode);
    println!("  Select lines:     {}", hw.num_chipselect);

    let plan = translate(
        device,
        hw,
        board.input_clock_hz(),
        board.timing.default_speed_hz,
    );
    let cr = plan.control();
    println!();
    println!(
        "Device cs{}: mode {:#04x}, {} bits per word, {} Hz",
        device.chip_select,
        device.mode.bits(),
        device.bits_per_word,
        device.max_speed_hz
    );
    println!("  CR:   {:#010x} (divisor {}, clock mode {})", cr, cr_divisor(cr), cr_clock_mode(cr));
    println!("  DFCR: {:#010x}", plan.data_format());
    let actual = board.input_clock_hz() / (2 * u32::from(plan.divisor).max(1));
    println!("  SCLK: {} Hz", actual);
    for sub in &plan.substitutions {
        println!("  note: {}", sub);
    }
    Ok(())
}
