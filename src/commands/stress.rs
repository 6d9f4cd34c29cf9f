//! Stress command

use std::sync::mpsc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use vtspi_controller::SpiController;
use vtspi_core::{Message, SpiDevice, Transfer};

/// Test pattern for message `seq`
fn pattern(seq: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (seq.wrapping_mul(31) + i) as u8).collect()
}

/// Queue `messages` duplex messages of `len` bytes and wait for all of them
pub fn run_stress(
    ctrl: &SpiController,
    device: &SpiDevice,
    messages: usize,
    len: usize,
    verify: bool,
    dma: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(messages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} messages ({per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    for seq in 0..messages {
        let tx = tx.clone();
        let pb = pb.clone();
        let message = Message::new()
            .with_transfer(Transfer::duplex(pattern(seq, len)))
            .with_dma_mapped(dma)
            .on_complete(move |m| {
                pb.inc(1);
                let _ = tx.send((seq, m));
            });
        ctrl.submit(device, message)?;
    }
    drop(tx);

    let mut failed = 0;
    let mut mismatched = 0;
    let mut bytes = 0;
    let deadline = Duration::from_secs(10) + Duration::from_millis(messages as u64 * 50);
    for _ in 0..messages {
        let (seq, done) = rx
            .recv_timeout(deadline)
            .map_err(|_| "messages did not complete")?;
        bytes += done.actual_length();
        if let Err(e) = done.status() {
            log::error!("message {} failed: {}", seq, e);
            failed += 1;
            continue;
        }
        if verify {
            let sent = pattern(seq, len);
            if done.transfers()[0].rx() != Some(&sent[..]) {
                log::error!("message {} read back different data", seq);
                mismatched += 1;
            }
        }
    }
    let elapsed = start.elapsed();
    pb.finish_with_message("Stress complete");

    println!(
        "{} messages, {} bytes in {:.2?} ({:.1} KiB/s)",
        messages,
        bytes,
        elapsed,
        bytes as f64 / 1024.0 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    if failed > 0 || mismatched > 0 {
        return Err(format!("{} failed, {} mismatched", failed, mismatched).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_differs_per_message() {
        assert_eq!(pattern(0, 3), vec![0, 1, 2]);
        assert_eq!(pattern(1, 3), vec![31, 32, 33]);
        assert_ne!(pattern(2, 8), pattern(3, 8));
    }
}
