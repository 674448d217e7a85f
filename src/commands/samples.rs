//! Sample capture and playback

use super::progress::create_progress_bar_with_phase;
use super::read_file;
use bladectl_core::sample::SampleFormat;
use bladectl_core::Module;
use bladectl_device::DeviceHandle;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Samples moved per transfer
const SAMPLES_PER_BLOCK: usize = 16 * 1024;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Capture `samples` SC16Q12 samples into `output`
pub fn cmd_rx(handle: &mut DeviceHandle, output: &Path, samples: usize) -> CmdResult {
    let format = SampleFormat::Sc16Q12;
    let total_bytes = format.byte_len(samples, usize::MAX)?;

    handle.enable_module(Module::Rx, true)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let mut block = vec![0u8; SAMPLES_PER_BLOCK * format.bytes_per_sample()];

    let pb = create_progress_bar_with_phase(total_bytes as u64, "Receiving")?;
    let mut remaining = samples;
    while remaining > 0 {
        let count = remaining.min(SAMPLES_PER_BLOCK);
        let received = handle.rx(&mut block, count)?;
        if received == 0 {
            return Err("Device returned no samples".into());
        }
        writer.write_all(&block[..received * format.bytes_per_sample()])?;
        remaining -= received;
        pb.inc((received * format.bytes_per_sample()) as u64);
    }
    writer.flush()?;
    pb.finish_with_message("Receive complete");

    println!("Wrote {} samples to {:?}", samples, output);
    Ok(())
}

/// Transmit the SC16Q12 samples stored in `input`
pub fn cmd_tx(handle: &mut DeviceHandle, input: &Path) -> CmdResult {
    let format = SampleFormat::Sc16Q12;
    let data = read_file(input)?;
    let bytes_per_sample = format.bytes_per_sample();
    if data.len() % bytes_per_sample != 0 {
        log::warn!(
            "Ignoring {} trailing bytes that do not form a whole sample",
            data.len() % bytes_per_sample
        );
    }
    let samples = data.len() / bytes_per_sample;

    handle.enable_module(Module::Tx, true)?;
    let pb = create_progress_bar_with_phase((samples * bytes_per_sample) as u64, "Transmitting")?;
    for block in data.chunks(SAMPLES_PER_BLOCK * bytes_per_sample) {
        let count = block.len() / bytes_per_sample;
        if count == 0 {
            break;
        }
        let sent = handle.tx(block, count)?;
        pb.inc((sent * bytes_per_sample) as u64);
    }
    pb.finish_with_message("Transmit complete");

    println!("Transmitted {} samples from {:?}", samples, input);
    Ok(())
}
