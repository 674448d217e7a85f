//! Progress reporting with indicatif

use bladectl_core::flash::FlashProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a byte progress bar with a phase label
pub fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Firmware flashing progress using indicatif bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &str) {
        let pb = self.multi.add(
            create_progress_bar_with_phase(total, phase)
                .unwrap_or_else(|_| ProgressBar::new(total)),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn set_position(&self, done: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(done as u64);
        }
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashProgress for IndicatifProgress {
    fn erasing(&mut self, sectors: usize) {
        self.create_spinner(format!("Erasing {} sectors...", sectors));
    }

    fn erase_progress(&mut self, done: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_message(format!("Erased {} sectors...", done));
        }
    }

    fn writing(&mut self, bytes: usize) {
        self.finish("Erase complete");
        self.create_bar(bytes as u64, "Writing");
    }

    fn write_progress(&mut self, done: usize) {
        self.set_position(done);
    }

    fn verifying(&mut self, bytes: usize) {
        self.finish("Write complete");
        self.create_bar(bytes as u64, "Verifying");
    }

    fn verify_progress(&mut self, done: usize) {
        self.set_position(done);
    }

    fn complete(&mut self) {
        self.finish("Verified");
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}
