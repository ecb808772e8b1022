//! Load command implementation

use indicatif::{ProgressBar, ProgressStyle};
use rfpga_core::hal::{ChipSelect, Clock, GpioPin, SpiBus};
use rfpga_core::{BitstreamSource, FileSource, LoadProgress, Loader};
use std::path::Path;

/// Progress reporter using an indicatif progress bar
struct IndicatifProgress {
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self { bar: None }
    }
}

impl LoadProgress for IndicatifProgress {
    fn started(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Loading")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn chunk_loaded(&mut self, sent: usize, _total: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(sent as u64);
        }
    }

    fn finished(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("Bitstream sent");
        }
    }
}

/// Run the load command against an already constructed loader
pub fn run_load<B, R, D, C, K>(
    loader: &mut Loader<B, R, D, C, K>,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: SpiBus,
    R: GpioPin,
    D: GpioPin,
    C: ChipSelect,
    K: Clock,
{
    let mut source = FileSource::open(input)?;
    println!(
        "Loading {} bytes from {}",
        source.size(),
        input.display()
    );

    let mut progress = IndicatifProgress::new();
    loader.load_with_progress(&mut source, &mut progress)?;

    println!("FPGA configuration complete");
    Ok(())
}
