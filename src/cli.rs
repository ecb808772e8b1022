//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rfpga")]
#[command(author, version, about = "SPI-slave FPGA configuration tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a bitstream into the FPGA
    Load {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Bitstream file to load
        #[arg(short, long)]
        input: PathBuf,

        /// SPI clock during configuration, in kHz
        #[arg(long)]
        clock_khz: Option<u32>,

        /// Maximum bytes per SPI transaction
        #[arg(long)]
        chunk_size: Option<usize>,

        /// How long to wait for CDONE, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List available programmers
    ListProgrammers,
}
