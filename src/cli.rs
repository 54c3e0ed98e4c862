//! Command-line surface: `run`, `check-config`, `decode-dump`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pet-daq", version, about = "Online DAQ pipeline for a segmented PET detector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the acquisition pipeline against one or more UDP endpoints.
    Run(RunArgs),
    /// Load a configuration and report topology sizes without opening sockets.
    CheckConfig(CheckConfigArgs),
    /// Replay a captured raw byte file through the decoder (and optionally calibrator).
    DecodeDump(DecodeDumpArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the JSON configuration tree.
    #[arg(long)]
    pub config: PathBuf,

    /// One endpoint per stream: `panel:cartridge=host:port`.
    #[arg(long = "endpoint", value_name = "PANEL:CARTRIDGE=ADDR")]
    pub endpoints: Vec<String>,

    /// Directory to write raw/decoded/calibrated output files into.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Optional pedestal text file, loaded after the configuration tree.
    #[arg(long)]
    pub pedestals: Option<PathBuf>,

    /// Optional UV-center text file.
    #[arg(long)]
    pub uv_centers: Option<PathBuf>,

    /// Optional crystal calibration text file.
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Optional per-crystal time calibration text file.
    #[arg(long)]
    pub time_calibration: Option<PathBuf>,

    /// Split output files once they reach this many raw bytes.
    #[arg(long)]
    pub file_size_max: Option<u64>,

    /// Low/high energy gate in keV, e.g. `400,650`.
    #[arg(long, value_parser = parse_energy_gate)]
    pub energy_gate: Option<(f32, f32)>,

    /// Seconds between periodic ProcessInfo status prints.
    #[arg(long, default_value_t = 5)]
    pub status_interval_secs: u64,
}

fn parse_energy_gate(s: &str) -> Result<(f32, f32), String> {
    let (lo, hi) = s
        .split_once(',')
        .ok_or_else(|| "expected LOW,HIGH".to_string())?;
    let lo: f32 = lo.trim().parse().map_err(|_| format!("invalid low energy {lo}"))?;
    let hi: f32 = hi.trim().parse().map_err(|_| format!("invalid high energy {hi}"))?;
    Ok((lo, hi))
}

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct DecodeDumpArgs {
    #[arg(long)]
    pub config: PathBuf,

    /// Captured raw byte file, as produced by a `run` raw output file.
    #[arg(long)]
    pub input: PathBuf,

    /// Also run the calibrator over decoded events.
    #[arg(long, default_value_t = false)]
    pub calibrate: bool,

    /// Use the pedestal-only reduced calibration path instead of the full
    /// gain/crystal-identification pipeline.
    #[arg(long, default_value_t = false)]
    pub pedestal_only: bool,

    /// Print per-event fields instead of a summary count.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}
