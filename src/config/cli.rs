//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

/// keymatch - Score a karaoke take's key against its backing track
///
/// Separates vocals from the karaoke recording, estimates the musical key
/// of both the vocals and the backing track with a multi-method ensemble,
/// and reports a key compatibility score.
#[derive(Parser, Debug)]
#[command(name = "keymatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Karaoke recording (vocals over backing)
    #[arg(value_name = "KARAOKE")]
    pub karaoke: PathBuf,

    /// Backing track (instrumental)
    #[arg(value_name = "BACKING")]
    pub backing: PathBuf,

    /// Target analysis window duration in seconds
    #[arg(short = 'w', long, value_name = "SECS", default_value = "30")]
    pub window_duration: f64,

    /// Output directory for artifacts and the JSON report
    #[arg(short, long, value_name = "DIR", default_value = "./keymatch_out")]
    pub output: PathBuf,

    /// External key-detection command (invoked as `CMD <wav-path>`,
    /// expected to print "<tonic> <scale> <strength>")
    #[arg(long, value_name = "CMD")]
    pub detector_cmd: Option<String>,

    /// Timeout for the external detector, in seconds
    #[arg(long, value_name = "SECS", default_value = "20")]
    pub detector_timeout: u64,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}
