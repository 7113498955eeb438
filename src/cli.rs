use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::TempoMethod;

#[derive(Parser, Debug)]
#[command(name = "keybpm", about = "Estimate the musical key and tempo of audio files")]
pub struct Cli {
    /// Config file (default: ./keybpm.toml, then ~/.config/keybpm/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse audio files or http(s) URLs
    Analyze(AnalyzeArgs),
    /// Print reverb and delay times for a tempo
    Timing {
        /// Tempo in beats per minute
        #[arg(long)]
        bpm: f32,
    },
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input audio files (WAV, MP3, FLAC, OGG, AAC) or URLs
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Print one JSON record per input
    #[arg(long)]
    pub json: bool,

    /// Also print reverb/delay times for the detected tempo
    #[arg(long)]
    pub timing: bool,

    /// Tempo estimation route
    #[arg(long, value_enum, default_value_t = TempoMethod::Autocorrelation)]
    pub tempo_method: TempoMethod,

    /// Minimum profile correlation for a key to be reported
    #[arg(long, default_value_t = 0.15)]
    pub confidence_floor: f32,

    /// Report only the best key, never a runner-up
    #[arg(long)]
    pub no_ambiguity: bool,

    /// Worker threads for analysing several inputs (default: all cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}
