use crate::audio::{DEFAULT_MAX_DB, DEFAULT_MIN_DB};
use crate::speaking::SpeakingMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "lipsync-viz", version, about = "Audio-driven lip-sync preview in the terminal")]
pub struct Config {
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    #[arg(long, default_value_t = 512)]
    pub fft_size: usize,

    /// Level mapped to byte 0 in the spectrum.
    #[arg(long, default_value_t = DEFAULT_MIN_DB, allow_hyphen_values = true)]
    pub min_db: f32,

    /// Level mapped to byte 255 in the spectrum.
    #[arg(long, default_value_t = DEFAULT_MAX_DB, allow_hyphen_values = true)]
    pub max_db: f32,

    #[arg(long, value_enum, default_value_t = SpeakingMode::Gate)]
    pub speaking: SpeakingMode,

    #[arg(long, default_value_t = 0.02)]
    pub gate_threshold: f32,

    #[arg(long, default_value_t = 250.0)]
    pub gate_hold_ms: f32,

    /// Snapshots older than this count as "no source".
    #[arg(long, default_value_t = 250.0)]
    pub max_source_age_ms: f32,

    #[arg(long, value_enum, default_value_t = ViewMode::Face)]
    pub view: ViewMode,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_name = "FILE")]
    pub tuning: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,

    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewMode {
    #[value(alias = "meters")]
    Bars,
    #[value(alias = "mouth")]
    Face,
}

impl ViewMode {
    pub fn next(self) -> Self {
        match self {
            Self::Bars => Self::Face,
            Self::Face => Self::Bars,
        }
    }
}
