use clap::{Parser, ValueEnum};
use fluxbeat::WindowKind;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "fluxbeat", about = "Per-band spectral flux onset detection for audio files")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Config file (defaults to fluxbeat.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// FFT frame size in samples
    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    /// Window applied before each FFT
    #[arg(long, value_enum, default_value_t = WindowKind::Hamming)]
    pub window: WindowKind,

    /// Peak sensitivity: multiple of the local mean flux
    #[arg(long, default_value_t = 1.5)]
    pub threshold_multiplier: f32,

    /// Number of neighbouring frames averaged for the threshold
    #[arg(long, default_value_t = 50)]
    pub threshold_window: usize,

    /// Output format on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only list samples flagged as peaks
    #[arg(long)]
    pub peaks_only: bool,

    /// Print every band's sample at this playback time (seconds) and exit
    #[arg(long)]
    pub at: Option<f32>,

    /// Replay the clip through a simulated host loop at this rate, logging flashes
    #[arg(long)]
    pub replay_fps: Option<u32>,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}
