//! Spectral-flux onset detection over whole audio clips, split by frequency band.

pub mod audio;
pub mod error;
pub mod observer;
pub mod runner;

pub use audio::analysis::{analyze, ClipAnalysis, RunControl};
pub use audio::decode::AudioClip;
pub use audio::features::{SpectralFluxSample, Spectrum};
pub use audio::flux::{AnalyzerState, BandConfig, SpectralFluxAnalyzer};
pub use audio::timing::map_time_to_index;
pub use audio::window::WindowKind;
pub use error::{AnalysisError, Result};
pub use runner::{AnalysisHandle, AnalysisRunner};
