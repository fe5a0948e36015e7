use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Interleaved buffer does not split evenly into the declared channels.
    #[error("malformed clip: {0}")]
    MalformedClip(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("spectrum has {actual} bins, analyzer expects {expected}")]
    SpectrumLength { expected: usize, actual: usize },

    #[error("spectrum at {time}s does not follow previous frame at {previous}s")]
    OutOfOrder { previous: f32, time: f32 },

    #[error("index {index} out of range for {len} spectral flux samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("analysis worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("analysis worker exited without reporting a result")]
    WorkerDisconnected,
}
