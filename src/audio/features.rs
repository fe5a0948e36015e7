use serde::Serialize;

/// Magnitude spectrum of one frame, full FFT length.
#[derive(Clone, Debug)]
pub struct Spectrum {
    /// Window-corrected magnitudes, one per FFT bin
    pub magnitudes: Vec<f32>,
    /// Seconds from clip start
    pub time: f32,
}

/// Per-frame record kept by a spectral flux analyzer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SpectralFluxSample {
    /// Frame time in seconds
    pub time: f32,
    /// Sum of positive magnitude changes from the previous frame
    pub spectral_flux: f32,
    /// Adaptive threshold (0 until computed)
    pub threshold: f32,
    /// max(0, spectral_flux - threshold), 0 until computed
    pub pruned_spectral_flux: f32,
    /// Strict local maximum of the pruned flux
    pub is_peak: bool,
}
