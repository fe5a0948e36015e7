use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Window applied to each frame before the FFT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// 0.54 - 0.46*cos(2πn/(N-1))
    #[default]
    Hamming,
    /// 0.5 - 0.5*cos(2πn/(N-1))
    Hann,
    Rectangular,
}

impl WindowKind {
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        if size <= 1 {
            return vec![1.0; size];
        }

        let denom = (size - 1) as f32;
        (0..size)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / denom;
                match self {
                    WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                    WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
                    WindowKind::Rectangular => 1.0,
                }
            })
            .collect()
    }
}

/// Amplitude correction for a windowed signal: N / Σw.
///
/// Multiply FFT magnitudes by this to undo the window's attenuation.
pub fn signal_scale_factor(coefficients: &[f32]) -> f32 {
    let sum: f32 = coefficients.iter().sum();
    if sum <= 0.0 {
        return 1.0;
    }
    coefficients.len() as f32 / sum
}
