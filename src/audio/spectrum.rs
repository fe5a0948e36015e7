use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::ops::Range;
use std::sync::Arc;

use super::features::Spectrum;
use super::frames;
use super::window::{signal_scale_factor, WindowKind};
use crate::error::{AnalysisError, Result};

/// Turns mono frames into window-corrected magnitude spectra.
///
/// Holds no per-frame state, so frames may be transformed in any order
/// and on any thread.
pub struct SpectralTransformer {
    fft_size: usize,
    sample_rate: u32,
    window: WindowKind,
    coefficients: Vec<f32>,
    scale: f32,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralTransformer {
    pub fn new(fft_size: usize, sample_rate: u32, window: WindowKind) -> Result<Self> {
        if fft_size == 0 {
            return Err(AnalysisError::InvalidConfig("fft_size must be positive".into()));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidConfig("sample_rate must be positive".into()));
        }

        let coefficients = window.coefficients(fft_size);
        // Window correction and the 1/N FFT normalisation fold into one factor
        let scale = signal_scale_factor(&coefficients) / fft_size as f32;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            sample_rate,
            window,
            coefficients,
            scale,
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window(&self) -> WindowKind {
        self.window
    }

    /// Seconds from clip start at which frame `index` begins.
    pub fn frame_time(&self, index: usize) -> f32 {
        (index as f64 * self.fft_size as f64 / self.sample_rate as f64) as f32
    }

    /// Whether the first `frame_count` frame times stay strictly increasing
    /// once narrowed to `f32`.
    ///
    /// The step between frames is constant while the `f32` spacing grows with
    /// the value, so only the last pair needs checking.
    pub fn frame_times_distinct(&self, frame_count: usize) -> bool {
        if frame_count < 2 {
            return true;
        }
        let last = self.frame_time(frame_count - 1);
        let spacing = f32::from_bits(last.to_bits() + 1) - last;
        let step = self.fft_size as f64 / self.sample_rate as f64;
        step > spacing as f64
    }

    /// Spectrum of a single frame. `frame` must be `fft_size` long.
    pub fn transform(&self, frame: &[f32], index: usize) -> Spectrum {
        debug_assert_eq!(frame.len(), self.fft_size);

        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        // Bins above Nyquist mirror the lower half of a real signal
        let nyquist = self.fft_size / 2;
        let magnitudes = buffer
            .iter()
            .enumerate()
            .map(|(bin, c)| if bin <= nyquist { c.norm() * self.scale } else { 0.0 })
            .collect();

        Spectrum {
            magnitudes,
            time: self.frame_time(index),
        }
    }

    /// Spectra for frames `range` of `mono`, computed in parallel, returned in frame order.
    pub fn transform_range(&self, mono: &[f32], range: Range<usize>) -> Vec<Spectrum> {
        let n = self.fft_size;
        let end = range.end.min(frames::frame_count(mono.len(), n));
        let start = range.start.min(end);

        let frames: Vec<&[f32]> = frames::frames(mono, n).skip(start).take(end - start).collect();
        frames
            .into_par_iter()
            .enumerate()
            .map(|(offset, frame)| self.transform(frame, start + offset))
            .collect()
    }

    /// Spectra for every whole frame of `mono`.
    pub fn transform_all(&self, mono: &[f32]) -> Vec<Spectrum> {
        self.transform_range(mono, 0..frames::frame_count(mono.len(), self.fft_size))
    }
}
