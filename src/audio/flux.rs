//! Spectral flux onset analysis for one frequency band.
//!
//! Each call to [`SpectralFluxAnalyzer::analyze_spectrum`] appends one
//! sample. Once `threshold_window_size` samples exist, every further call
//! finalizes the threshold of the sample at the cursor and the peak status
//! of the sample just before it, so results lag the input by one to two
//! frames.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::features::{Spectrum, SpectralFluxSample};
use super::timing::map_time_to_index;
use crate::error::{AnalysisError, Result};

pub const DEFAULT_THRESHOLD_MULTIPLIER: f32 = 1.5;
pub const DEFAULT_THRESHOLD_WINDOW_SIZE: usize = 50;

/// Frequency band bins on each side added to the configured range.
const BAND_GUARD_BINS: f32 = 2.0;

/// Configuration of a single analyzer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub name: String,
    pub fft_size: usize,
    pub sample_rate: u32,
    /// Lower bound in Hz; `None` on either bound disables band filtering
    pub min_frequency: Option<f32>,
    pub max_frequency: Option<f32>,
    pub threshold_multiplier: f32,
    pub threshold_window_size: usize,
}

impl BandConfig {
    /// Whole spectrum, default threshold settings.
    pub fn full(name: impl Into<String>, fft_size: usize, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            fft_size,
            sample_rate,
            min_frequency: None,
            max_frequency: None,
            threshold_multiplier: DEFAULT_THRESHOLD_MULTIPLIER,
            threshold_window_size: DEFAULT_THRESHOLD_WINDOW_SIZE,
        }
    }

    pub fn band(
        name: impl Into<String>,
        fft_size: usize,
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Self {
        Self {
            min_frequency: Some(min_frequency),
            max_frequency: Some(max_frequency),
            ..Self::full(name, fft_size, sample_rate)
        }
    }

    /// Bounds in the `-1 = unbounded` convention.
    pub fn from_bounds(
        name: impl Into<String>,
        fft_size: usize,
        sample_rate: u32,
        min_frequency: i32,
        max_frequency: i32,
    ) -> Self {
        let bound = |hz: i32| (hz != -1).then_some(hz as f32);
        Self {
            min_frequency: bound(min_frequency),
            max_frequency: bound(max_frequency),
            ..Self::full(name, fft_size, sample_rate)
        }
    }

    pub fn with_threshold(mut self, multiplier: f32, window_size: usize) -> Self {
        self.threshold_multiplier = multiplier;
        self.threshold_window_size = window_size;
        self
    }

    /// Bass, mid-range and high bands.
    pub fn default_bands(fft_size: usize, sample_rate: u32) -> Vec<Self> {
        vec![
            Self::band("bass", fft_size, sample_rate, 20.0, 250.0),
            Self::band("mid", fft_size, sample_rate, 250.0, 4000.0),
            Self::band("high", fft_size, sample_rate, 4000.0, 20000.0),
        ]
    }

    pub fn is_filtered(&self) -> bool {
        self.min_frequency.is_some() && self.max_frequency.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(AnalysisError::InvalidConfig(format!("band '{}': {}", self.name, msg)))
        };

        if self.fft_size == 0 {
            return invalid("fft_size must be positive".into());
        }
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.threshold_window_size < 2 {
            return invalid(format!(
                "threshold_window_size must be at least 2, got {}",
                self.threshold_window_size
            ));
        }
        if !self.threshold_multiplier.is_finite() || self.threshold_multiplier < 0.0 {
            return invalid(format!(
                "threshold_multiplier must be finite and non-negative, got {}",
                self.threshold_multiplier
            ));
        }
        if let (Some(min), Some(max)) = (self.min_frequency, self.max_frequency) {
            if !(min >= 0.0 && max >= min) {
                return invalid(format!("frequency range {}..{} Hz is not ordered", min, max));
            }
        }
        Ok(())
    }

    /// Bins summed into the flux for this band.
    pub fn bin_range(&self) -> Range<usize> {
        let num_bins = self.fft_size;
        if num_bins == 0 {
            return 0..0;
        }
        match (self.min_frequency, self.max_frequency) {
            (Some(min), Some(max)) => {
                let hz_per_bin = self.sample_rate as f32 / 2.0 / num_bins as f32;
                let lo = ((min / hz_per_bin - BAND_GUARD_BINS).max(0.0) as usize).min(num_bins);
                let hi = (max / hz_per_bin + BAND_GUARD_BINS).min((num_bins - 1) as f32) as usize;
                lo..(hi + 1).max(lo)
            }
            _ => 0..num_bins,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyzerState {
    /// Fewer samples than the threshold window
    WarmingUp,
    Streaming,
}

pub struct SpectralFluxAnalyzer {
    config: BandConfig,
    bins: Range<usize>,
    /// Two-slot rotating buffer; `current` indexes the newest spectrum
    spectra: [Vec<f32>; 2],
    current: usize,
    samples: Vec<SpectralFluxSample>,
    index_to_process: usize,
}

impl SpectralFluxAnalyzer {
    pub fn new(config: BandConfig) -> Result<Self> {
        config.validate()?;

        let bins = config.bin_range();
        log::debug!(
            "Analyzer '{}': bins {}..{} of {}, window {}, multiplier {:.2}",
            config.name,
            bins.start,
            bins.end,
            config.fft_size,
            config.threshold_window_size,
            config.threshold_multiplier
        );

        Ok(Self {
            spectra: [vec![0.0; config.fft_size], vec![0.0; config.fft_size]],
            current: 0,
            samples: Vec::new(),
            // First threshold window is centred, not flush against frame 0
            index_to_process: config.threshold_window_size / 2,
            bins,
            config,
        })
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn analyze(&mut self, spectrum: &Spectrum) -> Result<()> {
        self.analyze_spectrum(&spectrum.magnitudes, spectrum.time)
    }

    /// Advance by exactly one frame.
    pub fn analyze_spectrum(&mut self, spectrum: &[f32], time: f32) -> Result<()> {
        if spectrum.len() != self.config.fft_size {
            return Err(AnalysisError::SpectrumLength {
                expected: self.config.fft_size,
                actual: spectrum.len(),
            });
        }
        if let Some(last) = self.samples.last() {
            if !(time > last.time) {
                return Err(AnalysisError::OutOfOrder {
                    previous: last.time,
                    time,
                });
            }
        }

        self.current ^= 1;
        self.spectra[self.current].copy_from_slice(spectrum);

        let spectral_flux = self.rectified_flux();
        self.samples.push(SpectralFluxSample {
            time,
            spectral_flux,
            ..Default::default()
        });

        let window = self.config.threshold_window_size;
        if self.samples.len() < window {
            log::trace!(
                "Analyzer '{}' warming up: {} of {} samples",
                self.config.name,
                self.samples.len(),
                window
            );
            return Ok(());
        }

        let p = self.index_to_process;
        let threshold = self.flux_threshold(p);
        let sample = &mut self.samples[p];
        sample.threshold = threshold;
        sample.pruned_spectral_flux = (sample.spectral_flux - threshold).max(0.0);
        self.index_to_process += 1;

        // p - 1 is decided once both of its neighbours are final
        if let Some(candidate) = p.checked_sub(1) {
            if self.has_resolved_neighbours(candidate) {
                let pruned = |i: usize| self.samples[i].pruned_spectral_flux;
                let is_peak = pruned(candidate) > pruned(candidate - 1)
                    && pruned(candidate) > pruned(candidate + 1);
                self.samples[candidate].is_peak = is_peak;
            }
        }

        Ok(())
    }

    fn rectified_flux(&self) -> f32 {
        let current = &self.spectra[self.current][self.bins.clone()];
        let previous = &self.spectra[self.current ^ 1][self.bins.clone()];

        current
            .iter()
            .zip(previous.iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum()
    }

    /// Mean flux of the window around `index`, scaled by the multiplier.
    ///
    /// The window spans `W/2` samples before `index` and `W/2 - 1` after it,
    /// clipped to the available samples.
    fn flux_threshold(&self, index: usize) -> f32 {
        let half = self.config.threshold_window_size / 2;
        let start = index.saturating_sub(half);
        let end = (index + half).min(self.samples.len());
        if end <= start {
            return 0.0;
        }

        let sum: f32 = self.samples[start..end].iter().map(|s| s.spectral_flux).sum();
        sum / (end - start) as f32 * self.config.threshold_multiplier
    }

    fn has_resolved_neighbours(&self, index: usize) -> bool {
        let first = self.config.threshold_window_size / 2;
        index > first && index + 1 < self.index_to_process && index + 1 < self.samples.len()
    }

    pub fn state(&self) -> AnalyzerState {
        if self.samples.len() < self.config.threshold_window_size {
            AnalyzerState::WarmingUp
        } else {
            AnalyzerState::Streaming
        }
    }

    /// Indices whose threshold and pruned flux are final.
    pub fn resolved_range(&self) -> Range<usize> {
        let first = self.config.threshold_window_size / 2;
        first..self.index_to_process.max(first)
    }

    pub fn samples(&self) -> &[SpectralFluxSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, index: usize) -> Result<&SpectralFluxSample> {
        self.samples.get(index).ok_or(AnalysisError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    /// Sample playing at `time` within a clip of `duration` seconds.
    pub fn sample_at(&self, time: f32, duration: f32) -> Result<&SpectralFluxSample> {
        self.sample(map_time_to_index(time, duration, self.samples.len()))
    }

    pub fn peaks(&self) -> impl Iterator<Item = (usize, &SpectralFluxSample)> {
        self.samples.iter().enumerate().filter(|(_, s)| s.is_peak)
    }

    pub fn peak_count(&self) -> usize {
        self.peaks().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINS: usize = 8;

    fn analyzer(window: usize) -> SpectralFluxAnalyzer {
        let config = BandConfig::full("test", BINS, 8000).with_threshold(1.5, window);
        SpectralFluxAnalyzer::new(config).unwrap()
    }

    fn feed(analyzer: &mut SpectralFluxAnalyzer, levels: &[f32]) {
        for (i, &level) in levels.iter().enumerate() {
            analyzer
                .analyze_spectrum(&[level; BINS], i as f32 * 0.1)
                .unwrap();
        }
    }

    #[test]
    fn test_rectified_flux_ignores_decreases() {
        let mut a = analyzer(50);
        feed(&mut a, &[1.0, 3.0, 0.5, 0.5, 2.0]);

        let flux: Vec<f32> = a.samples().iter().map(|s| s.spectral_flux).collect();
        assert_eq!(flux, vec![8.0, 16.0, 0.0, 0.0, 12.0]);
        assert!(a.samples().iter().all(|s| s.spectral_flux >= 0.0));
    }

    #[test]
    fn test_warm_up_leaves_defaults() {
        let mut a = analyzer(10);
        feed(&mut a, &[0.0, 1.0, 0.0, 5.0, 0.0]);

        assert_eq!(a.state(), AnalyzerState::WarmingUp);
        assert!(a.resolved_range().is_empty());
        assert!(a.samples().iter().all(|s| s.threshold == 0.0
            && s.pruned_spectral_flux == 0.0
            && !s.is_peak));
        assert_eq!(a.peak_count(), 0);
    }

    #[test]
    fn test_window_of_four_with_four_frames() {
        let mut a = analyzer(4);
        feed(&mut a, &[0.0, 2.0, 4.0, 6.0]);

        assert_eq!(a.state(), AnalyzerState::Streaming);
        assert_eq!(a.resolved_range(), 2..3);

        let s = a.samples();
        // Window [0, 4): flux 0, 16, 16, 16
        assert!((s[2].threshold - 12.0 * 1.5).abs() < 1e-5);
        assert_eq!(s[2].pruned_spectral_flux, 0.0);
        for i in [0, 1, 3] {
            assert_eq!(s[i].threshold, 0.0);
            assert_eq!(s[i].pruned_spectral_flux, 0.0);
            assert!(!s[i].is_peak);
        }
    }

    #[test]
    fn test_onset_after_silence_is_peak() {
        let mut a = analyzer(4);
        let mut levels = vec![0.0; 6];
        levels.extend([1.0; 6]);
        feed(&mut a, &levels);

        let s = a.samples();
        let onset = BINS as f32;
        assert_eq!(s[6].spectral_flux, onset);
        // Window [4, 8) holds the only non-zero flux
        assert!((s[6].threshold - onset / 4.0 * 1.5).abs() < 1e-5);
        assert!((s[6].pruned_spectral_flux - onset * 0.625).abs() < 1e-5);
        assert!(s[6].is_peak);
        assert_eq!(a.peak_count(), 1);
    }

    #[test]
    fn test_pruned_flux_formula_once_streaming() {
        let mut a = analyzer(6);
        let levels: Vec<f32> = (0..40).map(|i| ((i * 7) % 5) as f32).collect();
        feed(&mut a, &levels);

        for i in a.resolved_range() {
            let s = a.samples()[i];
            assert_eq!(s.pruned_spectral_flux, (s.spectral_flux - s.threshold).max(0.0));
        }
    }

    #[test]
    fn test_peak_rule_and_edges() {
        let mut a = analyzer(4);
        let levels: Vec<f32> = (0..60).map(|i| if i % 7 == 0 { 3.0 } else { 0.0 }).collect();
        feed(&mut a, &levels);

        let range = a.resolved_range();
        let s = a.samples();
        for (i, sample) in s.iter().enumerate() {
            if !sample.is_peak {
                continue;
            }
            assert!(i > range.start && i + 1 < range.end, "peak at unresolved edge {}", i);
            assert!(sample.pruned_spectral_flux > s[i - 1].pruned_spectral_flux);
            assert!(sample.pruned_spectral_flux > s[i + 1].pruned_spectral_flux);
        }
        assert!(!s[range.start].is_peak);
        assert!(!s[range.end - 1].is_peak);
        assert!(a.peak_count() > 0);
    }

    #[test]
    fn test_finalized_fields_are_frozen() {
        let mut a = analyzer(4);
        let levels: Vec<f32> = (0..30).map(|i| (i % 3) as f32).collect();
        feed(&mut a, &levels[..20]);
        let before: Vec<SpectralFluxSample> = a.samples()[..a.resolved_range().end - 1].to_vec();

        for (i, &level) in levels[20..].iter().enumerate() {
            a.analyze_spectrum(&[level; BINS], (20 + i) as f32 * 0.1).unwrap();
        }
        assert_eq!(&a.samples()[..before.len()], &before[..]);
    }

    #[test]
    fn test_band_flux_never_exceeds_full() {
        let full_config = BandConfig::full("full", 64, 8000).with_threshold(1.5, 4);
        let band_config = BandConfig::band("band", 64, 8000, 500.0, 1200.0).with_threshold(1.5, 4);
        let mut full = SpectralFluxAnalyzer::new(full_config).unwrap();
        let mut band = SpectralFluxAnalyzer::new(band_config).unwrap();

        for frame in 0..20 {
            let spectrum: Vec<f32> = (0..64)
                .map(|bin| ((bin * 31 + frame * 17) % 13) as f32 * 0.1)
                .collect();
            full.analyze_spectrum(&spectrum, frame as f32).unwrap();
            band.analyze_spectrum(&spectrum, frame as f32).unwrap();
        }

        for (f, b) in full.samples().iter().zip(band.samples()) {
            assert!(b.spectral_flux <= f.spectral_flux);
        }
    }

    #[test]
    fn test_bin_range_guard_and_clamp() {
        // 44100 / 2 / 1024 ≈ 21.53 Hz per bin
        let bass = BandConfig::band("bass", 1024, 44100, 20.0, 250.0);
        assert_eq!(bass.bin_range(), 0..14);

        let high = BandConfig::band("high", 1024, 44100, 4000.0, 30000.0);
        let range = high.bin_range();
        assert_eq!(range.start, 183);
        assert_eq!(range.end, 1024);

        assert_eq!(BandConfig::full("all", 1024, 44100).bin_range(), 0..1024);
        assert!(!BandConfig::from_bounds("x", 1024, 44100, -1, 500).is_filtered());
        assert!(BandConfig::from_bounds("x", 1024, 44100, 20, 500).is_filtered());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(SpectralFluxAnalyzer::new(BandConfig::full("a", 0, 44100)).is_err());
        assert!(SpectralFluxAnalyzer::new(BandConfig::full("a", 1024, 44100).with_threshold(1.5, 1)).is_err());
        assert!(SpectralFluxAnalyzer::new(BandConfig::full("a", 1024, 44100).with_threshold(f32::NAN, 10)).is_err());
        assert!(SpectralFluxAnalyzer::new(BandConfig::band("a", 1024, 44100, 500.0, 100.0)).is_err());
    }

    #[test]
    fn test_rejects_wrong_length_and_order() {
        let mut a = analyzer(4);
        assert!(matches!(
            a.analyze_spectrum(&[0.0; 3], 0.0),
            Err(AnalysisError::SpectrumLength { expected: BINS, actual: 3 })
        ));
        a.analyze_spectrum(&[0.0; BINS], 1.0).unwrap();
        assert!(matches!(
            a.analyze_spectrum(&[0.0; BINS], 1.0),
            Err(AnalysisError::OutOfOrder { .. })
        ));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_index_queries() {
        let mut a = analyzer(4);
        feed(&mut a, &[0.0, 1.0, 2.0]);

        assert!(a.sample(2).is_ok());
        assert!(matches!(a.sample(3), Err(AnalysisError::IndexOutOfRange { index: 3, len: 3 })));
        assert_eq!(a.sample_at(0.0, 0.3).unwrap().time, 0.0);
        assert!((a.sample_at(0.29, 0.3).unwrap().time - 0.2).abs() < 1e-6);
    }
}
