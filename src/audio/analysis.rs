use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::decode::AudioClip;
use super::features::SpectralFluxSample;
use super::flux::{AnalyzerState, BandConfig, SpectralFluxAnalyzer};
use super::frames;
use super::spectrum::SpectralTransformer;
use super::timing::map_time_to_index;
use super::window::WindowKind;
use crate::error::{AnalysisError, Result};

/// Frames transformed in parallel before being fed to the analyzers.
const BLOCK_FRAMES: usize = 64;

/// Shared between a running pipeline and whoever is waiting on it.
#[derive(Debug, Default)]
pub struct RunControl {
    cancelled: AtomicBool,
    finished: AtomicBool,
    frames_done: AtomicUsize,
    frames_total: AtomicUsize,
}

impl RunControl {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Set once, after the result has been handed over.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// (frames fed to the analyzers, frames in the clip)
    pub fn progress(&self) -> (usize, usize) {
        (
            self.frames_done.load(Ordering::Relaxed),
            self.frames_total.load(Ordering::Relaxed),
        )
    }
}

/// Result of analysing one clip: one analyzer per band, all fed the same spectra.
pub struct ClipAnalysis {
    pub duration: f32,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub frame_count: usize,
    pub bands: Vec<SpectralFluxAnalyzer>,
}

impl ClipAnalysis {
    pub fn band(&self, name: &str) -> Option<&SpectralFluxAnalyzer> {
        self.bands.iter().find(|b| b.name() == name)
    }

    /// Analysis index for a playback time.
    pub fn index_at(&self, time: f32) -> usize {
        map_time_to_index(time, self.duration, self.frame_count)
    }

    /// Every band's sample at `time`, clamped to the last frame.
    pub fn samples_at(&self, time: f32) -> Vec<(&str, &SpectralFluxSample)> {
        if self.frame_count == 0 {
            return Vec::new();
        }
        let index = self.index_at(time).min(self.frame_count - 1);
        self.bands
            .iter()
            .filter_map(|b| b.sample(index).ok().map(|s| (b.name(), s)))
            .collect()
    }
}

/// A validated pipeline, ready to run on the clip it was built for.
pub struct Pipeline {
    transformer: SpectralTransformer,
    analyzers: Vec<SpectralFluxAnalyzer>,
}

impl Pipeline {
    /// Check every precondition up front so nothing fails after work has started.
    pub fn prepare(clip: &AudioClip, window: WindowKind, bands: &[BandConfig]) -> Result<Self> {
        clip.validate()?;

        let first = bands
            .first()
            .ok_or_else(|| AnalysisError::InvalidConfig("no bands configured".into()))?;
        let fft_size = first.fft_size;

        for band in bands {
            band.validate()?;
            if band.fft_size != fft_size {
                return Err(AnalysisError::InvalidConfig(format!(
                    "band '{}' uses fft_size {}, expected {}",
                    band.name, band.fft_size, fft_size
                )));
            }
            if band.sample_rate != clip.sample_rate {
                return Err(AnalysisError::InvalidConfig(format!(
                    "band '{}' expects {} Hz, clip is {} Hz",
                    band.name, band.sample_rate, clip.sample_rate
                )));
            }
        }

        let transformer = SpectralTransformer::new(fft_size, clip.sample_rate, window)?;
        let frames = frames::frame_count(clip.samples_per_channel(), fft_size);
        if !transformer.frame_times_distinct(frames) {
            return Err(AnalysisError::InvalidConfig(format!(
                "fft_size {} is too small to timestamp {} frames",
                fft_size, frames
            )));
        }
        let analyzers = bands
            .iter()
            .cloned()
            .map(SpectralFluxAnalyzer::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transformer,
            analyzers,
        })
    }

    /// Downmix, transform and feed every frame to every analyzer, in frame order.
    ///
    /// Cancellation is checked between frames; a cancelled run drops its analyzers.
    pub fn run(self, clip: &AudioClip, control: &RunControl) -> Result<ClipAnalysis> {
        let Pipeline {
            transformer,
            mut analyzers,
        } = self;
        let fft_size = transformer.fft_size();

        let mono = frames::combine_channels(&clip.samples, clip.channels)?;
        log::info!(
            "Channels combined: {} channel(s) -> {} mono samples",
            clip.channels,
            mono.len()
        );

        let total = frames::frame_count(mono.len(), fft_size);
        control.frames_total.store(total, Ordering::Relaxed);
        log::info!(
            "Analyzing {} frames of {} ({:?} window) across {} band(s)...",
            total,
            fft_size,
            transformer.window(),
            analyzers.len()
        );

        let mut start = 0;
        while start < total {
            let end = (start + BLOCK_FRAMES).min(total);
            if control.is_cancelled() {
                log::info!("Analysis cancelled at frame {}", start);
                return Err(AnalysisError::Cancelled);
            }

            let spectra = transformer.transform_range(&mono, start..end);
            for spectrum in &spectra {
                if control.is_cancelled() {
                    log::info!("Analysis cancelled at {:.2}s", spectrum.time);
                    return Err(AnalysisError::Cancelled);
                }
                for analyzer in analyzers.iter_mut() {
                    analyzer.analyze(spectrum)?;
                }
                control.frames_done.fetch_add(1, Ordering::Relaxed);
            }
            start = end;
        }

        for analyzer in &analyzers {
            if analyzer.state() == AnalyzerState::WarmingUp {
                log::warn!(
                    "Band '{}' never warmed up: {} frames, threshold window {}",
                    analyzer.name(),
                    analyzer.len(),
                    analyzer.config().threshold_window_size
                );
            } else {
                log::debug!(
                    "Band '{}': {} frames, {} peaks",
                    analyzer.name(),
                    analyzer.len(),
                    analyzer.peak_count()
                );
            }
        }

        Ok(ClipAnalysis {
            duration: clip.duration,
            sample_rate: clip.sample_rate,
            fft_size,
            frame_count: total,
            bands: analyzers,
        })
    }
}

/// Analyse a clip on the calling thread.
pub fn analyze(clip: &AudioClip, window: WindowKind, bands: &[BandConfig]) -> Result<ClipAnalysis> {
    Pipeline::prepare(clip, window, bands)?.run(clip, &RunControl::default())
}
