//! Consumers of analysed samples.
//!
//! The analysis core never calls these; a host wires them up, usually via
//! [`replay`] driven by its own playback clock.

use std::collections::HashMap;

use crate::audio::analysis::ClipAnalysis;
use crate::audio::features::SpectralFluxSample;

pub trait PeakObserver {
    fn on_sample(&mut self, band: &str, index: usize, sample: &SpectralFluxSample);
}

/// Logs samples through the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver {
    pub peaks_only: bool,
}

impl PeakObserver for LogObserver {
    fn on_sample(&mut self, band: &str, index: usize, sample: &SpectralFluxSample) {
        if self.peaks_only && !sample.is_peak {
            return;
        }
        log::info!(
            "[{}] #{} t={:.3}s flux={:.4} threshold={:.4} pruned={:.4} peak={}",
            band,
            index,
            sample.time,
            sample.spectral_flux,
            sample.threshold,
            sample.pruned_spectral_flux,
            sample.is_peak
        );
    }
}

/// Fires once per distinct peak sample, however often the host revisits it.
#[derive(Debug, Default)]
pub struct FlashTrigger {
    last_peak: HashMap<String, usize>,
    flashes: HashMap<String, usize>,
}

impl FlashTrigger {
    pub fn flashes(&self, band: &str) -> usize {
        self.flashes.get(band).copied().unwrap_or(0)
    }

    pub fn total_flashes(&self) -> usize {
        self.flashes.values().sum()
    }
}

impl PeakObserver for FlashTrigger {
    fn on_sample(&mut self, band: &str, index: usize, sample: &SpectralFluxSample) {
        if !sample.is_peak || self.last_peak.get(band) == Some(&index) {
            return;
        }
        self.last_peak.insert(band.to_string(), index);
        *self.flashes.entry(band.to_string()).or_insert(0) += 1;
        log::debug!("Flash on '{}' at {:.3}s", band, sample.time);
    }
}

/// Feed every band's sample at each playback time to `observer`.
///
/// Times past the end of the clip clamp to the last analysed frame.
pub fn replay<I>(analysis: &ClipAnalysis, playback_times: I, observer: &mut dyn PeakObserver)
where
    I: IntoIterator<Item = f32>,
{
    if analysis.frame_count == 0 {
        return;
    }
    let last = analysis.frame_count - 1;

    for time in playback_times {
        let index = analysis.index_at(time).min(last);
        for band in &analysis.bands {
            if let Ok(sample) = band.sample(index) {
                observer.on_sample(band.name(), index, sample);
            }
        }
    }
}

/// Playback times of a host loop running at `fps` across the clip.
pub fn host_frame_times(duration: f32, fps: u32) -> impl Iterator<Item = f32> {
    let step = 1.0 / fps.max(1) as f32;
    let count = (duration / step).ceil().max(0.0) as usize;
    (0..count).map(move |i| i as f32 * step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(time: f32) -> SpectralFluxSample {
        SpectralFluxSample {
            time,
            spectral_flux: 2.0,
            threshold: 1.0,
            pruned_spectral_flux: 1.0,
            is_peak: true,
        }
    }

    #[test]
    fn test_flash_once_per_peak() {
        let mut trigger = FlashTrigger::default();
        let quiet = SpectralFluxSample::default();

        trigger.on_sample("bass", 3, &peak(0.1));
        trigger.on_sample("bass", 3, &peak(0.1));
        trigger.on_sample("bass", 4, &quiet);
        trigger.on_sample("bass", 9, &peak(0.4));
        trigger.on_sample("high", 3, &peak(0.1));

        assert_eq!(trigger.flashes("bass"), 2);
        assert_eq!(trigger.flashes("high"), 1);
        assert_eq!(trigger.flashes("mid"), 0);
        assert_eq!(trigger.total_flashes(), 3);
    }

    #[test]
    fn test_host_frame_times() {
        let times: Vec<f32> = host_frame_times(1.0, 4).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(host_frame_times(0.0, 60).count(), 0);
    }
}
