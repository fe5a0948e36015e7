use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AnalysisError;

/// Fully materialized PCM clip.
#[derive(Clone, Debug)]
pub struct AudioClip {
    /// Interleaved samples, `channels` values per sample position
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
    /// Seconds
    pub duration: f32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let per_channel = if channels == 0 { 0 } else { samples.len() / channels };
        let duration = if sample_rate == 0 {
            0.0
        } else {
            per_channel as f32 / sample_rate as f32
        };
        Self {
            samples,
            channels,
            sample_rate,
            duration,
        }
    }

    /// Override the duration reported by the audio source.
    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn validate(&self) -> std::result::Result<(), AnalysisError> {
        if self.channels == 0 {
            return Err(AnalysisError::MalformedClip("channel count is zero".into()));
        }
        if self.samples.len() % self.channels != 0 {
            return Err(AnalysisError::MalformedClip(format!(
                "{} samples do not divide into {} channels",
                self.samples.len(),
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(AnalysisError::MalformedClip("sample rate is zero".into()));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(AnalysisError::MalformedClip(format!(
                "duration {} is not a valid length",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Decode an audio file into an interleaved clip, keeping every channel.
pub fn decode_audio(path: &Path) -> Result<AudioClip> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        all_samples.extend_from_slice(sample_buf.samples());
    }

    let clip = AudioClip::new(all_samples, channels.max(1), sample_rate);

    log::info!(
        "Decoded audio: {} samples x {} channel(s), {}Hz, {:.1}s",
        clip.samples_per_channel(),
        clip.channels,
        clip.sample_rate,
        clip.duration
    );

    Ok(clip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_samples() {
        let clip = AudioClip::new(vec![0.0; 88200], 2, 44100);

        assert_eq!(clip.samples_per_channel(), 44100);
        assert!((clip.duration - 1.0).abs() < 1e-6);
        assert!(clip.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(AudioClip::new(vec![0.0; 3], 2, 44100).validate().is_err());
        assert!(AudioClip::new(vec![0.0; 4], 0, 44100).validate().is_err());
        assert!(AudioClip::new(vec![0.0; 4], 2, 0).validate().is_err());
        assert!(AudioClip::new(vec![0.0; 4], 2, 44100)
            .with_duration(f32::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(decode_audio(Path::new("/nonexistent/clip.wav")).is_err());
    }
}
