use crate::error::{AnalysisError, Result};

/// Average interleaved channels down to a single mono stream.
///
/// `samples` must hold exactly `channels * n` values; the result has `n`.
pub fn combine_channels(samples: &[f32], channels: usize) -> Result<Vec<f32>> {
    if channels == 0 {
        return Err(AnalysisError::MalformedClip("channel count is zero".into()));
    }
    if samples.len() % channels != 0 {
        return Err(AnalysisError::MalformedClip(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }

    if channels == 1 {
        return Ok(samples.to_vec());
    }

    let combined = samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(combined)
}

/// Number of whole frames of `fft_size` that fit in `len` samples.
pub fn frame_count(len: usize, fft_size: usize) -> usize {
    if fft_size == 0 {
        return 0;
    }
    len / fft_size
}

/// Non-overlapping frames of `fft_size`; a trailing partial frame is dropped.
pub fn frames(mono: &[f32], fft_size: usize) -> std::slice::ChunksExact<'_, f32> {
    mono.chunks_exact(fft_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_opposites_cancel() {
        let samples: Vec<f32> = [1.0f32, -1.0].iter().copied().cycle().take(2048).collect();
        let mono = combine_channels(&samples, 2).unwrap();

        assert_eq!(mono.len(), 1024);
        assert!(mono.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_average_of_channels() {
        let samples = vec![0.2, 0.4, 0.6, 1.0, 1.0, 1.0];
        let mono = combine_channels(&samples, 3).unwrap();

        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.4).abs() < 1e-6);
        assert!((mono[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mono_passthrough() {
        let samples = vec![0.1, -0.3, 0.5];
        assert_eq!(combine_channels(&samples, 1).unwrap(), samples);
    }

    #[test]
    fn test_malformed_clip_rejected() {
        assert!(matches!(
            combine_channels(&[0.0; 5], 2),
            Err(AnalysisError::MalformedClip(_))
        ));
        assert!(matches!(
            combine_channels(&[0.0; 4], 0),
            Err(AnalysisError::MalformedClip(_))
        ));
    }

    #[test]
    fn test_trailing_remainder_dropped() {
        let mono = vec![0.0f32; 10];
        assert_eq!(frame_count(mono.len(), 4), 2);

        let collected: Vec<&[f32]> = frames(&mono, 4).collect();
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(|f| f.len() == 4));
    }
}
