/// Map a playback time onto one of `sample_count` evenly spaced analysis samples.
///
/// `floor(time / (duration / sample_count))`, evaluated in `f32`. Stays within
/// `0..sample_count` for any `time` in `[0, duration)`; negative times give 0.
pub fn map_time_to_index(time: f32, duration: f32, sample_count: usize) -> usize {
    let length_per_sample = duration / sample_count as f32;
    (time / length_per_sample).floor() as usize
}

/// Index of the frame playing at `playback_time`, without knowing the analyzed count.
pub fn time_to_frame_index(playback_time: f32, fft_size: usize, sample_rate: u32) -> usize {
    (playback_time * sample_rate as f32 / fft_size as f32).floor() as usize
}
