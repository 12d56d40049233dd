/// Interleaves planar channels into `output`, frame by frame.
///
/// Output channels beyond `channels.len()` are filled with silence, and extra input
/// channels are ignored.
pub fn interleave(channels: &[&[f32]], output: &mut [f32], output_channels: usize) {
    if output_channels == 0 {
        return;
    }
    for (i, frame) in output.chunks_exact_mut(output_channels).enumerate() {
        for (ch, sample) in frame.iter_mut().enumerate() {
            *sample = channels
                .get(ch)
                .and_then(|c| c.get(i))
                .copied()
                .unwrap_or(0.0);
        }
    }
}

/// Converts a float sample to a signed 16-bit PCM value, clipping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
