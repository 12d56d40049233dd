/// Converts a relative gain in dB to the corresponding voltage ratio/scaling factor.
pub fn scale_from_gain(gain: f32) -> f32 {
    10.0_f32.powf(gain / 20.0)
}

/// Converts a MIDI note value to a frequency in Hz.
pub fn hz_from_note(note: u8) -> f32 {
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Converts a duration in seconds to a whole number of samples, rounding to the nearest sample.
/// Negative and non-finite durations yield zero.
pub fn samples_from_seconds(seconds: f32, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds as f64 * sample_rate as f64).round() as u64
}
