use crate::audio::buffer::AudioBlock;
use thiserror::Error;

pub mod envelope;
pub mod synth;

pub use synth::{SynthParams, SynthTemplate, SynthVoice, Waveform};

/// One instance of a voice graph: renders a bounded playback episode from trigger
/// through release to silence.
///
/// Voices are owned by the render thread. The pool only ever talks to them between
/// blocks (to apply commands) and through `process`.
pub trait Voice: Send + 'static {
    /// Per-trigger settings, delivered together with the play request.
    type Params: Send + Default + 'static;

    /// Number of output channels the voice renders.
    fn channel_count(&self) -> usize;

    /// Provides the audio sample rate to the voice.
    fn set_sample_rate(&mut self, sample_rate: u32);

    /// Applies per-trigger settings. Called immediately before `play`.
    fn configure(&mut self, params: Self::Params);

    /// Starts or restarts the envelope. A positive `duration` in seconds makes the
    /// envelope release by itself once it has elapsed; zero sustains until `stop`.
    fn play(&mut self, duration: f32);

    /// Starts fading out the envelope. The voice keeps rendering until it reaches zero.
    fn stop(&mut self);

    /// The current envelope amplitude.
    fn envelope_value(&self) -> f32;

    /// Adds one block of audio to `audio_out`, one planar channel per output channel.
    /// A return value of `false` indicates the envelope has reached zero and the voice
    /// will not produce any more sound until it is played again.
    fn process(&mut self, audio_out: &mut AudioBlock) -> bool;
}

/// A resolved voice graph description that voices are built from.
pub trait VoiceTemplate {
    type Voice: Voice;

    /// The number of output channels of voices built from this template.
    fn channel_count(&self) -> usize;

    /// Builds one independent voice.
    fn instantiate(&self) -> Result<Self::Voice, VoiceInitError>;
}

/// A voice could not be built from its template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct VoiceInitError(String);

impl VoiceInitError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }

    pub fn cause(&self) -> &str {
        &self.0
    }
}
