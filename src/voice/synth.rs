use super::{envelope::AdsrEnvelope, Voice, VoiceInitError, VoiceTemplate};
use crate::{
    audio::buffer::AudioBlock,
    note::Note,
    util::{samples_from_seconds, scale_from_gain},
};
use std::f32::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    fn function(self) -> fn(f32) -> f32 {
        match self {
            Waveform::Sine => sine,
            Waveform::Triangle => triangle,
            Waveform::Square => square,
            Waveform::Sawtooth => sawtooth,
        }
    }
}

/// Template for an oscillator-through-envelope voice, copied to every output channel.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynthTemplate {
    /// Number of output channels.
    pub channels: usize,
    /// The oscillator wave form.
    pub waveform: Waveform,
    /// Attack time in seconds.
    pub attack: f32,
    /// Decay time in seconds.
    pub decay: f32,
    /// Sustain level between 0 and 1.
    pub sustain: f32,
    /// Release time in seconds.
    pub release: f32,
    /// Output gain in dB.
    pub gain: f32,
    /// Initial sample rate, can be changed later through `Voice::set_sample_rate`.
    pub sample_rate: u32,
}

impl Default for SynthTemplate {
    fn default() -> Self {
        Self {
            channels: 2,
            waveform: Waveform::Sine,
            attack: 0.005,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
            gain: -12.0,
            sample_rate: 48_000,
        }
    }
}

impl VoiceTemplate for SynthTemplate {
    type Voice = SynthVoice;

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn instantiate(&self) -> Result<SynthVoice, VoiceInitError> {
        if self.channels == 0 {
            return Err(VoiceInitError::new("voice template has no output channels"));
        }
        if self.sample_rate == 0 {
            return Err(VoiceInitError::new("sample rate must be positive"));
        }
        if !(0.0..=1.0).contains(&self.sustain) {
            return Err(VoiceInitError::new(format!(
                "sustain level {} is outside 0..=1",
                self.sustain
            )));
        }
        let times = [
            ("attack", self.attack),
            ("decay", self.decay),
            ("release", self.release),
        ];
        for (name, time) in times {
            if !time.is_finite() || time < 0.0 {
                return Err(VoiceInitError::new(format!("{name} time {time} is invalid")));
            }
        }
        if !self.gain.is_finite() {
            return Err(VoiceInitError::new("gain must be finite"));
        }

        let mut voice = SynthVoice {
            channels: self.channels,
            sample_rate: self.sample_rate,
            inv_sample_rate: 0.0,
            wave: self.waveform.function(),
            gain: scale_from_gain(self.gain),
            note: Note::middle_c(),
            velocity: 0.0,
            phase: 0.0,
            envelope: AdsrEnvelope::new(self.attack, self.decay, self.sustain, self.release),
        };
        voice.configure(SynthParams::default());
        voice.set_sample_rate(self.sample_rate);
        Ok(voice)
    }
}

/// Settings applied to a `SynthVoice` each time it is played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynthParams {
    pub note: Note,
    pub velocity: u8,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            note: Note::middle_c(),
            velocity: 100,
        }
    }
}

pub struct SynthVoice {
    channels: usize,
    sample_rate: u32,
    inv_sample_rate: f32,
    wave: fn(f32) -> f32,
    gain: f32,
    note: Note,
    velocity: f32,
    phase: f32,
    envelope: AdsrEnvelope,
}

impl Voice for SynthVoice {
    type Params = SynthParams;

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.inv_sample_rate = (sample_rate as f32).recip();
        self.envelope.set_sample_rate(sample_rate);
    }

    fn configure(&mut self, params: SynthParams) {
        self.note = params.note;
        self.velocity = (params.velocity.min(127) as f32) / 127.0;
    }

    fn play(&mut self, duration: f32) {
        let hold = (duration > 0.0).then(|| samples_from_seconds(duration, self.sample_rate));
        self.envelope.trigger(hold);
    }

    fn stop(&mut self) {
        self.envelope.release();
    }

    fn envelope_value(&self) -> f32 {
        self.envelope.value()
    }

    fn process(&mut self, audio_out: &mut AudioBlock) -> bool {
        let channels = self.channels.min(audio_out.channels());
        let omega = self.note.frequency() * self.inv_sample_rate;
        let level = self.velocity * self.gain;

        for i in 0..audio_out.frames() {
            let sample = self.envelope.process() * level * (self.wave)(self.phase);
            for ch in 0..channels {
                audio_out.channel_mut(ch)[i] += sample;
            }
            self.phase += omega;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }

        self.envelope.is_active()
    }
}

fn sine(phase: f32) -> f32 {
    (2.0 * PI * phase).sin()
}

fn square(phase: f32) -> f32 {
    if phase > 0.5 {
        1.0
    } else {
        -1.0
    }
}

fn triangle(phase: f32) -> f32 {
    (4.0 * phase - 2.0).abs() - 1.0
}

fn sawtooth(phase: f32) -> f32 {
    2.0 * phase - 1.0
}
