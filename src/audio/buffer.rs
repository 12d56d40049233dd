pub trait AudioBuffer<'a>: Sized {
    fn samples(self) -> &'a [f32];
}

pub trait AudioBufferMut<'a>: AudioBuffer<'a> {
    fn samples_mut(self) -> &'a mut [f32];

    /// Fills the audio buffer with silence.
    fn clear(self) {
        self.samples_mut().fill(0.0);
    }

    /// Adds the samples from `other` to the samples in this buffer.
    fn add<'b>(self, other: impl AudioBuffer<'b>) {
        self.combine(other, |s_out, s_in| s_out + s_in)
    }

    fn combine<'b>(self, other: impl AudioBuffer<'b>, mut f: impl FnMut(f32, f32) -> f32) {
        let samples_in = other.samples();
        let samples_out = self.samples_mut();
        assert!(samples_in.len() == samples_out.len());
        for (s_out, s_in) in samples_out.iter_mut().zip(samples_in.iter()) {
            *s_out = (f)(*s_out, *s_in);
        }
    }
}

impl<'a> AudioBuffer<'a> for &'a [f32] {
    fn samples(self) -> &'a [f32] {
        self
    }
}

impl<'a> AudioBuffer<'a> for &'a mut [f32] {
    fn samples(self) -> &'a [f32] {
        self
    }
}

impl<'a> AudioBufferMut<'a> for &'a mut [f32] {
    fn samples_mut(self) -> &'a mut [f32] {
        self
    }
}

/// A block of planar multi-channel audio borrowed from a larger allocation.
///
/// Channel `i` occupies `data[i * frames..(i + 1) * frames]`.
#[derive(Debug)]
pub struct AudioBlock<'a> {
    channels: usize,
    frames: usize,
    data: &'a mut [f32],
}

impl<'a> AudioBlock<'a> {
    /// Wraps `data` as `channels` planar channels. Any trailing samples that do not
    /// make up a whole channel are ignored.
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        Self {
            channels,
            frames,
            data,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }
}
