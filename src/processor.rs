pub struct ProcessorData<'a> {
    /// Number of samples in each audio block
    pub samples: usize,
    /// List of output audio blocks
    pub audio_out: &'a mut [&'a mut [f32]],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcessorDescription {
    pub num_audio_outs: usize,
}

pub trait Processor {
    /// Gets information about the processor.
    fn description(&self) -> ProcessorDescription;

    /// Provides the audio sample rate to the processor.
    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    /// Processes a batch of audio data. Every output block holds at least `samples` samples.
    fn process(&mut self, data: ProcessorData);
}
