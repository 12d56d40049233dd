use super::{
    command::Command,
    mix_node::{MixNode, Pin},
    slot::VoiceSlot,
    VoiceHandle,
};
use crate::{
    audio::buffer::AudioBlock,
    processor::{Processor, ProcessorData, ProcessorDescription},
    voice::Voice,
};
use ringbuf_basedrop as ringbuf;
use std::sync::Arc;

/// Callback invoked on the render thread each time a voice has been reclaimed.
type FinishedFn = Box<dyn FnMut(VoiceHandle) + Send>;

/// A voice as seen by the render thread.
struct RenderVoice<V> {
    voice: V,
    /// Number of output channels the voice renders.
    output_channels: usize,
    /// Number of those channels routed to a mix node.
    routed_channels: usize,
    /// Planar scratch buffer, `output_channels` channels of `max_block_size` samples.
    buffer: Box<[f32]>,
    /// Epoch of the last play applied to this voice.
    applied_epoch: u32,
    /// Whether the voice is connected and rendering.
    active: bool,
    /// Whether a stop has been applied since the last play.
    stopping: bool,
    /// Result of the most recent `Voice::process`.
    running: bool,
}

impl<V: Voice> RenderVoice<V> {
    fn channel(&self, channel: usize, frames: usize) -> &[f32] {
        let start = channel * frames;
        &self.buffer[start..start + frames]
    }
}

/// The render half of a voice pool.
///
/// Owned by the thread that pulls audio. Each call to [`VoiceRenderer::process`] applies
/// the play and stop requests queued by [`super::VoicePool`], renders every active voice,
/// sums them into one mix node per channel and reclaims voices whose envelope reached zero.
/// None of this locks or allocates.
pub struct VoiceRenderer<V: Voice> {
    slots: Arc<[VoiceSlot]>,
    commands: ringbuf::Consumer<Command<V::Params>>,
    voices: Box<[RenderVoice<V>]>,
    mix_nodes: Box<[MixNode]>,
    max_block_size: usize,
    on_finished: Option<FinishedFn>,
}

impl<V: Voice> VoiceRenderer<V> {
    pub(crate) fn new(
        voices: Vec<V>,
        channel_count: usize,
        max_block_size: usize,
        slots: Arc<[VoiceSlot]>,
        commands: ringbuf::Consumer<Command<V::Params>>,
    ) -> Self {
        let voice_count = voices.len();
        let voices = voices
            .into_iter()
            .map(|voice| {
                let output_channels = voice.channel_count();
                RenderVoice {
                    voice,
                    output_channels,
                    routed_channels: output_channels.min(channel_count),
                    buffer: vec![0.0; output_channels * max_block_size].into_boxed_slice(),
                    applied_epoch: 0,
                    active: false,
                    stopping: false,
                    running: false,
                }
            })
            .collect();
        let mix_nodes = (0..channel_count)
            .map(|_| MixNode::new(voice_count, max_block_size))
            .collect();

        Self {
            slots,
            commands,
            voices,
            mix_nodes,
            max_block_size,
            on_finished: None,
        }
    }

    /// Number of output channels, one per mix node.
    pub fn channel_count(&self) -> usize {
        self.mix_nodes.len()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// The largest block `process` renders in one call.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Provides the audio sample rate to every voice.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        for rv in self.voices.iter_mut() {
            rv.voice.set_sample_rate(sample_rate);
        }
    }

    /// Registers a callback that runs on the render thread after a voice has finished and
    /// been returned to the pool. It must not block or allocate.
    pub fn set_finished_listener(&mut self, listener: impl FnMut(VoiceHandle) + Send + 'static) {
        self.on_finished = Some(Box::new(listener));
    }

    /// The summed output of mix node `index` for the most recent block.
    pub fn output_for_channel(&self, index: usize) -> Option<&[f32]> {
        self.mix_nodes.get(index).map(MixNode::output)
    }

    /// Number of voice outputs connected to mix node `channel`.
    pub fn connection_count(&self, channel: usize) -> usize {
        self.mix_nodes.get(channel).map_or(0, MixNode::input_count)
    }

    /// Number of mix nodes `voice` is currently connected to.
    pub fn connected_channels(&self, voice: VoiceHandle) -> usize {
        self.mix_nodes
            .iter()
            .filter(|node| node.inputs().iter().any(|pin| pin.voice == voice.index()))
            .count()
    }

    /// The handle of the voice at `index`, as held by its current owner.
    pub fn voice_handle(&self, index: usize) -> Option<VoiceHandle> {
        let slot = self.slots.get(index)?;
        Some(VoiceHandle::new(index, slot.state().owner))
    }

    /// Whether `voice` is connected and rendering.
    pub fn is_active(&self, voice: VoiceHandle) -> bool {
        self.voices.get(voice.index()).is_some_and(|rv| rv.active)
    }

    /// Renders one block of up to `max_block_size` frames and returns the number of
    /// frames rendered. Read the result with [`VoiceRenderer::output_for_channel`].
    pub fn process(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.max_block_size);

        self.apply_commands();

        for rv in self.voices.iter_mut().filter(|rv| rv.active) {
            let len = rv.output_channels * frames;
            let mut block = AudioBlock::new(&mut rv.buffer[..len], rv.output_channels);
            block.clear();
            rv.running = rv.voice.process(&mut block);
        }

        let voices = &self.voices;
        for node in self.mix_nodes.iter_mut() {
            node.sum(frames, move |pin| voices[pin.voice].channel(pin.channel, frames));
        }

        for index in 0..self.voices.len() {
            if self.voices[index].active && !self.voices[index].running {
                self.voice_finished(index);
            }
        }

        frames
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            match command {
                Command::Play {
                    voice,
                    epoch,
                    duration,
                    params,
                } => self.start_voice(voice, epoch, duration, params),
                Command::Stop {
                    voice,
                    owner,
                    epoch,
                } => self.stop_voice(voice, owner, epoch),
            }
        }
    }

    /// Restarts the envelope and connects the voice, both before the next summation pass.
    fn start_voice(&mut self, index: usize, epoch: u32, duration: f32, params: V::Params) {
        let Some(rv) = self.voices.get_mut(index) else {
            return;
        };
        rv.voice.configure(params);
        rv.voice.play(duration);
        rv.applied_epoch = epoch;
        rv.active = true;
        rv.stopping = false;
        rv.running = true;

        let nodes = self.mix_nodes.iter_mut().take(rv.routed_channels);
        for (channel, node) in nodes.enumerate() {
            node.connect(Pin {
                voice: index,
                channel,
            });
        }
    }

    fn stop_voice(&mut self, index: usize, owner: u32, epoch: u32) {
        let Some(rv) = self.voices.get_mut(index) else {
            return;
        };
        // Handed to someone else since the stop was issued
        if self.slots[index].state().owner != owner {
            return;
        }
        if rv.active {
            if !rv.stopping {
                rv.voice.stop();
                rv.stopping = true;
            }
        } else {
            // Claimed but never played
            self.slots[index].release_claim(owner, epoch);
        }
    }

    /// Disconnects a voice whose envelope reached zero and returns it to the pool.
    fn voice_finished(&mut self, index: usize) {
        let rv = &mut self.voices[index];
        debug_assert!(
            rv.voice.envelope_value() == 0.0,
            "voice {index} finished with a non-zero envelope"
        );

        let nodes = self.mix_nodes.iter_mut().take(rv.routed_channels);
        for (channel, node) in nodes.enumerate() {
            node.disconnect(Pin {
                voice: index,
                channel,
            });
        }
        rv.active = false;
        rv.stopping = false;

        // Stays busy if a newer play is already queued for this voice
        let slot = &self.slots[index];
        slot.release_played(rv.applied_epoch);

        if let Some(listener) = self.on_finished.as_mut() {
            listener(VoiceHandle::new(index, slot.state().owner));
        }
    }
}

impl<V: Voice> Processor for VoiceRenderer<V> {
    fn description(&self) -> ProcessorDescription {
        ProcessorDescription {
            num_audio_outs: self.channel_count(),
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        VoiceRenderer::set_sample_rate(self, sample_rate);
    }

    fn process(&mut self, data: ProcessorData) {
        let mut offset = 0;
        while offset < data.samples {
            let frames = VoiceRenderer::process(self, data.samples - offset);
            for (index, buffer) in data.audio_out.iter_mut().enumerate() {
                let out = &mut buffer[offset..offset + frames];
                match self.output_for_channel(index) {
                    Some(mixed) => out.copy_from_slice(mixed),
                    None => out.fill(0.0),
                }
            }
            offset += frames;
        }
    }
}
