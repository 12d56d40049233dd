use super::{
    command::Command, slot::VoiceSlot, PoolConfig, PoolError, VoiceHandle, VoiceRenderer,
};
use crate::voice::{Voice, VoiceTemplate};
use basedrop::Handle;
use log::{debug, trace, warn};
use ringbuf_basedrop as ringbuf;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

struct Shared<P: Send + 'static> {
    slots: Arc<[VoiceSlot]>,
    channel_count: usize,
    voice_stealing: bool,
    /// Source of start stamps; increases with every play.
    play_counter: AtomicU64,
    /// Control threads take turns on the single producer. The render thread never locks.
    commands: Mutex<ringbuf::Producer<Command<P>>>,
}

/// The control half of a voice pool.
///
/// Clone it freely and use it from any thread. Requests made through it are picked up by
/// the matching [`VoiceRenderer`] at the start of its next block.
pub struct VoicePool<V: Voice> {
    shared: Arc<Shared<V::Params>>,
}

impl<V: Voice> Clone for VoicePool<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Voice> VoicePool<V> {
    /// Builds `config.voice_count` voices from `template` along with one mix node per
    /// template output channel.
    ///
    /// Fails without returning anything if the configuration is invalid or any single
    /// voice fails to build. Queued commands are reclaimed through `handle`'s collector.
    pub fn new<T>(
        template: &T,
        config: PoolConfig,
        handle: &Handle,
    ) -> Result<(Self, VoiceRenderer<V>), PoolError>
    where
        T: VoiceTemplate<Voice = V>,
    {
        config.validate()?;

        let channel_count = template.channel_count();
        if channel_count == 0 {
            return Err(PoolError::NoChannels);
        }

        let voices = (0..config.voice_count)
            .map(|index| {
                template
                    .instantiate()
                    .map_err(|source| PoolError::VoiceInit { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let slots: Arc<[VoiceSlot]> =
            (0..config.voice_count).map(|_| VoiceSlot::new()).collect();
        let (producer, consumer) =
            ringbuf::RingBuffer::new(config.command_capacity).split(handle);
        let renderer = VoiceRenderer::new(
            voices,
            channel_count,
            config.max_block_size,
            Arc::clone(&slots),
            consumer,
        );

        debug!(
            "voice pool ready: {} voices, {} channels, stealing {}",
            config.voice_count,
            channel_count,
            if config.voice_stealing { "on" } else { "off" }
        );

        let shared = Shared {
            slots,
            channel_count,
            voice_stealing: config.voice_stealing,
            play_counter: AtomicU64::new(1),
            commands: Mutex::new(producer),
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            renderer,
        ))
    }

    /// Claims a free voice, marking it busy before returning it.
    ///
    /// When every voice is busy and stealing is enabled, takes over the voice that was
    /// played longest ago. It keeps sounding until the caller plays or stops it, and handles
    /// held by its previous owner stop working. Returns `None` if no voice is available,
    /// which callers should treat as "drop this trigger".
    pub fn find_free_voice(&self) -> Option<VoiceHandle> {
        if let Some(voice) = self.claim_free() {
            return Some(voice);
        }

        if !self.shared.voice_stealing {
            trace!("no free voice");
            return None;
        }

        // A voice may have finished since the first scan
        if let Some(voice) = self.claim_free() {
            return Some(voice);
        }

        let slots = &self.shared.slots;
        let (index, slot) = slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.start_time())?;
        let owner = slot.take_over(self.next_start_time());
        debug!("stealing voice {index}");
        Some(VoiceHandle::new(index, owner))
    }

    fn claim_free(&self) -> Option<VoiceHandle> {
        let start_time = self.next_start_time();
        self.shared
            .slots
            .iter()
            .enumerate()
            .find_map(|(index, slot)| {
                let owner = slot.try_claim(start_time)?;
                trace!("claimed voice {index}");
                Some(VoiceHandle::new(index, owner))
            })
    }

    fn next_start_time(&self) -> u64 {
        self.shared.play_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Plays `voice` for `duration` seconds with default parameters.
    /// See [`VoicePool::play_with`].
    pub fn play(
        &self,
        voice: impl Into<Option<VoiceHandle>>,
        duration: f32,
    ) -> Result<(), PoolError> {
        self.play_with(voice, duration, V::Params::default())
    }

    /// Restarts the envelope of `voice` with `params` and connects its outputs to the mix
    /// nodes. Both take effect together at the start of the next block.
    ///
    /// A `duration` of zero plays until [`VoicePool::stop`]; a positive duration releases
    /// by itself. Does nothing for `None`. Fails with [`PoolError::QueueFull`] if too many
    /// requests are pending, and with [`PoolError::VoiceReclaimed`] if the voice has since
    /// been handed to another caller. Nothing changes in either case.
    pub fn play_with(
        &self,
        voice: impl Into<Option<VoiceHandle>>,
        duration: f32,
        params: V::Params,
    ) -> Result<(), PoolError> {
        let Some(voice) = voice.into() else {
            return Ok(());
        };
        let slot = self.slot(voice)?;

        let mut commands = self.lock_commands();
        if commands.is_full() {
            warn!("command queue full, dropping play of voice {}", voice.index());
            return Err(PoolError::QueueFull);
        }

        let Some(epoch) = slot.begin_play(voice.owner(), self.next_start_time()) else {
            debug!("voice {} was reclaimed before it was played", voice.index());
            return Err(PoolError::VoiceReclaimed(voice.index()));
        };
        let command = Command::Play {
            voice: voice.index(),
            epoch,
            duration,
            params,
        };
        // Room was checked under the same lock
        commands.push(command).map_err(|_| PoolError::QueueFull)?;

        trace!("play voice {} (epoch {epoch})", voice.index());
        Ok(())
    }

    /// Starts fading out `voice`. It keeps sounding until its envelope reaches zero, at
    /// which point it is disconnected and returned to the pool. Stopping a claimed voice
    /// that was never played hands the claim back.
    ///
    /// Does nothing for `None`, for a voice that is already free, or for a voice that has
    /// since been handed to another caller.
    pub fn stop(&self, voice: impl Into<Option<VoiceHandle>>) -> Result<(), PoolError> {
        let Some(voice) = voice.into() else {
            return Ok(());
        };
        let slot = self.slot(voice)?;

        let mut commands = self.lock_commands();
        let state = slot.state();
        if !state.busy || state.owner != voice.owner() {
            return Ok(());
        }

        let command = Command::Stop {
            voice: voice.index(),
            owner: state.owner,
            epoch: state.epoch,
        };
        if commands.push(command).is_err() {
            warn!("command queue full, dropping stop of voice {}", voice.index());
            return Err(PoolError::QueueFull);
        }

        trace!("stop voice {}", voice.index());
        Ok(())
    }

    /// Number of output channels, one per mix node.
    pub fn channel_count(&self) -> usize {
        self.shared.channel_count
    }

    pub fn voice_count(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn voice_stealing(&self) -> bool {
        self.shared.voice_stealing
    }

    /// Number of voices currently claimed or playing.
    pub fn busy_voice_count(&self) -> usize {
        self.shared.slots.iter().filter(|slot| slot.is_busy()).count()
    }

    pub fn is_busy(&self, voice: VoiceHandle) -> bool {
        self.shared.slots.get(voice.index()).is_some_and(VoiceSlot::is_busy)
    }

    /// The start stamp of the most recent play of `voice`. Stamps only order plays
    /// relative to each other.
    pub fn start_time(&self, voice: VoiceHandle) -> Option<u64> {
        self.shared.slots.get(voice.index()).map(VoiceSlot::start_time)
    }

    fn lock_commands(&self) -> MutexGuard<'_, ringbuf::Producer<Command<V::Params>>> {
        self.shared
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, voice: VoiceHandle) -> Result<&VoiceSlot, PoolError> {
        self.shared
            .slots
            .get(voice.index())
            .ok_or(PoolError::UnknownVoice(voice.index()))
    }
}
