//! A fixed pool of voices mixed into one summing node per output channel.
//!
//! The pool is split in two halves when it is built:
//!
//! - [`VoicePool`] is the control handle. It is cheap to clone and can be shared between
//!   any number of threads that find, play and stop voices.
//! - [`VoiceRenderer`] lives on the render thread. It owns the voices and the mix nodes.
//!
//! Play and stop requests travel from the control handle to the renderer through a
//! bounded ring buffer and take effect at the start of the next rendered block, so every
//! connection change happens between two summation passes. Claiming a voice is a single
//! atomic step on a shared state word that also records the voice's current owner, so two
//! callers can never be handed the same voice and a handle stops working once its voice has
//! been handed to someone else.

use crate::voice::VoiceInitError;
use thiserror::Error;

mod command;
mod control;
mod mix_node;
mod renderer;
mod slot;

pub use control::VoicePool;
pub use mix_node::{MixNode, Pin};
pub use renderer::VoiceRenderer;

/// Identifies one voice of a pool, as handed to one caller.
///
/// Once the voice has been claimed again or stolen, plays through an older handle fail
/// with [`PoolError::VoiceReclaimed`] and stops through it are ignored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle {
    index: usize,
    owner: u32,
}

impl VoiceHandle {
    pub(crate) fn new(index: usize, owner: u32) -> Self {
        Self { index, owner }
    }

    /// Position of the voice in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn owner(&self) -> u32 {
        self.owner
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of voices, at least 1.
    pub voice_count: usize,
    /// Whether `find_free_voice` hands out the oldest playing voice when none is free.
    pub voice_stealing: bool,
    /// The largest number of frames rendered per block.
    pub max_block_size: usize,
    /// Number of play and stop requests that can be queued between two blocks.
    pub command_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            voice_count: 1,
            voice_stealing: true,
            max_block_size: 512,
            command_capacity: 256,
        }
    }
}

impl PoolConfig {
    pub fn with_voice_count(mut self, voice_count: usize) -> Self {
        self.voice_count = voice_count;
        self
    }

    pub fn with_voice_stealing(mut self, voice_stealing: bool) -> Self {
        self.voice_stealing = voice_stealing;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_command_capacity(mut self, command_capacity: usize) -> Self {
        self.command_capacity = command_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.voice_count == 0 {
            return Err(PoolError::InvalidVoiceCount);
        }
        if self.max_block_size == 0 {
            return Err(PoolError::InvalidBlockSize);
        }
        if self.command_capacity == 0 {
            return Err(PoolError::InvalidCommandCapacity);
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("voice count must be at least 1")]
    InvalidVoiceCount,
    #[error("max block size must be at least 1")]
    InvalidBlockSize,
    #[error("command capacity must be at least 1")]
    InvalidCommandCapacity,
    #[error("voice template has no output channels")]
    NoChannels,
    #[error("failed to initialize voice {index}: {source}")]
    VoiceInit {
        index: usize,
        #[source]
        source: VoiceInitError,
    },
    #[error("command queue is full")]
    QueueFull,
    #[error("voice {0} does not belong to this pool")]
    UnknownVoice(usize),
    #[error("voice {0} has been handed to another caller")]
    VoiceReclaimed(usize),
}
