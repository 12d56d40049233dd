pub mod audio;
pub mod convert;
pub mod midi;
pub mod note;
pub mod pool;
pub mod processor;
pub mod util;
pub mod voice;

pub use pool::{PoolConfig, PoolError, VoiceHandle, VoicePool, VoiceRenderer};
pub use voice::{Voice, VoiceInitError, VoiceTemplate};
