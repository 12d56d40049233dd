/// A request from a control thread, applied by the render thread at the start of a block.
#[derive(Debug)]
pub(crate) enum Command<P> {
    /// Configure, (re)start and connect a voice.
    Play {
        voice: usize,
        /// The slot epoch this play moved the voice to.
        epoch: u32,
        duration: f32,
        params: P,
    },
    /// Start fading out a voice, or hand back a claim that was never played.
    /// Ignored once `owner` is no longer the voice's owner.
    Stop { voice: usize, owner: u32, epoch: u32 },
}
