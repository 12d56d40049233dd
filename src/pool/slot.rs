use std::sync::atomic::{AtomicU64, Ordering};

const BUSY: u64 = 1;
const EPOCH_MASK: u32 = 0x7fff_ffff;
const OWNER_SHIFT: u32 = 32;

/// A decoded snapshot of a slot's packed state word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotState {
    /// Bumped every time the voice is handed to a caller, by claim or by steal.
    pub owner: u32,
    /// Bumped by every play. Wraps at 31 bits.
    pub epoch: u32,
    /// The voice is claimed or playing.
    pub busy: bool,
}

impl SlotState {
    fn from_bits(bits: u64) -> Self {
        Self {
            owner: (bits >> OWNER_SHIFT) as u32,
            epoch: ((bits >> 1) as u32) & EPOCH_MASK,
            busy: bits & BUSY != 0,
        }
    }

    fn to_bits(self) -> u64 {
        ((self.owner as u64) << OWNER_SHIFT)
            | (((self.epoch & EPOCH_MASK) as u64) << 1)
            | self.busy as u64
    }
}

/// The part of a voice's state that control threads and the render thread share.
///
/// Owner, play epoch and busy flag are packed into one word so that claiming, stealing,
/// playing and releasing are each a single atomic step. A handle is only honoured while
/// its owner is current, and the render thread only frees a voice if no play newer than
/// the one it applied has been issued in the meantime.
#[derive(Debug, Default)]
pub(crate) struct VoiceSlot {
    state: AtomicU64,
    start_time: AtomicU64,
}

impl VoiceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_bits(self.state.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.state().busy
    }

    pub fn start_time(&self) -> u64 {
        self.start_time.load(Ordering::Relaxed)
    }

    fn update(
        &self,
        mut f: impl FnMut(SlotState) -> Option<SlotState>,
    ) -> Result<SlotState, SlotState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                f(SlotState::from_bits(bits)).map(SlotState::to_bits)
            })
            .map(SlotState::from_bits)
            .map_err(SlotState::from_bits)
    }

    /// Marks a free voice busy under a new owner. Returns `None` if it was already busy.
    pub fn try_claim(&self, start_time: u64) -> Option<u32> {
        let previous = self
            .update(|state| {
                (!state.busy).then_some(SlotState {
                    owner: state.owner.wrapping_add(1),
                    busy: true,
                    ..state
                })
            })
            .ok()?;
        self.start_time.store(start_time, Ordering::Relaxed);
        Some(previous.owner.wrapping_add(1))
    }

    /// Hands the voice to a new owner whether or not it is busy, leaving it busy.
    /// A play that is already under way keeps sounding until the new owner plays or stops it.
    pub fn take_over(&self, start_time: u64) -> u32 {
        let next = |state: SlotState| SlotState {
            owner: state.owner.wrapping_add(1),
            busy: true,
            ..state
        };
        let previous = match self.update(|state| Some(next(state))) {
            Ok(previous) | Err(previous) => previous,
        };
        self.start_time.store(start_time, Ordering::Relaxed);
        next(previous).owner
    }

    /// Moves the voice to a new epoch, marking it busy, and stamps its start time.
    /// Returns the new epoch, or `None` if `owner` is no longer the voice's owner.
    pub fn begin_play(&self, owner: u32, start_time: u64) -> Option<u32> {
        let previous = self
            .update(|state| {
                (state.owner == owner).then_some(SlotState {
                    epoch: state.epoch.wrapping_add(1) & EPOCH_MASK,
                    busy: true,
                    ..state
                })
            })
            .ok()?;
        self.start_time.store(start_time, Ordering::Relaxed);
        Some(previous.epoch.wrapping_add(1) & EPOCH_MASK)
    }

    /// Frees a voice whose play at `epoch` has finished. Returns `false` if a newer play
    /// has been requested (or the voice is already free), in which case nothing changes.
    pub fn release_played(&self, epoch: u32) -> bool {
        self.update(|state| {
            (state.busy && state.epoch == epoch).then_some(SlotState {
                busy: false,
                ..state
            })
        })
        .is_ok()
    }

    /// Hands back a claim that was never played. Only succeeds if both `owner` and
    /// `epoch` are still current.
    pub fn release_claim(&self, owner: u32, epoch: u32) -> bool {
        self.update(|state| {
            let current = state.busy && state.owner == owner && state.epoch == epoch;
            current.then_some(SlotState {
                busy: false,
                ..state
            })
        })
        .is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let slot = VoiceSlot::new();
        assert!(!slot.is_busy());
        assert_eq!(slot.try_claim(5), Some(1));
        assert!(slot.is_busy());
        assert_eq!(slot.start_time(), 5);
        assert_eq!(slot.try_claim(6), None);
        assert_eq!(slot.start_time(), 5);
    }

    #[test]
    fn test_play_bumps_epoch_and_sets_busy() {
        let slot = VoiceSlot::new();
        let owner = slot.try_claim(0).unwrap();
        assert_eq!(slot.begin_play(owner, 42), Some(1));
        let expected = SlotState {
            owner,
            epoch: 1,
            busy: true,
        };
        assert_eq!(slot.state(), expected);
        assert_eq!(slot.start_time(), 42);

        // Playing an already busy voice keeps it busy
        assert_eq!(slot.begin_play(owner, 43), Some(2));
        assert!(slot.is_busy());
    }

    #[test]
    fn test_play_requires_current_owner() {
        let slot = VoiceSlot::new();
        let first = slot.try_claim(0).unwrap();
        let second = slot.take_over(1);
        assert_ne!(first, second);
        assert_eq!(slot.begin_play(first, 2), None);
        assert_eq!(slot.start_time(), 1);
        assert_eq!(slot.begin_play(second, 3), Some(1));
    }

    #[test]
    fn test_release_requires_current_epoch() {
        let slot = VoiceSlot::new();
        let owner = slot.try_claim(0).unwrap();
        let first = slot.begin_play(owner, 0).unwrap();
        let second = slot.begin_play(owner, 1).unwrap();
        assert!(!slot.release_played(first));
        assert!(slot.is_busy());
        assert!(slot.release_played(second));
        assert!(!slot.is_busy());
        assert!(!slot.release_played(second));
    }

    #[test]
    fn test_new_owner_plays_after_old_play_finishes() {
        let slot = VoiceSlot::new();
        let owner = slot.try_claim(0).unwrap();
        let epoch = slot.begin_play(owner, 1).unwrap();
        let thief = slot.take_over(2);

        // The old episode ends before the new owner plays
        assert!(slot.release_played(epoch));
        assert_eq!(slot.begin_play(thief, 3), Some(epoch + 1));
        assert!(slot.is_busy());
    }

    #[test]
    fn test_take_over_of_free_slot_claims_it() {
        let slot = VoiceSlot::new();
        slot.take_over(7);
        assert!(slot.is_busy());
        assert_eq!(slot.try_claim(8), None);
        assert_eq!(slot.start_time(), 7);
    }

    #[test]
    fn test_release_of_unplayed_claim() {
        let slot = VoiceSlot::new();
        let owner = slot.try_claim(0).unwrap();
        assert!(!slot.release_claim(owner.wrapping_add(1), 0));
        assert!(slot.release_claim(owner, 0));
        assert!(!slot.is_busy());
        assert!(slot.try_claim(1).is_some());
        assert!(!slot.release_claim(owner, 0));
    }

    #[test]
    fn test_state_round_trips_through_bits() {
        let state = SlotState {
            owner: u32::MAX,
            epoch: EPOCH_MASK,
            busy: true,
        };
        assert_eq!(SlotState::from_bits(state.to_bits()), state);
    }
}
