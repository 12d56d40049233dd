/// Shortest segment time; keeps the per-sample increments finite.
const MIN_SEGMENT_TIME: f32 = 0.0001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdsrEnvelope {
    /// Duration of a sample in seconds.
    inv_sample_rate: f32,
    /// Attack rate in inverse seconds.
    inv_attack: f32,
    /// Decay rate in inverse seconds.
    inv_decay: f32,
    /// Sustain level between 0 and 1.
    sustain: f32,
    /// Release rate in inverse seconds.
    inv_release: f32,
    /// Samples left before an automatic release, if the envelope was triggered as a one-shot.
    hold: Option<u64>,
    /// The current envelope state.
    state: AdsrState,
    /// The current amplitude.
    amp: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AdsrState {
    Attack {
        /// The amplitude the attack phase started at
        start: f32,
        /// The progress of the attack phase between 0 and 1.
        t: f32,
    },
    Decay {
        /// The progress of the decay phase between 0 and 1.
        t: f32,
    },
    Sustain,
    Release {
        /// The amplitude the release phase started at
        start: f32,
        /// The progress of the release phase between 0 and 1.
        t: f32,
    },
    Inactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdsrPhase {
    Active,
    Released,
    Inactive,
}

impl AdsrEnvelope {
    /// Creates an envelope from segment times in seconds and a sustain level between 0 and 1.
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            inv_sample_rate: 0.0,
            inv_attack: attack.max(MIN_SEGMENT_TIME).recip(),
            inv_decay: decay.max(MIN_SEGMENT_TIME).recip(),
            sustain: sustain.clamp(0.0, 1.0),
            inv_release: release.max(MIN_SEGMENT_TIME).recip(),
            hold: None,
            state: AdsrState::Inactive,
            amp: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.inv_sample_rate = (sample_rate as f32).recip();
    }

    pub fn phase(&self) -> AdsrPhase {
        match self.state {
            AdsrState::Attack { .. } | AdsrState::Decay { .. } | AdsrState::Sustain => {
                AdsrPhase::Active
            }
            AdsrState::Release { .. } => AdsrPhase::Released,
            AdsrState::Inactive => AdsrPhase::Inactive,
        }
    }

    /// The amplitude produced by the most recent call to `process`.
    pub fn value(&self) -> f32 {
        self.amp
    }

    /// Starts the attack phase from the current amplitude.
    ///
    /// With `hold_samples` set, the envelope releases by itself once that many samples
    /// have been processed. Otherwise it sustains until `release` is called.
    pub fn trigger(&mut self, hold_samples: Option<u64>) {
        self.hold = hold_samples;
        self.state = AdsrState::Attack {
            start: self.amp,
            t: 0.0,
        };
    }

    /// Starts the release phase from the current amplitude. Has no effect on an envelope
    /// that is already releasing or inactive.
    pub fn release(&mut self) {
        self.hold = None;
        if self.phase() == AdsrPhase::Active {
            self.state = AdsrState::Release {
                start: self.amp,
                t: 0.0,
            };
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, AdsrState::Inactive)
    }

    pub fn process(&mut self) -> f32 {
        use AdsrState::*;

        match self.hold {
            Some(0) => self.release(),
            Some(ref mut hold) => *hold -= 1,
            None => {}
        }

        match self.state {
            Attack { start, mut t } => {
                self.amp = start + (1.0 - start) * t;
                t += self.inv_attack * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Attack { start, t };
                } else {
                    self.state = Decay { t: 0.0 };
                }
            }
            Decay { mut t } => {
                self.amp = 1.0 - t * (1.0 - self.sustain);
                t += self.inv_decay * self.inv_sample_rate;
                if t < 1.0 {
                    self.state = Decay { t };
                } else {
                    self.state = Sustain;
                }
            }
            Sustain => self.amp = self.sustain,
            Release { start, mut t } => {
                t += self.inv_release * self.inv_sample_rate;
                if t < 1.0 {
                    self.amp = start * (1.0 - t);
                    self.state = Release { start, t };
                } else {
                    // The release always lands on exactly zero
                    self.amp = 0.0;
                    self.state = Inactive;
                }
            }
            Inactive => self.amp = 0.0,
        }

        self.amp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn envelope(attack: f32, decay: f32, sustain: f32, release: f32) -> AdsrEnvelope {
        let mut env = AdsrEnvelope::new(attack, decay, sustain, release);
        env.set_sample_rate(1000);
        env
    }

    #[test]
    fn test_starts_inactive_and_silent() {
        let mut env = envelope(0.01, 0.01, 0.5, 0.01);
        assert!(!env.is_active());
        assert_eq!(env.process(), 0.0);
        assert_eq!(env.phase(), AdsrPhase::Inactive);
    }

    #[test]
    fn test_reaches_sustain() {
        let mut env = envelope(0.01, 0.01, 0.5, 0.01);
        env.trigger(None);
        for _ in 0..100 {
            env.process();
        }
        assert_eq!(env.phase(), AdsrPhase::Active);
        assert_eq!(env.value(), 0.5);
    }

    #[test]
    fn test_release_ends_at_exactly_zero() {
        let mut env = envelope(0.001, 0.001, 0.8, 0.01);
        env.trigger(None);
        for _ in 0..20 {
            env.process();
        }
        env.release();
        assert_eq!(env.phase(), AdsrPhase::Released);
        let mut samples = 0;
        while env.is_active() {
            let amp = env.process();
            assert!(amp >= 0.0 && amp <= 0.8);
            samples += 1;
            assert!(samples < 1000);
        }
        assert_eq!(env.value(), 0.0);
        assert!((9..=11).contains(&samples));
    }

    #[test]
    fn test_one_shot_releases_after_hold() {
        let mut env = envelope(0.001, 0.001, 1.0, 0.005);
        env.trigger(Some(50));
        for _ in 0..50 {
            env.process();
        }
        assert_eq!(env.phase(), AdsrPhase::Active);
        env.process();
        assert_eq!(env.phase(), AdsrPhase::Released);
        for _ in 0..10 {
            env.process();
        }
        assert!(!env.is_active());
        assert_eq!(env.value(), 0.0);
    }

    #[test]
    fn test_release_is_ignored_when_not_active() {
        let mut env = envelope(0.01, 0.01, 0.5, 0.01);
        env.release();
        assert_eq!(env.phase(), AdsrPhase::Inactive);
    }

    #[test]
    fn test_retrigger_starts_from_current_amplitude() {
        let mut env = envelope(0.1, 0.01, 1.0, 0.1);
        env.trigger(None);
        for _ in 0..50 {
            env.process();
        }
        let before = env.value();
        env.release();
        env.process();
        env.trigger(None);
        let after = env.process();
        assert!(after > 0.0);
        assert!(after <= before);
    }
}
