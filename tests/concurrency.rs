use basedrop::Collector;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
    thread,
};
use voicepool::{
    voice::{SynthParams, SynthTemplate, SynthVoice, Waveform},
    PoolConfig, PoolError, VoiceHandle, VoicePool, VoiceRenderer,
};

const BLOCK: usize = 32;

fn template(channels: usize) -> SynthTemplate {
    SynthTemplate {
        channels,
        waveform: Waveform::Sawtooth,
        attack: 0.002,
        decay: 0.002,
        sustain: 0.5,
        release: 0.005,
        gain: -6.0,
        sample_rate: 1000,
    }
}

fn build(
    collector: &Collector,
    channels: usize,
    config: PoolConfig,
) -> (VoicePool<SynthVoice>, VoiceRenderer<SynthVoice>) {
    let config = config.with_max_block_size(BLOCK);
    VoicePool::new(&template(channels), config, &collector.handle()).unwrap()
}

#[test]
fn concurrent_claims_are_exclusive() {
    let collector = Collector::new();
    let config = PoolConfig::default()
        .with_voice_count(64)
        .with_voice_stealing(false);
    let (pool, _renderer) = build(&collector, 1, config);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..8).filter_map(|_| pool.find_free_voice()).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for voice in handle.join().unwrap() {
            assert!(seen.insert(voice.index()), "{voice:?} was handed out twice");
        }
    }
    assert_eq!(seen.len(), 64);
    assert_eq!(pool.find_free_voice(), None);
}

#[test]
fn stealing_picks_minimum_start_time() {
    let collector = Collector::new();
    let config = PoolConfig::default().with_voice_count(5);
    let (pool, mut renderer) = build(&collector, 2, config);

    // Play in a shuffled order so the oldest voice is not the first one
    let order = [3, 0, 4, 1, 2];
    let mut claimed: Vec<VoiceHandle> = (0..5).map(|_| pool.find_free_voice().unwrap()).collect();
    claimed.sort();
    for &index in &order {
        pool.play(claimed[index], 10.0).unwrap();
    }
    renderer.process(BLOCK);

    let oldest = pool.find_free_voice().unwrap();
    assert_eq!(oldest.index(), claimed[3].index());
    let min = claimed
        .iter()
        .map(|&v| pool.start_time(v).unwrap())
        .min()
        .unwrap();
    assert_eq!(pool.start_time(oldest), Some(min));

    let config = PoolConfig::default()
        .with_voice_count(1)
        .with_voice_stealing(false);
    let (no_steal_pool, _renderer) = build(&collector, 2, config);
    let voice = no_steal_pool.find_free_voice();
    no_steal_pool.play(voice, 10.0).unwrap();
    assert_eq!(no_steal_pool.find_free_voice(), None);
}

#[test]
fn concurrent_steals_hand_out_distinct_owners() {
    let collector = Collector::new();
    let config = PoolConfig::default().with_voice_count(4);
    let (pool, mut renderer) = build(&collector, 1, config);

    let voices: Vec<_> = (0..4).map(|_| pool.find_free_voice().unwrap()).collect();
    for &voice in &voices {
        pool.play(voice, 0.0).unwrap();
    }
    renderer.process(BLOCK);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..16).filter_map(|_| pool.find_free_voice()).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for voice in handle.join().unwrap() {
            assert!(seen.insert(voice), "{voice:?} was handed out twice");
        }
    }
    assert_eq!(seen.len(), threads * 16);

    // Only the last caller to get each voice can still play it
    let mut playable = 0;
    for &voice in seen.iter().chain(&voices) {
        match pool.play(voice, 0.0) {
            Ok(()) => playable += 1,
            Err(PoolError::VoiceReclaimed(_)) => {}
            Err(err) => panic!("unexpected error {err}"),
        }
        renderer.process(BLOCK);
    }
    assert_eq!(playable, 4);
}

#[test]
fn connection_count_follows_voice_lifetime() {
    let collector = Collector::new();
    let config = PoolConfig::default().with_voice_count(4);
    let (pool, mut renderer) = build(&collector, 3, config);

    let voices: Vec<_> = (0..4).map(|_| pool.find_free_voice().unwrap()).collect();
    for &voice in &voices {
        pool.play(voice, 0.0).unwrap();
    }
    renderer.process(BLOCK);
    for &voice in &voices {
        assert_eq!(renderer.connected_channels(voice), 3);
    }
    for channel in 0..3 {
        assert_eq!(renderer.connection_count(channel), 4);
    }

    for &voice in &voices {
        pool.stop(voice).unwrap();
    }
    for _ in 0..4 {
        renderer.process(BLOCK);
    }
    for channel in 0..3 {
        assert_eq!(renderer.connection_count(channel), 0);
    }
    assert_eq!(pool.busy_voice_count(), 0);
}

/// Control threads hammer the pool while the render thread checks that no voice is ever
/// connected on only some of the mix nodes.
#[test]
fn random_play_stop_soak() {
    let collector = Collector::new();
    let config = PoolConfig::default()
        .with_voice_count(6)
        .with_command_capacity(64);
    let (pool, mut renderer) = build(&collector, 2, config);
    let voice_count = pool.voice_count();

    let running = Arc::new(AtomicBool::new(true));
    let render = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut blocks = 0usize;
            while running.load(Ordering::Acquire) || blocks < 64 {
                renderer.process(BLOCK);
                for index in 0..voice_count {
                    let voice = renderer.voice_handle(index).unwrap();
                    let connected = renderer.connected_channels(voice);
                    assert!(
                        connected == 0 || connected == 2,
                        "voice {index} on {connected} channels"
                    );
                    assert_eq!(connected == 2, renderer.is_active(voice));
                }
                blocks += 1;
                thread::yield_now();
            }
            // Let every voice run out
            for _ in 0..64 {
                renderer.process(BLOCK);
            }
            renderer
        })
    };

    let controllers: Vec<_> = (0..4u64)
        .map(|seed| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut mine = Vec::new();
                for _ in 0..500 {
                    if mine.is_empty() || rng.gen_bool(0.6) {
                        let Some(voice) = pool.find_free_voice() else {
                            continue;
                        };
                        let params = SynthParams {
                            note: rng.gen_range(40u8..90).into(),
                            velocity: rng.gen_range(1..=127),
                        };
                        let duration = if rng.gen_bool(0.5) {
                            0.0
                        } else {
                            rng.gen_range(0.001..0.05)
                        };
                        match pool.play_with(voice, duration, params) {
                            Ok(()) | Err(PoolError::QueueFull) => mine.push(voice),
                            // Stolen by another thread in the meantime
                            Err(PoolError::VoiceReclaimed(_)) => {}
                            Err(err) => panic!("unexpected error {err}"),
                        }
                    } else {
                        let voice = mine.swap_remove(rng.gen_range(0..mine.len()));
                        match pool.stop(voice) {
                            Ok(()) => {}
                            Err(PoolError::QueueFull) => mine.push(voice),
                            Err(err) => panic!("unexpected error {err}"),
                        }
                    }
                    thread::yield_now();
                }
                for voice in mine {
                    while let Err(PoolError::QueueFull) = pool.stop(voice) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for controller in controllers {
        controller.join().unwrap();
    }
    running.store(false, Ordering::Release);
    let renderer = render.join().unwrap();

    for channel in 0..2 {
        assert_eq!(renderer.connection_count(channel), 0);
    }
}
