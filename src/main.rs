use basedrop::Collector;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use midir::{Ignore, MidiInput};
use std::{
    collections::HashMap,
    error::Error,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    time::{Duration, Instant},
};
use voicepool::{
    convert::{f32_to_i16, interleave},
    midi::MidiEvent,
    note::Note,
    processor::{Processor, ProcessorData},
    util::samples_from_seconds,
    voice::{SynthParams, SynthTemplate, SynthVoice},
    PoolConfig, VoiceHandle, VoicePool, VoiceRenderer,
};

/// Semitone offsets from middle C played by the generated arpeggio.
const ARPEGGIO: [i8; 6] = [0, 4, 7, 12, 7, 4];
/// Time between two arpeggio notes.
const STEP_SECONDS: f32 = 0.25;
/// How long each arpeggio note is held.
const NOTE_SECONDS: f32 = 0.2;
const BOUNCE_SAMPLE_RATE: u32 = 48_000;
const BOUNCE_CYCLES: usize = 4;
/// Silent steps rendered after the last note so the releases are captured.
const BOUNCE_TAIL_STEPS: usize = 4;

struct Options {
    voices: usize,
    stealing: bool,
    channels: usize,
    bounce: Option<PathBuf>,
}

impl Options {
    fn from_args() -> Result<Self, Box<dyn Error>> {
        let mut options = Options {
            voices: 8,
            stealing: true,
            channels: 2,
            bounce: None,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--voices" => {
                    options.voices = args.next().ok_or("--voices needs a value")?.parse()?
                }
                "--channels" => {
                    options.channels = args.next().ok_or("--channels needs a value")?.parse()?
                }
                "--no-steal" => options.stealing = false,
                "--bounce" => {
                    let path = args.next().ok_or("--bounce needs a file name")?;
                    options.bounce = Some(path.into())
                }
                other => return Err(format!("unknown argument {other}").into()),
            }
        }

        Ok(options)
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_voice_count(self.voices)
            .with_voice_stealing(self.stealing)
    }

    fn template(&self, sample_rate: u32) -> SynthTemplate {
        SynthTemplate {
            channels: self.channels,
            sample_rate,
            ..SynthTemplate::default()
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let options = Options::from_args()?;
    match &options.bounce {
        Some(path) => bounce(path, &options),
        None => run(&options),
    }
}

/// Plays MIDI input, or a generated arpeggio, through the default output device.
fn run(options: &Options) -> Result<(), Box<dyn Error>> {
    let mut collector = Collector::new();

    // Create the output stream configuration
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or("no output device available")?;
    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(format!("unsupported sample format {:?}", supported.sample_format()).into());
    }
    let config: cpal::StreamConfig = supported.into();
    let device_channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    // Create the voice pool
    let template = options.template(sample_rate);
    let (pool, mut renderer) =
        VoicePool::new(&template, options.pool_config(), &collector.handle())?;
    renderer.set_sample_rate(sample_rate);

    let finished = Arc::new(AtomicUsize::new(0));
    let finished_count = Arc::clone(&finished);
    renderer.set_finished_listener(move |_| {
        finished_count.fetch_add(1, Ordering::Relaxed);
    });

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| render_interleaved(&mut renderer, data, device_channels),
        move |err| {
            error!("an error occurred on stream: {}", err);
        },
        None,
    )?;
    stream.play()?;
    info!(
        "playing {} voices on {} ({} Hz, {} channels)",
        pool.voice_count(),
        device.name().unwrap_or_else(|_| "unknown device".into()),
        sample_rate,
        device_channels
    );

    // Get or generate MIDI input
    let (midi_tx, midi_rx) = mpsc::channel();
    let mut midi_in = MidiInput::new("voicepool input")?;
    midi_in.ignore(Ignore::ActiveSense);
    let in_ports = midi_in.ports();
    let _connection;
    if let Some(port) = in_ports.first() {
        info!("listening on {}", midi_in.port_name(port)?);
        let callback = move |_, message: &[u8], _: &mut ()| {
            let event = MidiEvent::from_raw(message);
            if event.is_invalid() {
                return;
            }
            midi_tx.send(event).ok();
        };
        _connection = midi_in
            .connect(port, "voicepool-read", callback, ())
            .map_err(|err| err.to_string())?;
    } else {
        info!("no MIDI input ports available, playing an arpeggio");
        std::thread::spawn(move || loop {
            for offset in ARPEGGIO {
                let note = Note::middle_c().transpose(offset);
                let on = MidiEvent::NoteOn {
                    channel: 0,
                    note,
                    velocity: 100,
                };
                if midi_tx.send(on).is_err() {
                    return;
                }
                std::thread::sleep(Duration::from_secs_f32(NOTE_SECONDS));
                midi_tx.send(MidiEvent::NoteOff { channel: 0, note }).ok();
                std::thread::sleep(Duration::from_secs_f32(STEP_SECONDS - NOTE_SECONDS));
            }
        });
    }

    // Control loop
    let mut held = HashMap::new();
    let mut last_report = Instant::now();
    loop {
        match midi_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => handle_event(&pool, &mut held, event),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        collector.collect();

        if last_report.elapsed() >= Duration::from_secs(5) {
            debug!(
                "{} voices busy, {} finished so far",
                pool.busy_voice_count(),
                finished.load(Ordering::Relaxed)
            );
            last_report = Instant::now();
        }
    }

    Ok(())
}

/// Maps a note on to a newly claimed voice and a note off to stopping that voice.
fn handle_event(
    pool: &VoicePool<SynthVoice>,
    held: &mut HashMap<Note, VoiceHandle>,
    event: MidiEvent,
) {
    match event {
        MidiEvent::NoteOn { note, velocity, .. } => {
            if let Some(voice) = held.remove(&note) {
                pool.stop(voice).ok();
            }
            let Some(voice) = pool.find_free_voice() else {
                info!("no free voice, dropping {note}");
                return;
            };
            // A stolen voice no longer belongs to the note it was playing
            held.retain(|_, v| v.index() != voice.index());
            match pool.play_with(voice, 0.0, SynthParams { note, velocity }) {
                Ok(()) => {
                    held.insert(note, voice);
                }
                Err(err) => {
                    warn!("could not play {note}: {err}");
                    pool.stop(voice).ok();
                }
            }
        }
        MidiEvent::NoteOff { note, .. } => {
            if let Some(voice) = held.remove(&note) {
                if let Err(err) = pool.stop(voice) {
                    warn!("could not stop {note}: {err}");
                }
            }
        }
        MidiEvent::Invalid => {}
    }
}

/// Fills an interleaved device buffer from the pool's mix nodes.
fn render_interleaved(renderer: &mut VoiceRenderer<SynthVoice>, data: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    let mut remaining = data;
    while !remaining.is_empty() {
        let frames = renderer.process(remaining.len() / channels);
        if frames == 0 {
            remaining.fill(0.0);
            return;
        }
        let (block, rest) = std::mem::take(&mut remaining).split_at_mut(frames * channels);
        for (i, frame) in block.chunks_exact_mut(channels).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = renderer.output_for_channel(ch).map_or(0.0, |output| output[i]);
            }
        }
        remaining = rest;
    }
}

/// Renders the arpeggio offline into a 16-bit WAV file.
fn bounce(path: &Path, options: &Options) -> Result<(), Box<dyn Error>> {
    let mut collector = Collector::new();
    let template = options.template(BOUNCE_SAMPLE_RATE);
    let (pool, mut renderer) =
        VoicePool::new(&template, options.pool_config(), &collector.handle())?;

    let step = samples_from_seconds(STEP_SECONDS, BOUNCE_SAMPLE_RATE) as usize;
    let mut planar = vec![vec![0.0; step]; options.channels];
    let mut interleaved = vec![0.0; step * options.channels];

    let spec = hound::WavSpec {
        channels: options.channels as u16,
        sample_rate: BOUNCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let notes = ARPEGGIO
        .iter()
        .cycle()
        .take(ARPEGGIO.len() * BOUNCE_CYCLES)
        .map(Some);
    let tail = std::iter::repeat(None).take(BOUNCE_TAIL_STEPS);
    for offset in notes.chain(tail) {
        if let Some(&offset) = offset {
            let params = SynthParams {
                note: Note::middle_c().transpose(offset),
                velocity: 100,
            };
            match pool.find_free_voice() {
                Some(voice) => pool.play_with(voice, NOTE_SECONDS, params)?,
                None => warn!("no free voice, dropping {}", params.note),
            }
        }

        {
            let mut outputs: Vec<&mut [f32]> = planar.iter_mut().map(|c| &mut c[..]).collect();
            Processor::process(
                &mut renderer,
                ProcessorData {
                    samples: step,
                    audio_out: &mut outputs,
                },
            );
        }

        let inputs: Vec<&[f32]> = planar.iter().map(|c| &c[..]).collect();
        interleave(&inputs, &mut interleaved, options.channels);
        for &sample in &interleaved {
            writer.write_sample(f32_to_i16(sample))?;
        }

        collector.collect();
    }

    writer.finalize()?;
    info!("wrote {}", path.display());
    Ok(())
}
