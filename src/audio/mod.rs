/// Audio output using cpal - a small synthesized drum kit so the machine
/// is audible without a MIDI device
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::output::SoundGenerator;

const POLYPHONY: usize = 16;

/// Envelope level at which a voice is considered silent
const SILENCE: f32 = 0.001;

pub struct AudioOutput {
    _stream: cpal::Stream,
    voices: DrumVoices,
}

impl AudioOutput {
    /// Open the default output device. Returns `None` when no usable device exists.
    pub fn new() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        let voices = DrumVoices::new(sample_rate);
        let render_voices = voices.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_voices.render_interleaved(data, channels);
                },
                |err| eprintln!("Audio stream error: {}", err),
                None,
            ),
            other => {
                eprintln!("Unsupported sample format {:?}", other);
                return None;
            }
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Failed to open audio stream: {}", e);
                return None;
            }
        };
        if let Err(e) = stream.play() {
            eprintln!("Failed to start audio stream: {}", e);
            return None;
        }

        Some(Self {
            _stream: stream,
            voices,
        })
    }

    /// Thread-safe handle for triggering the kit
    pub fn voices(&self) -> DrumVoices {
        self.voices.clone()
    }
}

/// Shape of the synthesized sound for one GM percussion key
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timbre {
    freq: f32,
    decay_secs: f32,
    noise_amount: f32,
    pitch_amount: f32,
}

fn timbre_for_key(key: u8) -> Timbre {
    let (freq, decay_secs, noise_amount, pitch_amount) = match key {
        // Kicks: long boom with a pitch drop
        35 | 36 => (55.0, 0.30, 0.05, 200.0),
        // Snares and clap: crack plus noise tail
        38 | 40 => (180.0, 0.20, 0.6, 80.0),
        39 => (400.0, 0.12, 0.8, 50.0),
        // Hats and shakers: bright noise
        42 | 44 => (800.0, 0.06, 0.95, 0.0),
        46 => (800.0, 0.25, 0.95, 0.0),
        69 | 70 => (1200.0, 0.05, 0.9, 0.0),
        // Cymbals: long wash
        49 | 51 | 52 | 55 | 57 => (600.0, 0.9, 0.9, 0.0),
        56 => (560.0, 0.15, 0.05, 0.0),
        // Toms
        41 | 43 | 45 | 47 | 48 | 50 => (80.0 + (key as f32 - 41.0) * 15.0, 0.25, 0.1, 150.0),
        _ => (midi_note_to_frequency(key), 0.15, 0.2, 0.0),
    };
    Timbre {
        freq,
        decay_secs,
        noise_amount,
        pitch_amount,
    }
}

#[derive(Debug, Clone)]
struct DrumVoice {
    key: u8,
    active: bool,
    phase: f32,
    freq: f32,
    gain: f32,
    envelope: f32,
    decay: f32,
    noise_amount: f32,
    pitch_env: f32,
    pitch_decay: f32,
    pitch_amount: f32,
}

impl DrumVoice {
    fn idle() -> Self {
        Self {
            key: 0,
            active: false,
            phase: 0.0,
            freq: 0.0,
            gain: 0.0,
            envelope: 0.0,
            decay: 0.0,
            noise_amount: 0.0,
            pitch_env: 0.0,
            pitch_decay: 0.0,
            pitch_amount: 0.0,
        }
    }

    fn trigger(&mut self, key: u8, velocity: u8, sample_rate: f32) {
        let timbre = timbre_for_key(key);
        *self = Self {
            key,
            active: true,
            phase: 0.0,
            freq: timbre.freq,
            gain: velocity as f32 / 127.0,
            envelope: 1.0,
            decay: decay_per_sample(timbre.decay_secs, sample_rate),
            noise_amount: timbre.noise_amount,
            pitch_env: 1.0,
            pitch_decay: decay_per_sample(0.05, sample_rate),
            pitch_amount: timbre.pitch_amount,
        };
    }

    fn process(&mut self, noise: f32, sample_rate: f32) -> f32 {
        if !self.active {
            return 0.0;
        }

        self.pitch_env *= self.pitch_decay;
        let freq = self.freq + self.pitch_amount * self.pitch_env;

        let osc = (self.phase * std::f32::consts::TAU).sin();
        self.phase += freq / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let sample = osc * (1.0 - self.noise_amount) + noise * self.noise_amount;

        self.envelope *= self.decay;
        if self.envelope < SILENCE {
            self.active = false;
        }

        sample * self.envelope * self.gain
    }
}

/// Per-sample multiplier that takes an envelope from 1.0 to `SILENCE` in `secs`
fn decay_per_sample(secs: f32, sample_rate: f32) -> f32 {
    (SILENCE.ln() / (secs * sample_rate).max(1.0)).exp()
}

#[derive(Debug)]
struct Kit {
    voices: Vec<DrumVoice>,
    sample_rate: f32,
    noise_state: u32,
    next_voice: usize,
}

impl Kit {
    fn trigger(&mut self, key: u8, velocity: u8) {
        // Retrigger the same key in place, otherwise take a free voice or steal round-robin
        let slot = self
            .voices
            .iter()
            .position(|v| v.active && v.key == key)
            .or_else(|| self.voices.iter().position(|v| !v.active))
            .unwrap_or_else(|| {
                let slot = self.next_voice;
                self.next_voice = (self.next_voice + 1) % self.voices.len();
                slot
            });
        let sample_rate = self.sample_rate;
        self.voices[slot].trigger(key, velocity, sample_rate);
    }

    fn next_sample(&mut self) -> f32 {
        self.noise_state = self
            .noise_state
            .wrapping_mul(1664525)
            .wrapping_add(1013904223);
        let noise = (self.noise_state as f32 / u32::MAX as f32) * 2.0 - 1.0;

        let sample_rate = self.sample_rate;
        let sum: f32 = self
            .voices
            .iter_mut()
            .map(|v| v.process(noise, sample_rate))
            .sum();
        (sum * 0.5).clamp(-1.0, 1.0)
    }
}

/// Cloneable, `Send` handle to the synthesized kit
#[derive(Debug, Clone)]
pub struct DrumVoices {
    kit: Arc<Mutex<Kit>>,
}

impl DrumVoices {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            kit: Arc::new(Mutex::new(Kit {
                voices: vec![DrumVoice::idle(); POLYPHONY],
                sample_rate,
                noise_state: 1,
                next_voice: 0,
            })),
        }
    }

    pub fn trigger(&self, key: u8, velocity: u8) {
        self.kit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trigger(key, velocity);
    }

    /// Fill an interleaved buffer, writing the same mono signal to every channel
    pub fn render_interleaved(&self, data: &mut [f32], channels: usize) {
        let mut kit = self.kit.lock().unwrap_or_else(PoisonError::into_inner);
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = kit.next_sample();
            for out in frame.iter_mut() {
                *out = sample;
            }
        }
    }
}

impl SoundGenerator for DrumVoices {
    fn note_on(&mut self, _channel: u8, key: u8, velocity: u8) -> Result<()> {
        self.trigger(key, velocity);
        Ok(())
    }

    /// Drum hits are one-shots; they ring out on their own envelope
    fn note_off(&mut self, _channel: u8, _key: u8, _velocity: u8) -> Result<()> {
        Ok(())
    }
}

fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
