/// Sound generator seam - where timed note commands leave the engine
use std::sync::{Arc, Mutex};

use crate::audio::DrumVoices;
use crate::error::Result;
use crate::midi::MidiOutputDevice;

/// Anything that can sound a note. The engine sends nothing but these two commands.
pub trait SoundGenerator {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()>;
    fn note_off(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()>;
}

/// Output handle shared between the UI thread and the playback thread
pub type SharedOutput = Arc<Mutex<dyn SoundGenerator + Send>>;

/// Note parameters applied to every dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteParams {
    pub channel: u8,
    pub velocity: u8,
}

impl Default for NoteParams {
    fn default() -> Self {
        Self {
            channel: 9,
            velocity: 100,
        }
    }
}

/// Sends to the MIDI port when one is connected, otherwise to the built-in kit
pub struct OutputRouter {
    midi: MidiOutputDevice,
    synth: Option<DrumVoices>,
}

impl OutputRouter {
    pub fn new(midi: MidiOutputDevice, synth: Option<DrumVoices>) -> Self {
        Self { midi, synth }
    }

    pub fn midi(&self) -> &MidiOutputDevice {
        &self.midi
    }

    pub fn midi_mut(&mut self) -> &mut MidiOutputDevice {
        &mut self.midi
    }

    pub fn has_synth(&self) -> bool {
        self.synth.is_some()
    }
}

impl SoundGenerator for OutputRouter {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
        if self.midi.is_connected() {
            self.midi.note_on(channel, key, velocity)
        } else if let Some(synth) = self.synth.as_mut() {
            synth.note_on(channel, key, velocity)
        } else {
            Ok(())
        }
    }

    fn note_off(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
        if self.midi.is_connected() {
            self.midi.note_off(channel, key, velocity)
        } else if let Some(synth) = self.synth.as_mut() {
            synth.note_off(channel, key, velocity)
        } else {
            Ok(())
        }
    }
}

/// Discards every command
#[derive(Debug, Default)]
pub struct NullOutput;

impl SoundGenerator for NullOutput {
    fn note_on(&mut self, _channel: u8, _key: u8, _velocity: u8) -> Result<()> {
        Ok(())
    }

    fn note_off(&mut self, _channel: u8, _key: u8, _velocity: u8) -> Result<()> {
        Ok(())
    }
}
