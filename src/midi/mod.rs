/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{Result, SequencerError};
use crate::output::SoundGenerator;

const CLIENT_NAME: &str = "Drumgrid MIDI Output";

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            port_name: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| SequencerError::Midi(format!("Failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| SequencerError::Midi(format!("Invalid port index {}", port_index)))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "drumgrid")
            .map_err(|e| SequencerError::Midi(format!("Failed to connect: {}", e)))?;

        println!("✓ MIDI connected: {}", name);
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    /// Connect to the first port whose name contains `pattern` (case-insensitive)
    pub fn connect_by_name(&mut self, pattern: &str) -> Result<()> {
        let needle = pattern.to_lowercase();
        let index = Self::available_ports()
            .iter()
            .position(|name| name.to_lowercase().contains(&needle))
            .ok_or_else(|| SequencerError::Midi(format!("MIDI device '{}' not found", pattern)))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.port_name = None;
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)
                .map_err(|e| SequencerError::Midi(format!("Failed to send {:02X?}: {}", message, e)))?;
        }
        Ok(())
    }
}

impl SoundGenerator for MidiOutputDevice {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
        self.send(&[NOTE_ON | (channel & 0x0F), key & 0x7F, velocity & 0x7F])
    }

    fn note_off(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
        self.send(&[NOTE_OFF | (channel & 0x0F), key & 0x7F, velocity & 0x7F])
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
