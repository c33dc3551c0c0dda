/// Instrument registry - the fixed, ordered catalog of playable voices
use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencerError};

/// A playable voice. `key` is the note number sent to the sound generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub key: u8,
}

impl Instrument {
    pub fn new(name: impl Into<String>, key: u8) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

/// General MIDI percussion voices in grid row order
const STANDARD_KIT: [(&str, u8); 7] = [
    ("Bass Drum", 35),
    ("Closed Hi-Hat", 42),
    ("Acoustic Snare", 38),
    ("Crash Cymbal", 49),
    ("Cow Bell", 56),
    ("Maracas", 70),
    ("Hand Clap", 39),
];

/// Ordered catalog of instruments. Row `i` of a pattern plays `by_index(i)`,
/// so the order is part of the pattern file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    /// Build a registry from a custom kit
    pub fn new(instruments: Vec<Instrument>) -> Result<Self> {
        if instruments.is_empty() {
            return Err(SequencerError::InvalidInstrument(
                "instrument kit is empty".to_string(),
            ));
        }
        if let Some(bad) = instruments.iter().find(|i| i.key > 127) {
            return Err(SequencerError::InvalidInstrument(format!(
                "{} has key {} (must be 0-127)",
                bad.name, bad.key
            )));
        }
        Ok(Self { instruments })
    }

    /// The seven-voice General MIDI drum kit
    pub fn standard() -> Self {
        Self {
            instruments: STANDARD_KIT
                .iter()
                .map(|&(name, key)| Instrument::new(name, key))
                .collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.instruments.len()
    }

    pub fn by_index(&self, index: usize) -> Result<&Instrument> {
        self.instruments
            .get(index)
            .ok_or(SequencerError::InstrumentOutOfRange(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter()
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
