/// Engine configuration, loaded from a RON file
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, SequencerError};
use crate::output::NoteParams;
use crate::sequencer::instrument::{Instrument, InstrumentRegistry};
use crate::sequencer::playback::DEFAULT_TEMPO;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "drumgrid.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tempo_bpm: u32,
    pub velocity: u8,
    /// 0-based MIDI channel; 9 is General MIDI percussion
    pub channel: u8,
    pub looping: bool,
    /// Substring of the MIDI port to connect at startup
    pub midi_port: Option<String>,
    /// Replaces the standard kit; row order follows list order
    pub instruments: Option<Vec<Instrument>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let params = NoteParams::default();
        Self {
            tempo_bpm: DEFAULT_TEMPO,
            velocity: params.velocity,
            channel: params.channel,
            looping: true,
            midi_port: None,
            instruments: None,
        }
    }
}

impl EngineConfig {
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(text).map_err(|e| SequencerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Load `path` if it exists, falling back to defaults on any problem
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tempo_bpm == 0 || self.tempo_bpm > i32::MAX as u32 {
            return Err(SequencerError::Config(format!(
                "tempo_bpm must be positive, got {}",
                self.tempo_bpm
            )));
        }
        if self.velocity > 127 {
            return Err(SequencerError::Config(format!(
                "velocity must be 0-127, got {}",
                self.velocity
            )));
        }
        if self.channel > 15 {
            return Err(SequencerError::Config(format!(
                "channel must be 0-15, got {}",
                self.channel
            )));
        }
        self.registry().map(|_| ())
    }

    pub fn note_params(&self) -> NoteParams {
        NoteParams {
            channel: self.channel,
            velocity: self.velocity,
        }
    }

    pub fn registry(&self) -> Result<InstrumentRegistry> {
        match &self.instruments {
            Some(kit) => InstrumentRegistry::new(kit.clone())
                .map_err(|e| SequencerError::Config(e.to_string())),
            None => Ok(InstrumentRegistry::standard()),
        }
    }
}
