/// Drumgrid - a step-sequencer drum machine engine
///
/// This library provides the core components of a grid drum machine:
/// - Instrument registry and the instrument × step pattern grid
/// - Compilation of a pattern into a tick-ordered note timeline
/// - A transport that plays the timeline on a timer thread, looping
/// - A line-oriented pattern file format
/// - MIDI output and a built-in synthesized kit for testing

pub mod audio;
pub mod config;
pub mod error;
pub mod machine;
pub mod midi;
pub mod output;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, DrumVoices};
pub use config::EngineConfig;
pub use error::{Result, SequencerError};
pub use machine::{parse_tempo_input, DrumMachine};
pub use midi::{midi_note_name, MidiOutputDevice};
pub use output::{NoteParams, NullOutput, OutputRouter, SharedOutput, SoundGenerator};
pub use sequencer::compiler::{compile, EventKind, Timeline, TimelineEvent, TICKS_PER_BEAT};
pub use sequencer::instrument::{Instrument, InstrumentRegistry};
pub use sequencer::playback::{PlaybackEvent, Playhead, Transport, TransportState};
pub use sequencer::{Pattern, BEATS};
