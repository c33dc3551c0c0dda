/// Drum machine control surface - what the display and control UI talk to
use std::io::{BufRead, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::output::{NoteParams, SharedOutput};
use crate::sequencer::codec;
use crate::sequencer::compiler::{compile, Timeline};
use crate::sequencer::instrument::{Instrument, InstrumentRegistry};
use crate::sequencer::playback::{PlaybackEvent, Transport, TransportState};
use crate::sequencer::{Pattern, BEATS};

/// Owns the pattern, the transport and the compiled timeline cache.
///
/// Playback works on a snapshot: `start` compiles the pattern as it is at
/// that instant, and later edits only reach the speakers on the next `start`.
pub struct DrumMachine {
    registry: InstrumentRegistry,
    pattern: Arc<RwLock<Pattern>>,
    compiled: Option<Arc<Timeline>>,
    transport: Transport,
    output: SharedOutput,
    params: NoteParams,
}

impl DrumMachine {
    pub fn new(config: &EngineConfig, output: SharedOutput) -> Result<Self> {
        config.validate()?;
        let registry = config.registry()?;
        let params = config.note_params();

        let transport = Transport::new(Arc::clone(&output), params);
        transport.set_tempo(config.tempo_bpm as i32)?;
        transport.set_looping(config.looping);

        Ok(Self {
            pattern: Arc::new(RwLock::new(Pattern::new(registry.count(), BEATS))),
            registry,
            compiled: None,
            transport,
            output,
            params,
        })
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn instruments(&self) -> usize {
        self.registry.count()
    }

    pub fn steps(&self) -> usize {
        BEATS
    }

    /// Live pattern, for display surfaces on other threads
    pub fn shared_pattern(&self) -> Arc<RwLock<Pattern>> {
        Arc::clone(&self.pattern)
    }

    /// Consistent copy of the current grid
    pub fn pattern(&self) -> Pattern {
        self.read().clone()
    }

    pub fn cell(&self, instrument: usize, step: usize) -> Result<bool> {
        self.read().get(instrument, step)
    }

    pub fn toggle(&mut self, instrument: usize, step: usize) -> Result<bool> {
        let value = self.write().toggle(instrument, step)?;
        self.compiled = None;
        Ok(value)
    }

    pub fn set_cell(&mut self, instrument: usize, step: usize, value: bool) -> Result<()> {
        self.write().set(instrument, step, value)?;
        self.compiled = None;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.write().clear();
        self.compiled = None;
    }

    /// Compiled form of the current pattern, reused until the next edit
    pub fn timeline(&mut self) -> Arc<Timeline> {
        if let Some(timeline) = &self.compiled {
            return Arc::clone(timeline);
        }
        let timeline = Arc::new(compile(&self.read(), &self.registry));
        self.compiled = Some(Arc::clone(&timeline));
        timeline
    }

    /// Play from tick 0. An unedited pattern replays the timeline the
    /// transport already holds.
    pub fn start(&mut self) {
        let timeline = self.timeline();
        let unchanged = self
            .transport
            .timeline()
            .is_some_and(|loaded| Arc::ptr_eq(loaded, &timeline));
        if !(unchanged && self.transport.restart()) {
            self.transport.start(timeline);
        }
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_running()
    }

    pub fn position(&self) -> u32 {
        self.transport.position()
    }

    pub fn tempo(&self) -> u32 {
        self.transport.tempo()
    }

    /// Rejects non-positive values and keeps the previous tempo
    pub fn set_tempo(&mut self, bpm: i32) -> Result<()> {
        self.transport.set_tempo(bpm)
    }

    pub fn is_looping(&self) -> bool {
        self.transport.is_looping()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.transport.set_looping(looping);
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.transport.poll_events()
    }

    pub fn export_pattern<W: Write>(&self, sink: W) -> Result<()> {
        codec::encode(&self.read(), sink)
    }

    /// Replace the pattern with one read from `source`.
    /// On any error the current pattern is left untouched.
    pub fn import_pattern<R: BufRead>(&mut self, source: R) -> Result<()> {
        let pattern = codec::decode(source, self.registry.count(), BEATS)?;
        *self.write() = pattern;
        self.compiled = None;
        Ok(())
    }

    /// Sound one instrument right away, outside of playback
    pub fn preview(&self, instrument: usize) -> Result<()> {
        let Instrument { key, .. } = self.registry.by_index(instrument)?;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        output.note_on(self.params.channel, *key, self.params.velocity)
    }

    fn read(&self) -> RwLockReadGuard<'_, Pattern> {
        self.pattern.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Pattern> {
        self.pattern.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a tempo typed by the user. Input that is not a number yields `None`
/// so the caller can keep the current tempo without reporting anything.
pub fn parse_tempo_input(text: &str) -> Option<i32> {
    text.trim().parse().ok()
}

impl std::fmt::Debug for DrumMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumMachine")
            .field("instruments", &self.registry.count())
            .field("state", &self.state())
            .field("tempo", &self.tempo())
            .finish()
    }
}
