/// Event compiler - turns a pattern grid into a tick-ordered timeline
use std::time::Duration;

use super::instrument::InstrumentRegistry;
use super::Pattern;

/// Pulses per quarter note. One grid step is one tick, so a beat holds four 16th-note steps.
pub const TICKS_PER_BEAT: u32 = 4;

/// Event kinds, declared in dispatch order for events sharing a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    NoteOff,
    NoteOn,
    EndOfPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimelineEvent {
    pub tick: u32,
    pub kind: EventKind,
    pub key: u8,
}

impl TimelineEvent {
    pub fn note_on(tick: u32, key: u8) -> Self {
        Self {
            tick,
            kind: EventKind::NoteOn,
            key,
        }
    }

    pub fn note_off(tick: u32, key: u8) -> Self {
        Self {
            tick,
            kind: EventKind::NoteOff,
            key,
        }
    }

    pub fn end_of_pattern(tick: u32) -> Self {
        Self {
            tick,
            kind: EventKind::EndOfPattern,
            key: 0,
        }
    }
}

/// Compiled, immutable event list for one pass through a pattern.
/// Always ends with a single `EndOfPattern` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
    end_tick: u32,
}

impl Timeline {
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Tick of the `EndOfPattern` marker, where a loop wraps back to 0
    pub fn end_tick(&self) -> u32 {
        self.end_tick
    }

    pub fn note_events(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events
            .iter()
            .filter(|e| e.kind != EventKind::EndOfPattern)
    }

    pub fn is_silent(&self) -> bool {
        self.note_events().next().is_none()
    }
}

/// Length of one tick at `bpm`: 60 / (bpm * TICKS_PER_BEAT) seconds
pub fn tick_duration(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / (bpm.max(1) as f64 * TICKS_PER_BEAT as f64))
}

/// Compile `pattern` against the registry's row order.
///
/// Every active cell `(r, s)` becomes a NoteOn at tick `s` and a NoteOff at
/// tick `s + 1` on the row's key. Events are sorted by tick, NoteOffs before
/// NoteOns on the same tick; the sort is stable, so instruments sharing a tick
/// keep registry order. Rows without a registry entry are skipped.
pub fn compile(pattern: &Pattern, registry: &InstrumentRegistry) -> Timeline {
    let mut events = Vec::new();

    for (row, instrument) in registry.iter().enumerate() {
        let Some(steps) = pattern.row(row) else {
            break;
        };
        for (step, _) in steps.iter().enumerate().filter(|&(_, &on)| on) {
            let tick = step as u32;
            events.push(TimelineEvent::note_on(tick, instrument.key));
            events.push(TimelineEvent::note_off(tick + 1, instrument.key));
        }
    }

    let end_tick = pattern.steps() as u32;
    events.push(TimelineEvent::end_of_pattern(end_tick));
    events.sort_by_key(|e| (e.tick, e.kind));

    Timeline { events, end_tick }
}
