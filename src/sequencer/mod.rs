/// Core sequencer logic - pattern grid, event compilation, playback and file format
/// The pattern is dimension-agnostic; the machine sizes it from the instrument registry
use std::fmt;

use crate::error::{Result, SequencerError};

pub mod codec;
pub mod compiler;
pub mod instrument;
pub mod playback;

/// Steps per pattern: one bar of 16th notes
pub const BEATS: usize = 16;

/// Instrument × step on/off grid, stored row-major (instrument outer, step inner)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    cells: Vec<bool>,
    instruments: usize,
    steps: usize,
}

impl Pattern {
    pub fn new(instruments: usize, steps: usize) -> Self {
        Self {
            cells: vec![false; instruments * steps],
            instruments,
            steps,
        }
    }

    pub fn instruments(&self) -> usize {
        self.instruments
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn index(&self, instrument: usize, step: usize) -> Result<usize> {
        if instrument < self.instruments && step < self.steps {
            Ok(instrument * self.steps + step)
        } else {
            Err(SequencerError::OutOfRange { instrument, step })
        }
    }

    pub fn get(&self, instrument: usize, step: usize) -> Result<bool> {
        let index = self.index(instrument, step)?;
        Ok(self.cells[index])
    }

    pub fn set(&mut self, instrument: usize, step: usize, value: bool) -> Result<()> {
        let index = self.index(instrument, step)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Flip a cell, returning its new value
    pub fn toggle(&mut self, instrument: usize, step: usize) -> Result<bool> {
        let index = self.index(instrument, step)?;
        self.cells[index] = !self.cells[index];
        Ok(self.cells[index])
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = false;
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&cell| cell)
    }

    /// One instrument's steps, if the row exists
    pub fn row(&self, instrument: usize) -> Option<&[bool]> {
        if instrument < self.instruments {
            let start = instrument * self.steps;
            Some(&self.cells[start..start + self.steps])
        } else {
            None
        }
    }

    /// `(instrument, step)` pairs that are switched on, in row-major order
    pub fn active_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let steps = self.steps;
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &on)| on)
            .map(move |(i, _)| (i / steps, i % steps))
    }

    pub fn to_flat_sequence(&self) -> Vec<bool> {
        self.cells.clone()
    }

    pub fn from_flat_sequence(instruments: usize, steps: usize, seq: &[bool]) -> Result<Self> {
        let expected = instruments * steps;
        if seq.len() != expected {
            return Err(SequencerError::SizeMismatch {
                expected,
                found: seq.len(),
            });
        }
        Ok(Self {
            cells: seq.to_vec(),
            instruments,
            steps,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.steps.max(1)) {
            let line: String = row.iter().map(|&on| if on { 'x' } else { '.' }).collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
