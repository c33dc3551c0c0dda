use thiserror::Error;

/// Errors raised by the drum machine engine
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Cell out of range: instrument {instrument}, step {step}")]
    OutOfRange { instrument: usize, step: usize },

    #[error("Instrument index out of range: {0}")]
    InstrumentOutOfRange(usize),

    #[error("Pattern size mismatch: expected {expected} cells, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Line {line} is not a boolean: {content:?}")]
    Parse { line: usize, content: String },

    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(i64),

    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SequencerError>;
