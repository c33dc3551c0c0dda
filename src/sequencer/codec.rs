/// Pattern file format: one `true`/`false` literal per line, row-major, no header
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::Pattern;
use crate::error::{Result, SequencerError};

pub fn encode<W: Write>(pattern: &Pattern, mut writer: W) -> Result<()> {
    for cell in pattern.to_flat_sequence() {
        writeln!(writer, "{}", cell)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn encode_to_string(pattern: &Pattern) -> String {
    pattern
        .to_flat_sequence()
        .iter()
        .map(|cell| format!("{}\n", cell))
        .collect()
}

/// Read exactly `instruments * steps` lines into a new pattern.
///
/// Nothing is returned until every line has parsed, so a failed decode
/// never leaves a half-built pattern behind. Lines past the last cell are
/// not read.
pub fn decode<R: BufRead>(reader: R, instruments: usize, steps: usize) -> Result<Pattern> {
    let expected = instruments * steps;
    let mut cells = Vec::with_capacity(expected);
    let mut lines = reader.split(b'\n');

    while cells.len() < expected {
        let Some(line) = lines.next() else {
            return Err(SequencerError::SizeMismatch {
                expected,
                found: cells.len(),
            });
        };
        let line = line?;
        let line_number = cells.len() + 1;
        let text = std::str::from_utf8(&line).map_err(|_| SequencerError::Parse {
            line: line_number,
            content: String::from_utf8_lossy(&line).into_owned(),
        })?;
        cells.push(parse_cell(text.trim_end_matches('\r'), line_number)?);
    }

    Pattern::from_flat_sequence(instruments, steps, &cells)
}

pub fn decode_str(text: &str, instruments: usize, steps: usize) -> Result<Pattern> {
    decode(text.as_bytes(), instruments, steps)
}

pub fn save_pattern<P: AsRef<Path>>(pattern: &Pattern, path: P) -> Result<()> {
    let file = File::create(path)?;
    encode(pattern, BufWriter::new(file))
}

pub fn load_pattern<P: AsRef<Path>>(path: P, instruments: usize, steps: usize) -> Result<Pattern> {
    let file = File::open(path)?;
    decode(BufReader::new(file), instruments, steps)
}

fn parse_cell(line: &str, line_number: usize) -> Result<bool> {
    let literal = line.trim();
    if literal.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(SequencerError::Parse {
            line: line_number,
            content: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Pattern {
        let mut pattern = Pattern::new(2, 3);
        pattern.set(0, 0, true).unwrap();
        pattern.set(1, 2, true).unwrap();
        pattern
    }

    #[test]
    fn test_encode_layout() {
        let mut out = Vec::new();
        encode(&sample(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "true\nfalse\nfalse\nfalse\nfalse\ntrue\n"
        );
        assert_eq!(
            encode_to_string(&sample()),
            "true\nfalse\nfalse\nfalse\nfalse\ntrue\n"
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let pattern = sample();
        let decoded = decode_str(&encode_to_string(&pattern), 2, 3).unwrap();
        assert_eq!(decoded, pattern);
    }

    #[test]
    fn test_decode_is_case_insensitive_and_trims() {
        let text = "TRUE\r\nFalse\r\nfalse\nfalse\n  fAlSe  \ntrue";
        assert_eq!(decode_str(text, 2, 3).unwrap(), sample());
    }

    #[test]
    fn test_decode_short_stream() {
        let text = "true\nfalse\nfalse\nfalse\nfalse\n";
        assert!(matches!(
            decode_str(text, 2, 3),
            Err(SequencerError::SizeMismatch { expected: 6, found: 5 })
        ));
        assert!(matches!(
            decode_str("", 2, 3),
            Err(SequencerError::SizeMismatch { expected: 6, found: 0 })
        ));
    }

    #[test]
    fn test_decode_bad_literal() {
        let text = "true\nfalse\nyes\nfalse\nfalse\ntrue\n";
        match decode_str(text, 2, 3) {
            Err(SequencerError::Parse { line, content }) => {
                assert_eq!(line, 3);
                assert_eq!(content, "yes");
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
        assert!(decode_str("true\n\nfalse\nfalse\nfalse\nfalse\n", 2, 3).is_err());
    }

    #[test]
    fn test_decode_non_utf8_line() {
        let mut bytes = b"true\n\xff\xfe\n".to_vec();
        bytes.extend("false\n".repeat(4).as_bytes());
        assert!(matches!(
            decode(bytes.as_slice(), 2, 3),
            Err(SequencerError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_lines() {
        let text = format!("{}garbage\n", encode_to_string(&sample()));
        assert_eq!(decode_str(&text, 2, 3).unwrap(), sample());
    }
}
