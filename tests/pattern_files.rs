use std::fs;
use std::io::BufReader;
use std::sync::{Arc, Mutex};

use drumgrid::sequencer::codec::{load_pattern, save_pattern};
use drumgrid::{DrumMachine, EngineConfig, NullOutput, Pattern, SequencerError, SharedOutput, BEATS};

fn machine() -> DrumMachine {
    let output: SharedOutput = Arc::new(Mutex::new(NullOutput));
    DrumMachine::new(&EngineConfig::default(), output).unwrap()
}

#[test]
fn test_save_and_load_pattern_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beat.txt");

    let mut pattern = Pattern::new(7, BEATS);
    for step in (0..BEATS).step_by(4) {
        pattern.set(0, step, true).unwrap();
    }
    pattern.set(2, 4, true).unwrap();
    pattern.set(2, 12, true).unwrap();

    save_pattern(&pattern, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 7 * BEATS);
    assert_eq!(text.lines().next(), Some("true"));
    assert!(text.lines().all(|l| l == "true" || l == "false"));

    assert_eq!(load_pattern(&path, 7, BEATS).unwrap(), pattern);
}

#[test]
fn test_machine_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.txt");

    let mut source = machine();
    source.toggle(1, 1).unwrap();
    source.toggle(5, 10).unwrap();
    source
        .export_pattern(fs::File::create(&path).unwrap())
        .unwrap();

    let mut target = machine();
    target.toggle(0, 0).unwrap();
    target
        .import_pattern(BufReader::new(fs::File::open(&path).unwrap()))
        .unwrap();
    assert_eq!(target.pattern(), source.pattern());
}

#[test]
fn test_load_crlf_uppercase_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("windows.txt");

    let mut text = String::from("TRUE\r\n");
    text.push_str(&"False\r\n".repeat(7 * BEATS - 1));
    fs::write(&path, text).unwrap();

    let pattern = load_pattern(&path, 7, BEATS).unwrap();
    assert_eq!(pattern.active_cells().collect::<Vec<_>>(), vec![(0, 0)]);
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.txt");
    fs::write(&path, "false\n".repeat(7 * BEATS - 1)).unwrap();

    assert!(matches!(
        load_pattern(&path, 7, BEATS),
        Err(SequencerError::SizeMismatch { expected: 112, found: 111 })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_pattern(dir.path().join("nope.txt"), 7, BEATS),
        Err(SequencerError::Io(_))
    ));
}

#[test]
fn test_config_file_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drumgrid.ron");
    fs::write(
        &path,
        "(tempo_bpm: 140, instruments: Some([(name: \"Kick\", key: 36), (name: \"Hat\", key: 42)]))",
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    let output: SharedOutput = Arc::new(Mutex::new(NullOutput));
    let machine = DrumMachine::new(&config, output).unwrap();
    assert_eq!(machine.tempo(), 140);
    assert_eq!(machine.instruments(), 2);
    assert_eq!(machine.pattern().to_flat_sequence().len(), 2 * BEATS);

    fs::write(&path, "(tempo_bpm: 0)").unwrap();
    assert!(matches!(EngineConfig::load(&path), Err(SequencerError::Config(_))));
    assert_eq!(EngineConfig::load_or_default(&path), EngineConfig::default());
}
