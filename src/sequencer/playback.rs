/// Playback engine - the transport state machine and its dispatch thread
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::compiler::{tick_duration, EventKind, Timeline, TimelineEvent};
use crate::error::{Result, SequencerError};
use crate::output::{NoteParams, SharedOutput};

pub const DEFAULT_TEMPO: u32 = 80;

/// Notifications held for `poll_events`. Once full, new ones are dropped
/// until the queue is drained; note dispatch is unaffected.
pub const EVENT_QUEUE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
    /// Not running, but a compiled timeline is loaded for restart
    Stopped,
}

/// Notifications for the UI, drained with `Transport::poll_events`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    TickAdvanced(u32),
    NoteOn(u8, u8), // key, velocity
    NoteOff(u8),    // key
    /// A non-looping pass reached the end of the pattern
    Finished,
}

/// Events dispatched together at one point in wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Grid position this slot plays; 0 when a loop has just wrapped
    pub tick: u32,
    pub events: Vec<TimelineEvent>,
}

/// Tick cursor over a timeline. Each `advance` is one tick of wall-clock time.
///
/// The end tick only carries NoteOffs for notes on the last step. When
/// looping it shares a slot with tick 0 of the next pass (releases first),
/// so a pass lasts exactly `end_tick` slots.
#[derive(Debug, Clone)]
pub struct Playhead {
    timeline: Arc<Timeline>,
    tick: u32,
    cursor: usize,
    looping: bool,
    finished: bool,
}

impl Playhead {
    pub fn new(timeline: Arc<Timeline>, looping: bool) -> Self {
        Self {
            timeline,
            tick: 0,
            cursor: 0,
            looping,
            finished: false,
        }
    }

    /// Tick of the next slot
    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn rewind(&mut self) {
        self.tick = 0;
        self.cursor = 0;
        self.finished = false;
    }

    pub fn advance(&mut self) -> Option<Slot> {
        if self.finished {
            return None;
        }

        let mut events = self.take_due();
        let mut tick = self.tick;

        if self.tick >= self.timeline.end_tick() {
            if self.looping {
                self.rewind();
                events.extend(self.take_due());
                tick = 0;
            } else {
                self.finished = true;
                return Some(Slot { tick, events });
            }
        }

        self.tick += 1;
        Some(Slot { tick, events })
    }

    fn take_due(&mut self) -> Vec<TimelineEvent> {
        let events = self.timeline.events();
        let start = self.cursor;
        while self.cursor < events.len() && events[self.cursor].tick <= self.tick {
            self.cursor += 1;
        }
        events[start..self.cursor]
            .iter()
            .filter(|e| e.kind != EventKind::EndOfPattern)
            .copied()
            .collect()
    }
}

/// State the dispatch thread reads live
#[derive(Debug)]
struct SharedTransport {
    running: AtomicBool,
    looping: AtomicBool,
    tempo: AtomicU32,
    position: AtomicU32,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Transport {
    shared: Arc<SharedTransport>,
    output: SharedOutput,
    params: NoteParams,
    timeline: Option<Arc<Timeline>>,
    worker: Option<Worker>,
    sender: SyncSender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
}

impl Transport {
    pub fn new(output: SharedOutput, params: NoteParams) -> Self {
        let (sender, receiver) = sync_channel(EVENT_QUEUE);

        Self {
            shared: Arc::new(SharedTransport {
                running: AtomicBool::new(false),
                looping: AtomicBool::new(true),
                tempo: AtomicU32::new(DEFAULT_TEMPO),
                position: AtomicU32::new(0),
            }),
            output,
            params,
            timeline: None,
            worker: None,
            sender,
            receiver,
        }
    }

    pub fn state(&self) -> TransportState {
        if self.is_running() {
            TransportState::Playing
        } else if self.timeline.is_some() {
            TransportState::Stopped
        } else {
            TransportState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Tick of the slot most recently dispatched
    pub fn position(&self) -> u32 {
        self.shared.position.load(Ordering::Relaxed)
    }

    pub fn tempo(&self) -> u32 {
        self.shared.tempo.load(Ordering::Relaxed)
    }

    /// Picked up by the dispatch thread when it schedules its next tick
    pub fn set_tempo(&self, bpm: i32) -> Result<()> {
        if bpm <= 0 {
            return Err(SequencerError::InvalidTempo(bpm as i64));
        }
        self.shared.tempo.store(bpm as u32, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Relaxed);
    }

    pub fn timeline(&self) -> Option<&Arc<Timeline>> {
        self.timeline.as_ref()
    }

    /// Play `timeline` from tick 0, replacing whatever is playing
    pub fn start(&mut self, timeline: Arc<Timeline>) {
        self.halt();
        self.timeline = Some(Arc::clone(&timeline));
        self.spawn(timeline);
    }

    /// Replay the last loaded timeline. Returns false when nothing was ever started.
    pub fn restart(&mut self) -> bool {
        match self.timeline.clone() {
            Some(timeline) => {
                self.halt();
                self.spawn(timeline);
                true
            }
            None => false,
        }
    }

    /// Cancel dispatch, silence sounding notes and rewind to tick 0.
    /// Nothing is dispatched once this returns.
    pub fn stop(&mut self) {
        self.halt();
        self.shared.position.store(0, Ordering::Relaxed);
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn halt(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Fails only when the thread already ended on its own
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                eprintln!("Playback thread panicked");
            }
        }
        self.shared.running.store(false, Ordering::Release);
    }

    fn spawn(&mut self, timeline: Arc<Timeline>) {
        let (stop, stop_rx) = channel();
        let dispatcher = Dispatcher {
            shared: Arc::clone(&self.shared),
            output: Arc::clone(&self.output),
            params: self.params,
            events: self.sender.clone(),
            sounding: Vec::new(),
        };
        let playhead = Playhead::new(timeline, self.is_looping());

        self.shared.position.store(0, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Release);

        let handle = thread::spawn(move || dispatcher.run(playhead, stop_rx));
        self.worker = Some(Worker { stop, handle });
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Runs on the playback thread
struct Dispatcher {
    shared: Arc<SharedTransport>,
    output: SharedOutput,
    params: NoteParams,
    events: SyncSender<PlaybackEvent>,
    sounding: Vec<u8>,
}

impl Dispatcher {
    fn run(mut self, mut playhead: Playhead, stop: Receiver<()>) {
        let mut deadline = Instant::now();

        loop {
            playhead.set_looping(self.shared.looping.load(Ordering::Relaxed));
            let Some(slot) = playhead.advance() else {
                break;
            };

            self.shared.position.store(slot.tick, Ordering::Relaxed);
            self.notify(PlaybackEvent::TickAdvanced(slot.tick));
            self.dispatch(&slot.events);

            if playhead.is_finished() {
                break;
            }

            deadline += tick_duration(self.shared.tempo.load(Ordering::Relaxed));
            let wait = deadline.saturating_duration_since(Instant::now());
            match stop.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                // Stop requested, or the transport is gone
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.release_all();
        if playhead.is_finished() {
            self.shared.position.store(0, Ordering::Relaxed);
            self.notify(PlaybackEvent::Finished);
        }
        self.shared.running.store(false, Ordering::Release);
    }

    fn dispatch(&mut self, events: &[TimelineEvent]) {
        let NoteParams { channel, velocity } = self.params;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);

        for event in events {
            let sent = match event.kind {
                EventKind::NoteOn => {
                    if !self.sounding.contains(&event.key) {
                        self.sounding.push(event.key);
                    }
                    self.notify(PlaybackEvent::NoteOn(event.key, velocity));
                    output.note_on(channel, event.key, velocity)
                }
                EventKind::NoteOff => {
                    self.sounding.retain(|&key| key != event.key);
                    self.notify(PlaybackEvent::NoteOff(event.key));
                    output.note_off(channel, event.key, velocity)
                }
                EventKind::EndOfPattern => Ok(()),
            };

            if let Err(e) = sent {
                eprintln!("Failed to send {:?} for key {}: {}", event.kind, event.key, e);
            }
        }
    }

    /// Full or disconnected queues drop the notification
    fn notify(&self, event: PlaybackEvent) {
        let _ = self.events.try_send(event);
    }

    fn release_all(&mut self) {
        if self.sounding.is_empty() {
            return;
        }
        let NoteParams { channel, velocity } = self.params;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);

        for key in std::mem::take(&mut self.sounding) {
            self.notify(PlaybackEvent::NoteOff(key));
            if let Err(e) = output.note_off(channel, key, velocity) {
                eprintln!("Failed to release key {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SoundGenerator;
    use crate::sequencer::compiler::compile;
    use crate::sequencer::instrument::InstrumentRegistry;
    use crate::sequencer::{Pattern, BEATS};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Command {
        On(u8),
        Off(u8),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Command>>>);

    impl Recorder {
        fn commands(&self) -> Vec<Command> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SoundGenerator for Recorder {
        fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
            assert_eq!((channel, velocity), (9, 100));
            self.0.lock().unwrap().push(Command::On(key));
            Ok(())
        }

        fn note_off(&mut self, _channel: u8, key: u8, _velocity: u8) -> Result<()> {
            self.0.lock().unwrap().push(Command::Off(key));
            Ok(())
        }
    }

    fn timeline(cells: &[(usize, usize)]) -> Arc<Timeline> {
        let registry = InstrumentRegistry::standard();
        let mut pattern = Pattern::new(registry.count(), BEATS);
        for &(r, s) in cells {
            pattern.set(r, s, true).unwrap();
        }
        Arc::new(compile(&pattern, &registry))
    }

    fn transport() -> (Transport, Recorder) {
        let recorder = Recorder::default();
        let output: SharedOutput = Arc::new(Mutex::new(recorder.clone()));
        (Transport::new(output, NoteParams::default()), recorder)
    }

    fn wait_until_stopped(transport: &Transport) {
        let started = Instant::now();
        while transport.is_running() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!transport.is_running(), "playback did not finish");
    }

    #[test]
    fn test_playhead_single_pass() {
        let mut playhead = Playhead::new(timeline(&[(0, 0), (2, 4)]), false);
        let mut slots = Vec::new();
        while let Some(slot) = playhead.advance() {
            slots.push(slot);
        }

        assert_eq!(slots.len(), 17);
        assert_eq!(slots[0].events, vec![TimelineEvent::note_on(0, 35)]);
        assert_eq!(slots[1].events, vec![TimelineEvent::note_off(1, 35)]);
        assert_eq!(slots[4].events, vec![TimelineEvent::note_on(4, 38)]);
        assert_eq!(slots[5].events, vec![TimelineEvent::note_off(5, 38)]);
        assert_eq!(slots[16].tick, 16);
        assert!(slots[16].events.is_empty());
        assert!(playhead.is_finished());
    }

    #[test]
    fn test_playhead_loop_wraps_after_end_tick() {
        let mut playhead = Playhead::new(timeline(&[(0, 0), (1, 15)]), true);
        for _ in 0..16 {
            playhead.advance().unwrap();
        }

        // Slot 16 releases the last step and restarts the bar
        let wrap = playhead.advance().unwrap();
        assert_eq!(wrap.tick, 0);
        assert_eq!(
            wrap.events,
            vec![TimelineEvent::note_off(16, 42), TimelineEvent::note_on(0, 35)]
        );
        assert_eq!(playhead.tick(), 1);
        assert_eq!(
            playhead.advance().unwrap().events,
            vec![TimelineEvent::note_off(1, 35)]
        );
        assert!(!playhead.is_finished());
    }

    #[test]
    fn test_playhead_empty_timeline_is_silent() {
        let mut playhead = Playhead::new(timeline(&[]), true);
        for _ in 0..64 {
            assert!(playhead.advance().unwrap().events.is_empty());
        }
    }

    #[test]
    fn test_tempo_validation() {
        let (transport, _) = transport();
        assert_eq!(transport.tempo(), DEFAULT_TEMPO);
        assert!(matches!(
            transport.set_tempo(0),
            Err(SequencerError::InvalidTempo(0))
        ));
        assert!(matches!(
            transport.set_tempo(-5),
            Err(SequencerError::InvalidTempo(-5))
        ));
        assert_eq!(transport.tempo(), DEFAULT_TEMPO);
        transport.set_tempo(120).unwrap();
        assert_eq!(transport.tempo(), 120);
    }

    #[test]
    fn test_single_pass_dispatch_order() {
        let (mut transport, recorder) = transport();
        transport.set_tempo(6000).unwrap();
        transport.set_looping(false);
        assert_eq!(transport.state(), TransportState::Idle);

        transport.start(timeline(&[(0, 0), (2, 4)]));
        wait_until_stopped(&transport);
        transport.stop();

        assert_eq!(
            recorder.commands(),
            vec![
                Command::On(35),
                Command::Off(35),
                Command::On(38),
                Command::Off(38)
            ]
        );
        assert_eq!(transport.position(), 0);
        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(transport.poll_events().contains(&PlaybackEvent::Finished));
    }

    #[test]
    fn test_stop_cancels_and_releases() {
        let (mut transport, recorder) = transport();
        transport.set_tempo(3000).unwrap();
        transport.start(timeline(&[(0, 0), (0, 8), (3, 15)]));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(transport.state(), TransportState::Playing);

        transport.stop();
        assert!(!transport.is_running());
        assert_eq!(transport.position(), 0);

        let commands = recorder.commands();
        let ons = commands.iter().filter(|c| matches!(c, Command::On(_))).count();
        let offs = commands.iter().filter(|c| matches!(c, Command::Off(_))).count();
        assert!(ons > 3, "expected more than one pass, got {:?}", commands);
        assert_eq!(ons, offs);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.commands().len(), commands.len());

        // Idempotent
        transport.stop();
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_restart_replays_loaded_timeline() {
        let (mut transport, recorder) = transport();
        assert!(!transport.restart());

        transport.set_tempo(6000).unwrap();
        transport.set_looping(false);
        transport.start(timeline(&[(5, 2)]));
        wait_until_stopped(&transport);
        assert!(transport.restart());
        wait_until_stopped(&transport);

        assert_eq!(
            recorder.commands(),
            vec![
                Command::On(70),
                Command::Off(70),
                Command::On(70),
                Command::Off(70)
            ]
        );
    }

    /// Records when each note-on arrived
    #[derive(Clone, Default)]
    struct Stopwatch(Arc<Mutex<Vec<Instant>>>);

    impl SoundGenerator for Stopwatch {
        fn note_on(&mut self, _channel: u8, _key: u8, _velocity: u8) -> Result<()> {
            self.0.lock().unwrap().push(Instant::now());
            Ok(())
        }

        fn note_off(&mut self, _channel: u8, _key: u8, _velocity: u8) -> Result<()> {
            Ok(())
        }
    }

    fn median_gap_ms(hits: &[Instant]) -> f64 {
        let mut gaps: Vec<f64> = hits
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs_f64() * 1000.0)
            .collect();
        gaps.sort_by(|a, b| a.total_cmp(b));
        gaps[gaps.len() / 2]
    }

    #[test]
    fn test_tempo_change_respaces_following_ticks() {
        let stopwatch = Stopwatch::default();
        let output: SharedOutput = Arc::new(Mutex::new(stopwatch.clone()));
        let mut transport = Transport::new(output, NoteParams::default());
        let every_step: Vec<_> = (0..BEATS).map(|step| (0, step)).collect();

        // 600 BPM is 25 ms per tick, 1200 BPM is 12.5 ms
        transport.set_tempo(600).unwrap();
        transport.start(timeline(&every_step));
        thread::sleep(Duration::from_millis(250));
        let switched = stopwatch.0.lock().unwrap().len();
        transport.set_tempo(1200).unwrap();
        thread::sleep(Duration::from_millis(250));
        transport.stop();

        let hits = stopwatch.0.lock().unwrap().clone();
        assert!(switched >= 6, "too few hits before the change: {}", switched);
        assert!(hits.len() >= switched + 8, "too few hits after the change");

        let before = median_gap_ms(&hits[..switched]);
        // Skip the tick that was already scheduled at the old tempo
        let after = median_gap_ms(&hits[switched + 1..]);
        assert!((18.0..35.0).contains(&before), "gap before change: {} ms", before);
        assert!((8.0..18.0).contains(&after), "gap after change: {} ms", after);
    }

    #[test]
    fn test_undrained_events_stay_bounded() {
        let (mut transport, recorder) = transport();
        transport.set_tempo(240_000).unwrap();
        transport.start(timeline(&[(0, 0), (1, 4), (2, 8), (3, 12)]));

        let started = Instant::now();
        while recorder.commands().len() < EVENT_QUEUE && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(recorder.commands().len() >= EVENT_QUEUE);
        transport.stop();

        // Dispatch ran well past the queue size; the queue did not
        let events = transport.poll_events();
        assert_eq!(events.len(), EVENT_QUEUE);
        assert!(transport.poll_events().is_empty());
    }
}
