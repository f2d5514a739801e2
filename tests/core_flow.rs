use rhythm_slicer::audio::{ScriptHandle, ScriptedBackend};
use rhythm_slicer::model::{PlayerState, RepeatMode, Track};
use rhythm_slicer::playlist::Playlist;
use rhythm_slicer::scheduler::UpdateScheduler;
use rhythm_slicer::session::{Command, Session};
use rhythm_slicer::transport::{SeekTarget, TransportOptions, TransportStateMachine};
use rhythm_slicer::watchdog::{
    DiagnosticSink, HangReport, HangWatchdog, Heartbeat, WatchdogConfig,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(100);

fn session_with(names: &[&str], options: TransportOptions) -> (Session, ScriptHandle) {
    let (backend, script) = ScriptedBackend::new();
    script.set_duration(Some(Duration::from_secs(90)));
    let transport = TransportStateMachine::new(
        Box::new(backend),
        Playlist::new(names.iter().map(Track::new).collect()),
        TransportOptions {
            shuffle_seed: Some(11),
            ..options
        },
        Arc::new(Heartbeat::new()),
    );
    (
        Session::new(transport, UpdateScheduler::new(TICK), None),
        script,
    )
}

#[test]
fn album_plays_through_and_stops() {
    let (mut session, script) = session_with(&["a.mp3", "b.mp3", "c.mp3"], TransportOptions::default());
    let mut now = Instant::now();
    session.dispatch(Command::Play);
    session.pump(now);

    for expected in [1, 2] {
        script.set_ended(true);
        now += TICK;
        session.pump(now);
        assert_eq!(session.snapshot().current_index, Some(expected));
        assert_eq!(session.snapshot().state, PlayerState::Playing);
    }

    script.set_ended(true);
    now += TICK;
    session.pump(now);
    assert_eq!(session.snapshot().state, PlayerState::Stopped);
    assert_eq!(session.snapshot().current_index, Some(2));
}

#[test]
fn repeat_all_loops_back_to_the_start() {
    let (mut session, script) = session_with(
        &["a.mp3", "b.mp3", "c.mp3"],
        TransportOptions {
            repeat: RepeatMode::All,
            ..TransportOptions::default()
        },
    );
    let now = Instant::now();
    session.dispatch(Command::PlayIndex(2));
    session.pump(now);
    script.set_ended(true);
    session.pump(now + TICK);
    assert_eq!(session.snapshot().current_index, Some(0));
}

#[test]
fn next_queued_behind_end_of_track_is_not_lost() {
    let (mut session, script) = session_with(&["a.mp3", "b.mp3", "c.mp3"], TransportOptions::default());
    let now = Instant::now();
    session.dispatch(Command::Play);
    session.pump(now);

    script.set_ended(true);
    session.pump(now + TICK);
    session.dispatch(Command::Next);
    session.pump(now + TICK + Duration::from_millis(10));
    assert_eq!(session.snapshot().current_index, Some(2));
}

#[test]
fn rapid_seeks_apply_last_writer_wins() {
    let (mut session, script) = session_with(&["a.mp3"], TransportOptions::default());
    session.dispatch(Command::Play);
    for seconds in [10, 20, 30] {
        session.dispatch(Command::Seek(SeekTarget::Absolute(Duration::from_secs(seconds))));
    }
    session.pump(Instant::now());
    assert_eq!(script.count("seek"), 3);
    assert_eq!(session.snapshot().position, Duration::from_secs(30));
}

#[test]
fn unplayable_track_is_skipped_on_auto_advance() {
    let (mut session, script) = session_with(
        &["a.mp3", "b.mp3", "c.mp3"],
        TransportOptions {
            skip_unplayable: true,
            ..TransportOptions::default()
        },
    );
    script.fail_load(Track::new("b.mp3").path);
    let now = Instant::now();
    session.dispatch(Command::Play);
    session.pump(now);
    script.set_ended(true);
    session.pump(now + TICK);

    assert_eq!(session.snapshot().current_index, Some(2));
    let notices = session.take_notices();
    assert!(notices.iter().any(|notice| notice.text.contains("b.mp3")));
}

#[test]
fn settings_round_trip_through_transport_options() {
    let settings = rhythm_slicer::config::Settings {
        volume: 40,
        speed: 9.0,
        repeat_mode: RepeatMode::One,
        ..rhythm_slicer::config::Settings::default()
    }
    .sanitized();
    let (session, script) = session_with(&["a.mp3"], TransportOptions::from(&settings));
    assert_eq!(session.snapshot().volume, 40);
    assert_eq!(session.snapshot().speed, 3.0);
    assert_eq!(session.snapshot().repeat, RepeatMode::One);
    assert_eq!(script.volume(), 40);
}

struct CountingSink(Arc<Mutex<Vec<HangReport>>>);

impl DiagnosticSink for CountingSink {
    fn report(&mut self, report: &HangReport) {
        self.0.lock().unwrap().push(report.clone());
    }
}

#[test]
fn blocked_backend_call_produces_one_hang_report() {
    let (backend, script) = ScriptedBackend::new();
    let heartbeat = Arc::new(Heartbeat::new());
    let transport = TransportStateMachine::new(
        Box::new(backend),
        Playlist::new(vec![Track::new("a.mp3")]),
        TransportOptions::default(),
        Arc::clone(&heartbeat),
    );
    let mut session = Session::new(transport, UpdateScheduler::new(TICK), None);
    session.pump(Instant::now());

    let reports = Arc::new(Mutex::new(Vec::new()));
    let watchdog = HangWatchdog::spawn(
        Arc::clone(&heartbeat),
        WatchdogConfig {
            threshold: Duration::from_millis(60),
            poll: Duration::from_millis(10),
        },
        Box::new(CountingSink(Arc::clone(&reports))),
    )
    .expect("spawn watchdog");

    script.stall("load", Duration::from_millis(300));
    session.dispatch(Command::Play);
    session.pump(Instant::now());
    session.pump(Instant::now() + TICK);
    thread::sleep(Duration::from_millis(50));
    watchdog.stop();

    assert_eq!(reports.lock().unwrap().len(), 1);
    assert_eq!(session.snapshot().state, PlayerState::Playing);
}
