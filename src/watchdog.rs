//! Hang detection for the playback loop.
//!
//! The loop publishes a heartbeat after every completed tick and marks each
//! backend call while it is in flight. A separate OS thread compares both
//! against a deadline and, on a stall, writes one diagnostic report per
//! episode. The watchdog never touches the backend or transport state and
//! never tries to recover.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BackendOp {
    Load = 1,
    Play,
    Pause,
    Stop,
    Seek,
    Volume,
    Speed,
    Query,
}

impl BackendOp {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Load,
            2 => Self::Play,
            3 => Self::Pause,
            4 => Self::Stop,
            5 => Self::Seek,
            6 => Self::Volume,
            7 => Self::Speed,
            8 => Self::Query,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Seek => "seek",
            Self::Volume => "set_volume",
            Self::Speed => "set_speed",
            Self::Query => "query",
        }
    }
}

/// Monotonic progress markers shared between the playback loop and the watchdog.
#[derive(Debug)]
pub struct Heartbeat {
    origin: Instant,
    last_beat_ms: AtomicU64,
    op: AtomicU8,
    op_started_ms: AtomicU64,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_beat_ms: AtomicU64::new(0),
            op: AtomicU8::new(0),
            op_started_ms: AtomicU64::new(0),
        }
    }

    /// Milliseconds since this heartbeat was created.
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn beat(&self) {
        self.last_beat_ms.store(self.now_ms(), Ordering::Release);
    }

    pub fn last_beat_ms(&self) -> u64 {
        self.last_beat_ms.load(Ordering::Acquire)
    }

    /// Mark `op` as in flight until the returned guard drops.
    pub fn enter(&self, op: BackendOp) -> OpGuard<'_> {
        self.op_started_ms.store(self.now_ms(), Ordering::Release);
        self.op.store(op as u8, Ordering::Release);
        OpGuard { heartbeat: self }
    }

    /// The backend call currently in flight and when it started.
    pub fn in_flight(&self) -> Option<(BackendOp, u64)> {
        let op = BackendOp::from_u8(self.op.load(Ordering::Acquire))?;
        Some((op, self.op_started_ms.load(Ordering::Acquire)))
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OpGuard<'a> {
    heartbeat: &'a Heartbeat,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.heartbeat.op.store(0, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangCause {
    StaleHeartbeat,
    StuckBackendCall(BackendOp),
}

/// Deadline bookkeeping without a clock of its own, so it can be driven from tests.
#[derive(Debug)]
pub struct HangDetector {
    threshold_ms: u64,
    in_episode: bool,
}

impl HangDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold_ms: threshold.as_millis() as u64,
            in_episode: false,
        }
    }

    pub fn in_episode(&self) -> bool {
        self.in_episode
    }

    /// Returns the cause and stall length the first time a hang is seen; `None`
    /// while the same episode continues or when everything is healthy.
    pub fn check(&mut self, heartbeat: &Heartbeat, now_ms: u64) -> Option<(HangCause, Duration)> {
        let beat_age = now_ms.saturating_sub(heartbeat.last_beat_ms());
        let stuck = heartbeat
            .in_flight()
            .map(|(op, started)| (op, now_ms.saturating_sub(started)))
            .filter(|(_, age)| *age > self.threshold_ms);

        let hang = match stuck {
            Some((op, age)) => Some((HangCause::StuckBackendCall(op), age)),
            None if beat_age > self.threshold_ms => Some((HangCause::StaleHeartbeat, beat_age)),
            None => None,
        };

        match hang {
            Some(_) if self.in_episode => None,
            Some((cause, age)) => {
                self.in_episode = true;
                Some((cause, Duration::from_millis(age)))
            }
            None => {
                self.in_episode = false;
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: u32,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct HangReport {
    pub timestamp: String,
    pub cause: HangCause,
    pub stalled_for: Duration,
    pub threads: Vec<ThreadInfo>,
}

impl HangReport {
    pub fn capture(cause: HangCause, stalled_for: Duration) -> Self {
        Self {
            timestamp: local_timestamp(),
            cause,
            stalled_for,
            threads: capture_threads(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{}] hang detected", self.timestamp);
        let cause = match self.cause {
            HangCause::StaleHeartbeat => String::from("playback loop stopped ticking"),
            HangCause::StuckBackendCall(op) => format!("backend call `{}` did not return", op.label()),
        };
        let _ = writeln!(out, "  cause: {cause}");
        let _ = writeln!(out, "  stalled for: {:.1}s", self.stalled_for.as_secs_f32());
        if self.threads.is_empty() {
            let _ = writeln!(out, "  threads: unavailable on this platform");
        }
        for thread in &self.threads {
            let _ = writeln!(out, "  thread {:>7} {:<16} {}", thread.tid, thread.name, thread.state);
        }
        out
    }
}

fn local_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()))
}

/// Local wall time with its UTC offset; the offset is `+00:00` when `now_local` fell back to UTC.
fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Thread listing read from procfs; safe to call while other threads are blocked.
#[cfg(target_os = "linux")]
pub fn capture_threads() -> Vec<ThreadInfo> {
    let Ok(entries) = fs::read_dir("/proc/self/task") else {
        return Vec::new();
    };
    let mut threads: Vec<ThreadInfo> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let tid: u32 = entry.file_name().to_str()?.parse().ok()?;
            let dir = entry.path();
            let name = fs::read_to_string(dir.join("comm"))
                .map(|comm| comm.trim().to_string())
                .unwrap_or_default();
            let state = fs::read_to_string(dir.join("stat"))
                .ok()
                .and_then(|stat| parse_stat_state(&stat))
                .unwrap_or_else(|| String::from("?"));
            Some(ThreadInfo { tid, name, state })
        })
        .collect();
    threads.sort_by_key(|thread| thread.tid);
    threads
}

#[cfg(not(target_os = "linux"))]
pub fn capture_threads() -> Vec<ThreadInfo> {
    Vec::new()
}

/// The state letter follows the parenthesised command name, which may itself contain spaces.
fn parse_stat_state(stat: &str) -> Option<String> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let code = rest.split_whitespace().next()?;
    let label = match code {
        "R" => "running",
        "S" => "sleeping",
        "D" => "uninterruptible wait",
        "Z" => "zombie",
        "T" | "t" => "stopped",
        _ => code,
    };
    Some(label.to_string())
}

/// Destination for hang reports. Fire-and-forget: failures stay inside the sink.
pub trait DiagnosticSink: Send {
    fn report(&mut self, report: &HangReport);
}

/// Appends rendered reports to `hangdump.log`.
pub struct FileDiagnosticSink {
    path: PathBuf,
}

impl FileDiagnosticSink {
    pub const FILE_NAME: &'static str = "hangdump.log";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticSink for FileDiagnosticSink {
    fn report(&mut self, report: &HangReport) {
        let written = self
            .path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&self.path))
            .and_then(|mut file| {
                file.write_all(b"\n")?;
                file.write_all(report.render().as_bytes())?;
                file.flush()
            });
        if let Err(err) = written {
            tracing::warn!(path = %self.path.display(), "failed to write hang dump: {err}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    pub threshold: Duration,
    pub poll: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(15),
            poll: Duration::from_secs(1),
        }
    }
}

pub struct HangWatchdog {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl HangWatchdog {
    pub fn spawn(
        heartbeat: Arc<Heartbeat>,
        config: WatchdogConfig,
        mut sink: Box<dyn DiagnosticSink>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name(String::from("hang-watchdog"))
            .spawn(move || {
                let mut detector = HangDetector::new(config.threshold);
                loop {
                    match stop_rx.recv_timeout(config.poll) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let now = heartbeat.now_ms();
                    if let Some((cause, stalled_for)) = detector.check(&heartbeat, now) {
                        let report = HangReport::capture(cause, stalled_for);
                        tracing::error!(
                            ?cause,
                            stalled_ms = stalled_for.as_millis() as u64,
                            "hang detected; writing diagnostics"
                        );
                        sink.report(&report);
                    }
                }
            })?;

        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for HangWatchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
