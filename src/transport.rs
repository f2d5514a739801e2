//! Playback transport: the single owner of the audio backend.
//!
//! Every command settles `PlayerState` before returning. Backend failures come
//! back as [`PlaybackError`] values and are also queued as [`Notice`]s for the
//! presentation layer; none of them escape as panics.

use crate::audio::Backend;
use crate::config::{Settings, clamp_speed};
use crate::error::{BackendError, PlaybackError};
use crate::model::{Notice, PlayerState, RepeatMode, Snapshot, Track, TrackMeta};
use crate::play_order::PlayOrderManager;
use crate::playlist::Playlist;
use crate::watchdog::{BackendOp, Heartbeat};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `previous_track` restarts the current track instead once playback is past this point.
pub const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Absolute(Duration),
    /// Signed offset in seconds from the live position.
    Relative(f64),
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub volume: u8,
    pub speed: f32,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub skip_unplayable: bool,
    /// Backend calls slower than this are surfaced as a hang notice.
    pub hang_threshold: Duration,
    pub shuffle_seed: Option<u64>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            volume: 100,
            speed: 1.0,
            repeat: RepeatMode::Off,
            shuffle: false,
            skip_unplayable: false,
            hang_threshold: Duration::from_secs(15),
            shuffle_seed: None,
        }
    }
}

impl From<&Settings> for TransportOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            volume: settings.volume,
            speed: settings.speed,
            repeat: settings.repeat_mode,
            shuffle: settings.shuffle,
            skip_unplayable: settings.skip_unplayable,
            hang_threshold: settings.hang_threshold(),
            shuffle_seed: None,
        }
    }
}

/// What the backend reported on the last poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub position: Option<Duration>,
    pub duration: Option<Duration>,
    pub ended: bool,
}

pub struct TransportStateMachine {
    backend: Box<dyn Backend>,
    playlist: Playlist,
    order: PlayOrderManager,
    state: PlayerState,
    position: Duration,
    duration: Option<Duration>,
    volume: u8,
    speed: f32,
    repeat: RepeatMode,
    skip_unplayable: bool,
    hang_threshold: Duration,
    heartbeat: Arc<Heartbeat>,
    notices: Vec<Notice>,
    loads: u64,
}

impl TransportStateMachine {
    pub fn new(
        backend: Box<dyn Backend>,
        playlist: Playlist,
        options: TransportOptions,
        heartbeat: Arc<Heartbeat>,
    ) -> Self {
        let mut order = match options.shuffle_seed {
            Some(seed) => PlayOrderManager::with_seed(playlist.len(), seed),
            None => PlayOrderManager::new(playlist.len()),
        };
        if options.shuffle {
            order.set_shuffle(true);
        }

        let mut transport = Self {
            backend,
            playlist,
            order,
            state: PlayerState::Stopped,
            position: Duration::ZERO,
            duration: None,
            volume: options.volume.min(100),
            speed: clamp_speed(options.speed),
            repeat: options.repeat,
            skip_unplayable: options.skip_unplayable,
            hang_threshold: options.hang_threshold,
            heartbeat,
            notices: Vec::new(),
            loads: 0,
        };
        transport.apply_levels();
        info!(
            backend = transport.backend.name(),
            tracks = transport.playlist.len(),
            "transport ready"
        );
        transport
    }

    fn apply_levels(&mut self) {
        let volume = self.volume;
        let speed = self.speed;
        if let Err(err) = self.call_retrying(BackendOp::Volume, |backend| backend.set_volume(volume))
        {
            self.report(PlaybackError::transient("set_volume", err));
        }
        if let Err(err) = self.call_retrying(BackendOp::Speed, |backend| backend.set_speed(speed)) {
            self.report(PlaybackError::transient("set_speed", err));
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current(&self) -> Option<usize> {
        self.order.current()
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn is_shuffled(&self) -> bool {
        self.order.is_shuffled()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn order(&self) -> &PlayOrderManager {
        &self.order
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn heartbeat(&self) -> &Arc<Heartbeat> {
        &self.heartbeat
    }

    /// Bumped every time a track is successfully (re)loaded.
    pub fn load_generation(&self) -> u64 {
        self.loads
    }

    pub fn play_index(&mut self, index: usize) -> Result<(), PlaybackError> {
        if self.playlist.is_empty() {
            return Err(self.report(PlaybackError::EmptyPlaylist));
        }
        self.start(index)
    }

    /// Resume when paused, otherwise start the current (or first) track.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlayerState::Playing => Ok(()),
            PlayerState::Paused => self.resume(),
            PlayerState::Stopped => {
                let Some(index) = self.order.current().or_else(|| self.order.first()) else {
                    return Err(self.report(PlaybackError::EmptyPlaylist));
                };
                self.start(index)
            }
        }
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlayerState::Playing {
            return Ok(());
        }
        match self.call_retrying(BackendOp::Pause, |backend| backend.pause()) {
            Ok(()) => {
                if let Some(position) = self.poll().position {
                    self.position = position;
                }
                self.state = PlayerState::Paused;
                info!(position_ms = self.position.as_millis() as u64, "paused");
                Ok(())
            }
            Err(err) => Err(self.report(PlaybackError::transient("pause", err))),
        }
    }

    pub fn toggle_pause(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlayerState::Playing => self.pause(),
            PlayerState::Paused | PlayerState::Stopped => self.play(),
        }
    }

    /// The transport always ends up stopped; a failing backend stop is still reported.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        if self.state == PlayerState::Stopped {
            return Ok(());
        }
        let result = self.call_retrying(BackendOp::Stop, |backend| backend.stop());
        self.settle_stopped();
        info!("stopped");
        result.map_err(|err| self.report(PlaybackError::transient("stop", err)))
    }

    pub fn next_track(&mut self) -> Result<(), PlaybackError> {
        if self.playlist.is_empty() {
            return Err(self.report(PlaybackError::EmptyPlaylist));
        }
        let wrap = self.repeat.wraps();
        let Some(index) = self.order.next(wrap) else {
            self.notices.push(Notice::info("End of playlist"));
            return Ok(());
        };
        self.advance(index, wrap)
    }

    pub fn previous_track(&mut self) -> Result<(), PlaybackError> {
        if self.playlist.is_empty() {
            return Err(self.report(PlaybackError::EmptyPlaylist));
        }
        if let Some(current) = self.order.current()
            && self.live_position() > RESTART_THRESHOLD
        {
            debug!(index = current, "restarting current track");
            return self.start(current);
        }
        match self.order.previous(self.repeat.wraps()) {
            Some(index) => self.start(index),
            None => Ok(()),
        }
    }

    /// The current track finished on its own. Ignored unless playing.
    pub fn natural_end(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlayerState::Playing {
            debug!(state = self.state.label(), "ignoring end of track");
            return Ok(());
        }
        let Some(current) = self.order.current() else {
            self.halt();
            return Ok(());
        };
        info!(index = current, repeat = self.repeat.label(), "track finished");

        if self.repeat == RepeatMode::One {
            return self.start(current);
        }
        let wrap = self.repeat.wraps();
        match self.order.next_after(current, wrap) {
            Some(index) => self.advance(index, wrap),
            None => {
                self.halt();
                self.notices.push(Notice::info("End of playlist"));
                Ok(())
            }
        }
    }

    pub fn seek(&mut self, target: SeekTarget) -> Result<(), PlaybackError> {
        if self.state == PlayerState::Stopped {
            return Ok(());
        }
        let requested = match target {
            SeekTarget::Absolute(position) => position,
            SeekTarget::Relative(delta) if delta.is_finite() => {
                let seconds = (self.live_position().as_secs_f64() + delta).max(0.0);
                Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
            }
            SeekTarget::Relative(_) => return Ok(()),
        };
        let position = self
            .duration
            .map_or(requested, |duration| requested.min(duration));

        match self.call_retrying(BackendOp::Seek, |backend| backend.seek(position)) {
            Ok(()) => {
                self.position = position;
                debug!(position_ms = position.as_millis() as u64, "seeked");
                Ok(())
            }
            Err(err) => Err(self.report(PlaybackError::transient("seek", err))),
        }
    }

    /// Accepts any integer; the applied volume is clamped to `0..=100`.
    pub fn set_volume(&mut self, volume: i32) -> Result<(), PlaybackError> {
        let volume = volume.clamp(0, 100) as u8;
        match self.call_retrying(BackendOp::Volume, |backend| backend.set_volume(volume)) {
            Ok(()) => {
                self.volume = volume;
                debug!(volume, "volume set");
                Ok(())
            }
            Err(err) => Err(self.report(PlaybackError::transient("set_volume", err))),
        }
    }

    pub fn adjust_volume(&mut self, delta: i32) -> Result<(), PlaybackError> {
        self.set_volume(i32::from(self.volume).saturating_add(delta))
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<(), PlaybackError> {
        let speed = clamp_speed(speed);
        match self.call_retrying(BackendOp::Speed, |backend| backend.set_speed(speed)) {
            Ok(()) => {
                self.speed = speed;
                debug!(speed, "speed set");
                Ok(())
            }
            Err(err) => Err(self.report(PlaybackError::transient("set_speed", err))),
        }
    }

    pub fn adjust_speed(&mut self, delta: f32) -> Result<(), PlaybackError> {
        let target = ((self.speed + delta) * 100.0).round() / 100.0;
        self.set_speed(target)
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
        info!(repeat = mode.label(), "repeat mode changed");
    }

    pub fn cycle_repeat_mode(&mut self) -> RepeatMode {
        let mode = self.repeat.next();
        self.set_repeat_mode(mode);
        self.notices
            .push(Notice::info(format!("Repeat: {}", mode.label())));
        mode
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.order.set_shuffle(enabled);
        info!(shuffle = enabled, "shuffle changed");
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let enabled = !self.order.is_shuffled();
        self.set_shuffle(enabled);
        self.notices.push(Notice::info(if enabled {
            "Shuffle: on"
        } else {
            "Shuffle: off"
        }));
        enabled
    }

    /// Append a track; a duplicate returns the index already holding it.
    pub fn add_track(&mut self, track: Track) -> usize {
        let before = self.playlist.len();
        let index = self.playlist.add(track);
        if self.playlist.len() > before {
            self.order.on_inserted(index);
        }
        index
    }

    pub fn insert_track(&mut self, index: usize, track: Track) -> usize {
        match self.playlist.insert(index, track) {
            Ok(inserted) => {
                self.order.on_inserted(inserted);
                inserted
            }
            Err(existing) => existing,
        }
    }

    /// Removing the current track stops playback and clears the cursor.
    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        if index >= self.playlist.len() {
            return None;
        }
        if self.order.current() == Some(index) && self.state != PlayerState::Stopped {
            self.halt();
        }
        let removed = self.playlist.remove(index)?;
        self.order.on_removed(index);
        info!(index, track = %removed.path.display(), "track removed");
        Some(removed)
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if !self.playlist.move_track(from, to) {
            return false;
        }
        self.order.on_moved(from, to);
        true
    }

    pub fn replace_playlist(&mut self, playlist: Playlist) {
        if self.state != PlayerState::Stopped {
            self.halt();
        }
        self.order.reset(playlist.len());
        self.playlist = playlist;
        info!(tracks = self.playlist.len(), "playlist replaced");
    }

    pub fn set_track_meta(&mut self, index: usize, meta: TrackMeta) {
        self.playlist.set_meta(index, meta);
    }

    /// Poll the backend and fold the result into the transport.
    ///
    /// Never issues a transport command. Returns true while the playing track
    /// reports that it has finished.
    pub fn refresh(&mut self) -> bool {
        if self.state == PlayerState::Stopped {
            return false;
        }
        let progress = self.poll();
        if let Some(position) = progress.position {
            self.position = position;
        }
        if progress.duration.is_some() {
            self.duration = progress.duration;
        }
        let reached_end = self
            .duration
            .is_some_and(|duration| !duration.is_zero() && self.position >= duration);
        self.state == PlayerState::Playing && (progress.ended || reached_end)
    }

    pub fn snapshot(&self) -> Snapshot {
        let current_index = self.order.current();
        Snapshot {
            state: self.state,
            position: self.position,
            duration: self.duration,
            volume: self.volume,
            speed: self.speed,
            repeat: self.repeat,
            shuffle: self.order.is_shuffled(),
            current_index,
            current_track: current_index
                .and_then(|index| self.playlist.get(index))
                .cloned(),
            order_position: self
                .order
                .current_position_in_order()
                .ok()
                .map(|position| position + 1),
            playlist_len: self.playlist.len(),
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Load `index` and start it from zero. The cursor only moves on success.
    fn start(&mut self, index: usize) -> Result<(), PlaybackError> {
        let Some(track) = self.playlist.get(index) else {
            return Err(self.report(PlaybackError::InvalidIndex(index)));
        };
        let path = track.path.clone();

        let started = self
            .call(BackendOp::Load, |backend| backend.load(&path))
            .and_then(|()| self.call_retrying(BackendOp::Play, |backend| backend.play()));

        match started {
            Ok(()) => {
                self.order.set_current(Some(index));
                self.loads += 1;
                self.state = PlayerState::Playing;
                self.position = Duration::ZERO;
                self.duration = self.poll().duration;
                info!(index, track = %path.display(), "playing");
                Ok(())
            }
            Err(err) => {
                self.halt();
                Err(self.report(PlaybackError::from_load(path, err)))
            }
        }
    }

    /// Skip past unplayable tracks when allowed, trying each at most once.
    fn advance(&mut self, first: usize, wrap: bool) -> Result<(), PlaybackError> {
        let mut candidate = first;
        let mut attempts = 1;
        loop {
            let err = match self.start(candidate) {
                Ok(()) => return Ok(()),
                Err(err @ PlaybackError::LoadFailed { .. }) if self.skip_unplayable => err,
                Err(err) => return Err(err),
            };
            match self.order.next_after(candidate, wrap) {
                Some(next) if next != first && attempts < self.playlist.len() => {
                    warn!(index = candidate, "skipping unplayable track");
                    candidate = next;
                    attempts += 1;
                }
                _ => return Err(err),
            }
        }
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        match self.call_retrying(BackendOp::Play, |backend| backend.play()) {
            Ok(()) => {
                self.state = PlayerState::Playing;
                info!("resumed");
                Ok(())
            }
            Err(err) => Err(self.report(PlaybackError::transient("play", err))),
        }
    }

    /// Best-effort backend stop used when a failure or edit leaves nothing to play.
    fn halt(&mut self) {
        if let Err(err) = self.call(BackendOp::Stop, |backend| backend.stop()) {
            debug!(%err, "backend stop failed");
        }
        self.settle_stopped();
    }

    fn settle_stopped(&mut self) {
        self.state = PlayerState::Stopped;
        self.position = Duration::ZERO;
        self.duration = None;
    }

    fn live_position(&mut self) -> Duration {
        if self.state == PlayerState::Stopped {
            return self.position;
        }
        self.poll().position.unwrap_or(self.position)
    }

    fn poll(&mut self) -> Progress {
        let _in_flight = self.heartbeat.enter(BackendOp::Query);
        Progress {
            position: self.backend.position(),
            duration: self.backend.duration(),
            ended: self.backend.is_ended(),
        }
    }

    fn call<T>(
        &mut self,
        op: BackendOp,
        f: impl FnOnce(&mut Box<dyn Backend>) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let started = Instant::now();
        let result = {
            let _in_flight = self.heartbeat.enter(op);
            f(&mut self.backend)
        };
        let elapsed = started.elapsed();
        if elapsed >= self.hang_threshold {
            warn!(op = op.label(), elapsed_ms = elapsed.as_millis() as u64, "slow backend call");
            self.report(PlaybackError::Hang {
                stalled_for: elapsed,
            });
        }
        result
    }

    /// Rejected calls get exactly one more attempt.
    fn call_retrying(
        &mut self,
        op: BackendOp,
        f: impl Fn(&mut Box<dyn Backend>) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        match self.call(op, &f) {
            Err(err @ BackendError::Rejected { .. }) => {
                warn!(op = op.label(), %err, "retrying backend call");
                self.call(op, &f)
            }
            other => other,
        }
    }

    fn report(&mut self, err: PlaybackError) -> PlaybackError {
        let notice = match &err {
            PlaybackError::BackendUnavailable(_) | PlaybackError::Hang { .. } => {
                Notice::error(err.to_string())
            }
            PlaybackError::LoadFailed { .. } | PlaybackError::TransientBackendError { .. } => {
                warn!(%err, "playback error");
                Notice::warning(err.to_string())
            }
            PlaybackError::EmptyPlaylist | PlaybackError::InvalidIndex(_) => {
                Notice::info(err.to_string())
            }
        };
        self.notices.push(notice);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ScriptHandle, ScriptedBackend};
    use crate::model::NoticeLevel;

    fn transport_with(
        names: &[&str],
        options: TransportOptions,
    ) -> (TransportStateMachine, ScriptHandle) {
        let (backend, script) = ScriptedBackend::new();
        script.set_duration(Some(Duration::from_secs(180)));
        let playlist = Playlist::new(names.iter().map(Track::new).collect());
        let transport = TransportStateMachine::new(
            Box::new(backend),
            playlist,
            TransportOptions {
                shuffle_seed: Some(7),
                ..options
            },
            Arc::new(Heartbeat::new()),
        );
        (transport, script)
    }

    fn transport(names: &[&str]) -> (TransportStateMachine, ScriptHandle) {
        transport_with(names, TransportOptions::default())
    }

    fn path(name: &str) -> std::path::PathBuf {
        Track::new(name).path
    }

    #[test]
    fn play_from_stopped_starts_first_track() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play().expect("play");
        assert_eq!(transport.state(), PlayerState::Playing);
        assert_eq!(transport.current(), Some(0));
        assert_eq!(script.loaded(), Some(path("a.mp3")));
        assert!(script.is_playing());
        assert_eq!(transport.duration(), Some(Duration::from_secs(180)));
    }

    #[test]
    fn pause_freezes_position_and_play_resumes() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        script.set_position(Duration::from_secs(42));
        transport.pause().expect("pause");
        assert_eq!(transport.state(), PlayerState::Paused);
        assert_eq!(transport.position(), Duration::from_secs(42));

        transport.play().expect("resume");
        assert_eq!(transport.state(), PlayerState::Playing);
        assert_eq!(script.count("load"), 1);
    }

    #[test]
    fn stop_resets_position() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        script.set_position(Duration::from_secs(10));
        transport.refresh();
        transport.stop().expect("stop");
        assert_eq!(transport.state(), PlayerState::Stopped);
        assert_eq!(transport.position(), Duration::ZERO);
        assert_eq!(transport.current(), Some(0));
    }

    #[test]
    fn repeat_all_wraps_from_last_to_first() {
        let (mut transport, _script) = transport_with(
            &["a.mp3", "b.mp3", "c.mp3"],
            TransportOptions {
                repeat: RepeatMode::All,
                ..TransportOptions::default()
            },
        );
        transport.play_index(2).expect("play c");
        transport.natural_end().expect("natural end");
        assert_eq!(transport.current(), Some(0));
        assert_eq!(transport.state(), PlayerState::Playing);
    }

    #[test]
    fn repeat_off_stops_after_last_track() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(1).expect("play b");
        transport.natural_end().expect("natural end");
        assert_eq!(transport.state(), PlayerState::Stopped);
        assert_eq!(transport.current(), Some(1));
        assert_eq!(script.loaded(), None);
    }

    #[test]
    fn repeat_off_advances_in_the_middle() {
        let (mut transport, _script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(0).expect("play a");
        transport.natural_end().expect("natural end");
        assert_eq!(transport.current(), Some(1));
        assert_eq!(transport.state(), PlayerState::Playing);
    }

    #[test]
    fn repeat_one_reloads_same_track_from_zero() {
        let (mut transport, script) = transport_with(
            &["a.mp3", "b.mp3"],
            TransportOptions {
                repeat: RepeatMode::One,
                ..TransportOptions::default()
            },
        );
        transport.play_index(1).expect("play b");
        script.set_position(Duration::from_secs(179));
        transport.refresh();
        transport.natural_end().expect("natural end");
        assert_eq!(transport.current(), Some(1));
        assert_eq!(transport.position(), Duration::ZERO);
        assert_eq!(script.count("load"), 2);
    }

    #[test]
    fn manual_next_ignores_repeat_one() {
        let (mut transport, _script) = transport_with(
            &["a.mp3", "b.mp3"],
            TransportOptions {
                repeat: RepeatMode::One,
                ..TransportOptions::default()
            },
        );
        transport.play_index(0).expect("play a");
        transport.next_track().expect("next");
        assert_eq!(transport.current(), Some(1));
    }

    #[test]
    fn natural_end_is_ignored_unless_playing() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(0).expect("play");
        transport.pause().expect("pause");
        transport.natural_end().expect("natural end");
        assert_eq!(transport.state(), PlayerState::Paused);
        assert_eq!(transport.current(), Some(0));
        assert_eq!(script.count("load"), 1);
    }

    #[test]
    fn manual_next_at_end_without_wrap_keeps_playing() {
        let (mut transport, _script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(1).expect("play b");
        transport.drain_notices();
        transport.next_track().expect("next");
        assert_eq!(transport.current(), Some(1));
        assert_eq!(transport.state(), PlayerState::Playing);
        assert_eq!(
            transport.drain_notices(),
            vec![Notice::info("End of playlist")]
        );
    }

    #[test]
    fn previous_restarts_current_after_three_seconds() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(1).expect("play b");
        script.set_position(Duration::from_millis(3_500));
        transport.previous_track().expect("previous");
        assert_eq!(transport.current(), Some(1));
        assert_eq!(transport.position(), Duration::ZERO);
        assert_eq!(script.count("load"), 2);
    }

    #[test]
    fn previous_within_three_seconds_moves_back() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(1).expect("play b");
        script.set_position(Duration::from_secs(3));
        transport.previous_track().expect("previous");
        assert_eq!(transport.current(), Some(0));
    }

    #[test]
    fn previous_at_first_track_without_wrap_is_noop() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3"]);
        transport.play_index(0).expect("play a");
        transport.previous_track().expect("previous");
        assert_eq!(transport.current(), Some(0));
        assert_eq!(script.count("load"), 1);
    }

    #[test]
    fn previous_wraps_with_repeat_all() {
        let (mut transport, _script) = transport_with(
            &["a.mp3", "b.mp3", "c.mp3"],
            TransportOptions {
                repeat: RepeatMode::All,
                ..TransportOptions::default()
            },
        );
        transport.play_index(0).expect("play a");
        transport.previous_track().expect("previous");
        assert_eq!(transport.current(), Some(2));
    }

    #[test]
    fn load_failure_stops_and_keeps_cursor() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3", "c.mp3"]);
        transport.play_index(0).expect("play a");
        transport.drain_notices();
        script.fail_load(path("b.mp3"));

        let err = transport.play_index(1).expect_err("b is unreadable");
        assert!(matches!(
            &err,
            PlaybackError::LoadFailed { track, .. } if *track == path("b.mp3")
        ));
        assert_eq!(transport.state(), PlayerState::Stopped);
        assert_eq!(transport.current(), Some(0));
        let notices = transport.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[test]
    fn manual_next_does_not_skip_when_disabled() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3", "c.mp3"]);
        transport.play_index(0).expect("play a");
        script.fail_load(path("b.mp3"));
        assert!(transport.next_track().is_err());
        assert_eq!(transport.current(), Some(0));
        assert_eq!(transport.state(), PlayerState::Stopped);
    }

    #[test]
    fn auto_advance_skips_unplayable_tracks() {
        let (mut transport, script) = transport_with(
            &["a.mp3", "b.mp3", "c.mp3"],
            TransportOptions {
                skip_unplayable: true,
                ..TransportOptions::default()
            },
        );
        transport.play_index(0).expect("play a");
        script.fail_load(path("b.mp3"));
        transport.natural_end().expect("skip to c");
        assert_eq!(transport.current(), Some(2));
        assert_eq!(transport.state(), PlayerState::Playing);
    }

    #[test]
    fn skipping_tries_each_track_at_most_once() {
        let (mut transport, script) = transport_with(
            &["a.mp3", "b.mp3", "c.mp3"],
            TransportOptions {
                repeat: RepeatMode::All,
                skip_unplayable: true,
                ..TransportOptions::default()
            },
        );
        transport.play_index(0).expect("play a");
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            script.fail_load(path(name));
        }
        assert!(transport.natural_end().is_err());
        assert_eq!(transport.state(), PlayerState::Stopped);
        assert_eq!(script.count("load"), 4);
    }

    #[test]
    fn volume_is_clamped() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.set_volume(150).expect("volume");
        assert_eq!(transport.volume(), 100);
        transport.set_volume(-5).expect("volume");
        assert_eq!(transport.volume(), 0);
        assert_eq!(script.volume(), 0);
        transport.adjust_volume(7).expect("volume");
        assert_eq!(transport.volume(), 7);
    }

    #[test]
    fn speed_is_clamped() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.set_speed(10.0).expect("speed");
        assert_eq!(transport.speed(), 3.0);
        transport.set_speed(0.0).expect("speed");
        assert_eq!(transport.speed(), 0.25);
        transport.set_speed(f32::NAN).expect("speed");
        assert_eq!(transport.speed(), 1.0);
        transport.adjust_speed(0.1).expect("speed");
        assert!((script.speed() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn seek_is_clamped_to_track_bounds() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        transport
            .seek(SeekTarget::Absolute(Duration::from_secs(500)))
            .expect("seek");
        assert_eq!(transport.position(), Duration::from_secs(180));

        script.set_position(Duration::from_secs(2));
        transport.seek(SeekTarget::Relative(-5.0)).expect("seek");
        assert_eq!(transport.position(), Duration::ZERO);
        assert_eq!(script.calls().last().map(String::as_str), Some("seek 0ms"));
    }

    #[test]
    fn seek_while_stopped_does_nothing() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport
            .seek(SeekTarget::Relative(5.0))
            .expect("seek while stopped");
        assert_eq!(script.count("seek"), 0);
    }

    #[test]
    fn rejected_seek_is_retried_once() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        script.fail_next("seek", 1);
        transport
            .seek(SeekTarget::Absolute(Duration::from_secs(30)))
            .expect("second attempt succeeds");
        assert_eq!(script.count("seek"), 2);
        assert_eq!(transport.position(), Duration::from_secs(30));
    }

    #[test]
    fn persistent_seek_failure_leaves_state_unchanged() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        transport.drain_notices();
        script.fail_next("seek", 2);
        let err = transport
            .seek(SeekTarget::Absolute(Duration::from_secs(30)))
            .expect_err("both attempts fail");
        assert!(matches!(
            err,
            PlaybackError::TransientBackendError { op: "seek", .. }
        ));
        assert_eq!(transport.state(), PlayerState::Playing);
        assert_eq!(transport.position(), Duration::ZERO);
        assert_eq!(script.count("seek"), 2);
        assert_eq!(transport.drain_notices().len(), 1);
    }

    #[test]
    fn shuffle_toggle_twice_restores_linear_order() {
        let (mut transport, _script) = transport(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
        assert!(transport.toggle_shuffle());
        assert!(!transport.toggle_shuffle());
        assert_eq!(transport.order().order(), &[0, 1, 2, 3]);
    }

    #[test]
    fn removing_playing_track_stops_playback() {
        let (mut transport, script) = transport(&["a.mp3", "b.mp3", "c.mp3"]);
        transport.play_index(1).expect("play b");
        let removed = transport.remove_track(1).expect("removed");
        assert_eq!(removed.path, path("b.mp3"));
        assert_eq!(transport.state(), PlayerState::Stopped);
        assert_eq!(transport.current(), None);
        assert_eq!(script.loaded(), None);
        assert_eq!(transport.playlist().len(), 2);
    }

    #[test]
    fn removing_earlier_track_shifts_cursor() {
        let (mut transport, _script) = transport(&["a.mp3", "b.mp3", "c.mp3"]);
        transport.play_index(2).expect("play c");
        transport.remove_track(0);
        assert_eq!(transport.current(), Some(1));
        assert_eq!(transport.state(), PlayerState::Playing);
        assert_eq!(
            transport.snapshot().current_track.map(|track| track.path),
            Some(path("c.mp3"))
        );
    }

    #[test]
    fn empty_playlist_and_bad_index_are_reported() {
        let (mut empty, _script) = transport(&[]);
        assert_eq!(empty.play(), Err(PlaybackError::EmptyPlaylist));
        assert_eq!(empty.next_track(), Err(PlaybackError::EmptyPlaylist));

        let (mut single, _script) = transport(&["a.mp3"]);
        assert_eq!(single.play_index(4), Err(PlaybackError::InvalidIndex(4)));
        assert_eq!(single.state(), PlayerState::Stopped);
    }

    #[test]
    fn refresh_detects_end_only_while_playing() {
        let (mut transport, script) = transport(&["a.mp3"]);
        transport.play().expect("play");
        assert!(!transport.refresh());
        script.set_ended(true);
        assert!(transport.refresh());
        transport.pause().expect("pause");
        assert!(!transport.refresh());
    }

    #[test]
    fn slow_backend_call_raises_hang_notice() {
        let (mut transport, script) = transport_with(
            &["a.mp3"],
            TransportOptions {
                hang_threshold: Duration::from_millis(20),
                ..TransportOptions::default()
            },
        );
        transport.play().expect("play");
        transport.drain_notices();
        script.stall("seek", Duration::from_millis(40));
        transport
            .seek(SeekTarget::Absolute(Duration::from_secs(1)))
            .expect("seek");
        let notices = transport.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(transport.heartbeat().in_flight().is_none());
    }

    #[test]
    fn snapshot_reports_one_based_order_position() {
        let (mut transport, _script) = transport(&["a.mp3", "b.mp3", "c.mp3"]);
        transport.play_index(1).expect("play b");
        let snapshot = transport.snapshot();
        assert_eq!(snapshot.order_position, Some(2));
        assert_eq!(snapshot.playlist_len, 3);
        assert_eq!(snapshot.state, PlayerState::Playing);
    }
}
