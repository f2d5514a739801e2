//! The orchestration actor.
//!
//! One `Session` owns the transport, the scheduler and the metadata loader.
//! Commands queue up in arrival order and are applied on the next `pump`, which
//! then runs the tick if one is due. Nothing here is shared or global.

use crate::metadata::MetadataLoader;
use crate::model::{Notice, RepeatMode, Snapshot, Track};
use crate::playlist::{Playlist, is_audio};
use crate::scheduler::{TickOutcome, UpdateScheduler};
use crate::transport::{SeekTarget, TransportStateMachine};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MAX_NOTICES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    PlayIndex(usize),
    Pause,
    TogglePause,
    Stop,
    Next,
    Previous,
    Seek(SeekTarget),
    SetVolume(i32),
    AdjustVolume(i32),
    SetSpeed(f32),
    AdjustSpeed(f32),
    SetRepeat(RepeatMode),
    CycleRepeat,
    SetShuffle(bool),
    ToggleShuffle,
    AddTrack(PathBuf),
    RemoveTrack(usize),
    MoveTrack { from: usize, to: usize },
    /// Replace the playlist with a directory scan or a single file.
    Open(PathBuf),
    Quit,
}

pub struct Session {
    transport: TransportStateMachine,
    scheduler: UpdateScheduler,
    commands: VecDeque<Command>,
    metadata: Option<MetadataLoader>,
    metadata_generation: u64,
    notices: VecDeque<Notice>,
    open_recursive: bool,
    quitting: bool,
}

impl Session {
    pub fn new(
        transport: TransportStateMachine,
        scheduler: UpdateScheduler,
        metadata: Option<MetadataLoader>,
    ) -> Self {
        let mut session = Self {
            transport,
            scheduler,
            commands: VecDeque::new(),
            metadata,
            metadata_generation: 0,
            notices: VecDeque::new(),
            open_recursive: false,
            quitting: false,
        };
        session.request_metadata();
        session.scheduler.publish(&session.transport);
        session
    }

    pub fn dispatch(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Whether `Command::Open` on a folder descends into subfolders.
    pub fn set_open_recursive(&mut self, recursive: bool) {
        self.open_recursive = recursive;
    }

    pub fn pending(&self) -> usize {
        self.commands.len()
    }

    /// Apply queued commands, then tick if due, then fold in resolved metadata.
    pub fn pump(&mut self, now: Instant) {
        let mut changed = false;
        while let Some(command) = self.commands.pop_front() {
            self.apply(command);
            changed = true;
            if self.quitting {
                self.commands.clear();
                break;
            }
        }

        let ticked = matches!(
            self.scheduler.tick(now, &mut self.transport),
            TickOutcome::Ran(_)
        );
        changed |= self.apply_metadata();
        if changed && !ticked {
            self.scheduler.publish(&self.transport);
        }

        for notice in self.transport.drain_notices() {
            self.push_notice(notice);
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.scheduler.latest()
    }

    pub fn transport(&self) -> &TransportStateMachine {
        &self.transport
    }

    pub fn until_next_tick(&self, now: Instant) -> Duration {
        self.scheduler.until_due(now)
    }

    pub fn skipped_periods(&self) -> u64 {
        self.scheduler.skipped_periods()
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Most recent notices, oldest first. At most `MAX_NOTICES` are kept.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    pub fn push_notices(&mut self, notices: impl IntoIterator<Item = Notice>) {
        for notice in notices {
            self.push_notice(notice);
        }
    }

    fn push_notice(&mut self, notice: Notice) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    fn apply(&mut self, command: Command) {
        debug!(?command, "applying command");
        let transport = &mut self.transport;
        let result = match command {
            Command::Play => transport.play(),
            Command::PlayIndex(index) => transport.play_index(index),
            Command::Pause => transport.pause(),
            Command::TogglePause => transport.toggle_pause(),
            Command::Stop => transport.stop(),
            Command::Next => transport.next_track(),
            Command::Previous => transport.previous_track(),
            Command::Seek(target) => transport.seek(target),
            Command::SetVolume(volume) => transport.set_volume(volume),
            Command::AdjustVolume(delta) => transport.adjust_volume(delta),
            Command::SetSpeed(speed) => transport.set_speed(speed),
            Command::AdjustSpeed(delta) => transport.adjust_speed(delta),
            Command::SetRepeat(mode) => {
                transport.set_repeat_mode(mode);
                Ok(())
            }
            Command::CycleRepeat => {
                transport.cycle_repeat_mode();
                Ok(())
            }
            Command::SetShuffle(enabled) => {
                transport.set_shuffle(enabled);
                Ok(())
            }
            Command::ToggleShuffle => {
                transport.toggle_shuffle();
                Ok(())
            }
            Command::AddTrack(path) => {
                self.add_track(path);
                Ok(())
            }
            Command::RemoveTrack(index) => {
                if let Some(track) = transport.remove_track(index) {
                    self.push_notice(Notice::info(format!("Removed {}", track.display_title())));
                }
                Ok(())
            }
            Command::MoveTrack { from, to } => {
                transport.move_track(from, to);
                Ok(())
            }
            Command::Open(path) => {
                self.open(path);
                Ok(())
            }
            Command::Quit => {
                self.quitting = true;
                transport.stop()
            }
        };
        if let Err(err) = result {
            debug!(%err, "command failed");
        }
    }

    fn add_track(&mut self, path: PathBuf) {
        if !path.is_file() || !is_audio(&path) {
            self.push_notice(Notice::warning(format!(
                "Not a playable file: {}",
                path.display()
            )));
            return;
        }
        let track = Track::new(&path);
        let index = self.transport.add_track(track);
        if let (Some(loader), Some(track)) = (&self.metadata, self.transport.playlist().get(index))
            && track.meta.is_none()
        {
            loader.request(index, &track.path);
        }
    }

    fn open(&mut self, path: PathBuf) {
        let playlist = Playlist::from_input(&path, self.open_recursive);
        if playlist.is_empty() {
            self.push_notice(Notice::warning(format!(
                "No audio files found in {}",
                path.display()
            )));
            return;
        }
        let count = playlist.len();
        self.transport.replace_playlist(playlist);
        self.request_metadata();
        info!(path = %path.display(), tracks = count, "opened");
        self.push_notice(Notice::info(format!("Loaded {count} tracks")));
    }

    fn request_metadata(&mut self) {
        if let Some(loader) = &self.metadata {
            self.metadata_generation = loader.request_playlist(self.transport.playlist());
        }
    }

    fn apply_metadata(&mut self) -> bool {
        let Some(loader) = &self.metadata else {
            return false;
        };
        let mut applied = false;
        for result in loader.try_results() {
            if result.generation != self.metadata_generation {
                continue;
            }
            let Some(meta) = result.meta else {
                continue;
            };
            let playlist = self.transport.playlist();
            let index = match playlist.get(result.index) {
                Some(track) if track.path == result.path => Some(result.index),
                _ => playlist.position_of(&result.path),
            };
            if let Some(index) = index {
                self.transport.set_track_meta(index, meta);
                applied = true;
            }
        }
        applied
    }
}
