use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl TrackMeta {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none()
    }
}

/// One playable resource. Two tracks with the same resolved path are the same track.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    pub meta: Option<TrackMeta>,
}

impl Track {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: crate::config::normalize_path(path.as_ref()),
            meta: None,
        }
    }

    pub fn display_title(&self) -> String {
        if let Some(title) = self.meta.as_ref().and_then(|meta| meta.title.as_deref()) {
            return title.to_string();
        }
        self.path
            .file_stem()
            .and_then(OsStr::to_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn artist(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.artist.as_deref())
    }

    pub fn album(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.album.as_deref())
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Track {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::One => "one",
            Self::All => "all",
        }
    }

    /// Whether navigation past either end of the play order wraps around.
    pub fn wraps(self) -> bool {
        self == Self::All
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

/// Read-only view of the transport handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlayerState,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub volume: u8,
    pub speed: f32,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub current_index: Option<usize>,
    pub current_track: Option<Track>,
    /// 1-based position of the current track within the play order.
    pub order_position: Option<usize>,
    pub playlist_len: usize,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: PlayerState::Stopped,
            position: Duration::ZERO,
            duration: None,
            volume: 100,
            speed: 1.0,
            repeat: RepeatMode::Off,
            shuffle: false,
            current_index: None,
            current_track: None,
            order_position: None,
            playlist_len: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}
