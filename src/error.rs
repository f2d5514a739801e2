use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`crate::audio::Backend`] call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("no media loaded")]
    NoMedia,

    #[error("backend rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },
}

/// Recoverable playback failure surfaced by the transport.
///
/// None of these terminate the session. The transport has already settled its
/// state by the time one of them is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("could not play {}: {reason}", track.display())]
    LoadFailed { track: PathBuf, reason: String },

    #[error("{op} failed: {reason}")]
    TransientBackendError { op: &'static str, reason: String },

    #[error("playback stalled for {:.1}s", stalled_for.as_secs_f32())]
    Hang { stalled_for: Duration },

    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("no track at index {0}")]
    InvalidIndex(usize),
}

impl PlaybackError {
    pub(crate) fn from_load(track: PathBuf, err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Self::BackendUnavailable(reason),
            BackendError::Load { reason, .. } => Self::LoadFailed { track, reason },
            other => Self::LoadFailed {
                track,
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn transient(op: &'static str, err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Self::BackendUnavailable(reason),
            BackendError::Rejected { reason, .. } => Self::TransientBackendError { op, reason },
            other => Self::TransientBackendError {
                op,
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("playlist index {0} is not part of the play order")]
    NotFound(usize),

    #[error("no track is current")]
    NoCurrent,
}
