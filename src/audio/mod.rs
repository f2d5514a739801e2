use crate::error::BackendError;
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod scripted;

pub use scripted::{ScriptHandle, ScriptedBackend};

/// One loaded media resource behind an opaque audio stack.
///
/// Any call may block for a backend-dependent time or fail. Callers never issue
/// two calls concurrently.
pub trait Backend {
    fn load(&mut self, path: &Path) -> Result<(), BackendError>;
    fn play(&mut self) -> Result<(), BackendError>;
    fn pause(&mut self) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn seek(&mut self, position: Duration) -> Result<(), BackendError>;
    fn set_volume(&mut self, volume: u8) -> Result<(), BackendError>;
    fn set_speed(&mut self, speed: f32) -> Result<(), BackendError>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn is_ended(&self) -> bool;
    fn name(&self) -> &'static str;
}

pub struct RodioBackend {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
    speed: f32,
}

impl RodioBackend {
    pub fn new() -> Result<Self, BackendError> {
        let mut stream = with_silenced_stderr(|| {
            OutputStreamBuilder::from_default_device()
                .map_err(|err| BackendError::Unavailable(err.to_string()))?
                .with_error_callback(|_| {})
                .open_stream_or_fallback()
                .map_err(|err| BackendError::Unavailable(err.to_string()))
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        sink.pause();

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            volume: 1.0,
            speed: 1.0,
        })
    }

    fn require_media(&self) -> Result<(), BackendError> {
        if self.current.is_none() {
            return Err(BackendError::NoMedia);
        }
        Ok(())
    }
}

impl Backend for RodioBackend {
    fn load(&mut self, path: &Path) -> Result<(), BackendError> {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;

        let load_err = |reason: String| BackendError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|err| load_err(err.to_string()))?;
        let source = Decoder::try_from(file).map_err(|err| load_err(err.to_string()))?;

        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.track_duration = source.total_duration().filter(|d| !d.is_zero());
        self.sink.append(source);
        self.sink.set_volume(self.volume);
        self.sink.set_speed(self.speed);
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&mut self) -> Result<(), BackendError> {
        self.require_media()?;
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        self.require_media()?;
        self.sink.pause();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), BackendError> {
        self.require_media()?;
        self.sink
            .try_seek(position)
            .map_err(|err| BackendError::Rejected {
                op: "seek",
                reason: format!("{err:?}"),
            })
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), BackendError> {
        self.volume = f32::from(volume.min(100)) / 100.0;
        self.sink.set_volume(self.volume);
        Ok(())
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), BackendError> {
        self.speed = speed;
        self.sink.set_speed(speed);
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn is_ended(&self) -> bool {
        self.current.is_some() && !self.sink.is_paused() && self.sink.empty()
    }

    fn name(&self) -> &'static str {
        "rodio"
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Silent backend driven by the wall clock.
///
/// Stands in when no output device is available; position advances at the
/// configured speed while playing.
pub struct NullBackend {
    current: Option<PathBuf>,
    playing: bool,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    fixed_duration: Option<Duration>,
    speed: f32,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            current: None,
            playing: false,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            fixed_duration: None,
            speed: 1.0,
        }
    }

    /// Report `duration` for every loaded track instead of probing the file.
    pub fn with_track_duration(duration: Duration) -> Self {
        Self {
            fixed_duration: Some(duration),
            ..Self::new()
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if self.playing
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed().mul_f32(self.speed));
        }
        match self.track_duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn load(&mut self, path: &Path) -> Result<(), BackendError> {
        self.current = Some(path.to_path_buf());
        self.playing = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = self.fixed_duration.or_else(|| Self::estimate_duration(path));
        Ok(())
    }

    fn play(&mut self) -> Result<(), BackendError> {
        if self.current.is_none() {
            return Err(BackendError::NoMedia);
        }
        if !self.playing {
            self.started_at = Some(Instant::now());
            self.playing = true;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        if self.current.is_none() {
            return Err(BackendError::NoMedia);
        }
        self.position_offset = self.current_position();
        self.started_at = None;
        self.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.current = None;
        self.playing = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = None;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), BackendError> {
        if self.current.is_none() {
            return Err(BackendError::NoMedia);
        }
        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = self.playing.then(Instant::now);
        Ok(())
    }

    fn set_volume(&mut self, _volume: u8) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), BackendError> {
        self.position_offset = self.current_position();
        if self.playing {
            self.started_at = Some(Instant::now());
        }
        self.speed = speed;
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn is_ended(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && self.playing && self.current_position() >= duration
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
