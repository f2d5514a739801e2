//! Deterministic backend for tests and fuzzing.
//!
//! Nothing moves on its own: position, duration and end-of-stream are set from
//! the [`ScriptHandle`], and individual calls can be told to fail or stall.

use super::Backend;
use crate::error::BackendError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Script {
    loaded: Option<PathBuf>,
    playing: bool,
    position: Duration,
    duration: Option<Duration>,
    ended: bool,
    volume: u8,
    speed: f32,
    unloadable: HashSet<PathBuf>,
    failures: HashMap<&'static str, u32>,
    stalls: HashMap<&'static str, Duration>,
    calls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_load(&self, path: impl AsRef<Path>) {
        self.lock()
            .unloadable
            .insert(crate::config::normalize_path(path.as_ref()));
    }

    /// Make the next `times` calls to `op` (e.g. `"seek"`) fail.
    pub fn fail_next(&self, op: &'static str, times: u32) {
        self.lock().failures.insert(op, times);
    }

    /// Make every call to `op` sleep for `delay` before returning.
    pub fn stall(&self, op: &'static str, delay: Duration) {
        self.lock().stalls.insert(op, delay);
    }

    pub fn set_position(&self, position: Duration) {
        self.lock().position = position;
    }

    pub fn set_duration(&self, duration: Option<Duration>) {
        self.lock().duration = duration;
    }

    pub fn set_ended(&self, ended: bool) {
        self.lock().ended = ended;
    }

    pub fn loaded(&self) -> Option<PathBuf> {
        self.lock().loaded.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn volume(&self) -> u8 {
        self.lock().volume
    }

    pub fn speed(&self) -> f32 {
        self.lock().speed
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .count()
    }
}

pub struct ScriptedBackend {
    handle: ScriptHandle,
}

impl ScriptedBackend {
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        {
            let mut script = handle.lock();
            script.volume = 100;
            script.speed = 1.0;
        }
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    fn enter(&self, op: &'static str, detail: String) -> Result<MutexGuard<'_, Script>, BackendError> {
        let stall = self.handle.lock().stalls.get(op).copied();
        if let Some(delay) = stall {
            thread::sleep(delay);
        }
        let mut script = self.handle.lock();
        script.calls.push(if detail.is_empty() {
            op.to_string()
        } else {
            format!("{op} {detail}")
        });
        if let Some(remaining) = script.failures.get_mut(op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(BackendError::Rejected {
                op,
                reason: String::from("scripted failure"),
            });
        }
        Ok(script)
    }
}

impl Backend for ScriptedBackend {
    fn load(&mut self, path: &Path) -> Result<(), BackendError> {
        let mut script = self.enter("load", path.display().to_string())?;
        if script.unloadable.contains(path) {
            script.loaded = None;
            script.playing = false;
            return Err(BackendError::Load {
                path: path.to_path_buf(),
                reason: String::from("unreadable file"),
            });
        }
        script.loaded = Some(path.to_path_buf());
        script.playing = false;
        script.position = Duration::ZERO;
        script.ended = false;
        Ok(())
    }

    fn play(&mut self) -> Result<(), BackendError> {
        let mut script = self.enter("play", String::new())?;
        if script.loaded.is_none() {
            return Err(BackendError::NoMedia);
        }
        script.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        let mut script = self.enter("pause", String::new())?;
        script.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        let mut script = self.enter("stop", String::new())?;
        script.loaded = None;
        script.playing = false;
        script.position = Duration::ZERO;
        script.ended = false;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), BackendError> {
        let mut script = self.enter("seek", format!("{}ms", position.as_millis()))?;
        if script.loaded.is_none() {
            return Err(BackendError::NoMedia);
        }
        script.position = position;
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), BackendError> {
        let mut script = self.enter("set_volume", volume.to_string())?;
        script.volume = volume;
        Ok(())
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), BackendError> {
        let mut script = self.enter("set_speed", speed.to_string())?;
        script.speed = speed;
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        let script = self.handle.lock();
        script.loaded.as_ref()?;
        Some(script.position)
    }

    fn duration(&self) -> Option<Duration> {
        let script = self.handle.lock();
        script.loaded.as_ref()?;
        script.duration
    }

    fn is_ended(&self) -> bool {
        let script = self.handle.lock();
        script.loaded.is_some() && script.ended
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
