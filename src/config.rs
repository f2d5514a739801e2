use crate::model::RepeatMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "rhythm-slicer";
const SETTINGS_FILE: &str = "config.json";
const LOG_DIR: &str = "logs";

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 3.0;
/// The hang threshold never drops below this many tick periods.
const MIN_THRESHOLD_TICKS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub last_open_path: Option<PathBuf>,
    pub volume: u8,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub speed: f32,
    pub tick_interval_ms: u64,
    pub hang_threshold_ms: u64,
    pub watchdog_poll_ms: u64,
    pub seek_step_seconds: u16,
    pub volume_step: u8,
    pub skip_unplayable: bool,
    pub open_recursive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_open_path: None,
            volume: 100,
            repeat_mode: RepeatMode::Off,
            shuffle: false,
            speed: 1.0,
            tick_interval_ms: 200,
            hang_threshold_ms: 15_000,
            watchdog_poll_ms: 1_000,
            seek_step_seconds: 5,
            volume_step: 5,
            skip_unplayable: true,
            open_recursive: false,
        }
    }
}

impl Settings {
    /// Clamp every field into the range the player accepts.
    pub fn sanitized(mut self) -> Self {
        self.volume = self.volume.min(100);
        self.speed = clamp_speed(self.speed);
        self.tick_interval_ms = self.tick_interval_ms.clamp(50, 1_000);
        self.hang_threshold_ms = self
            .hang_threshold_ms
            .max(1_000)
            .max(self.tick_interval_ms * MIN_THRESHOLD_TICKS);
        self.watchdog_poll_ms = self.watchdog_poll_ms.clamp(50, 10_000);
        self.seek_step_seconds = self.seek_step_seconds.clamp(1, 600);
        self.volume_step = self.volume_step.clamp(1, 50);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn hang_threshold(&self) -> Duration {
        Duration::from_millis(self.hang_threshold_ms)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_millis(self.watchdog_poll_ms)
    }
}

/// Clamp a playback rate into `MIN_SPEED..=MAX_SPEED`; non-finite input means normal speed.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("RHYTHM_SLICER_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME")
        && !xdg.trim().is_empty()
    {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn log_dir() -> Result<PathBuf> {
    Ok(config_root()?.join(LOG_DIR))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_settings() -> Result<Settings> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings.sanitized())
}

/// Load settings, logging and falling back to defaults when the file is unusable.
pub fn load_settings_or_default() -> Settings {
    match load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!("using default settings: {err:#}");
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    ensure_config_dir()?;
    let path = settings_path()?;
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    strip_windows_verbatim_prefix(&canonical)
}

pub fn strip_windows_verbatim_prefix(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();

    if let Some(trimmed) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{trimmed}"));
    }

    if let Some(trimmed) = raw.strip_prefix(r"\\?\") {
        return PathBuf::from(trimmed);
    }

    path.to_path_buf()
}
