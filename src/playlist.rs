use crate::model::{Track, TrackMeta};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];
const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Ordered list of tracks. Insertion order is the canonical order.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut playlist = Self::default();
        for track in tracks {
            playlist.add(track);
        }
        playlist
    }

    /// Build a playlist from a directory, an `.m3u`/`.m3u8` file or a single audio file.
    /// Subdirectories are only scanned when `recursive` is set.
    pub fn from_input(path: &Path, recursive: bool) -> Self {
        if path.is_dir() {
            return Self::new(scan_folder(path, recursive));
        }
        if has_extension(path, PLAYLIST_EXTENSIONS) {
            return Self::new(read_m3u(path));
        }
        if path.is_file() && is_audio(path) {
            return Self::new(vec![Track::new(path)]);
        }
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        let normalized = crate::config::normalize_path(path);
        self.tracks.iter().position(|track| track.path == normalized)
    }

    /// Append a track. Adding a track that is already present returns its index instead.
    pub fn add(&mut self, track: Track) -> usize {
        if let Some(existing) = self.tracks.iter().position(|t| *t == track) {
            return existing;
        }
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Insert at `index` (clamped to the end). Returns the index actually used, or the
    /// existing index when the track is already present.
    pub fn insert(&mut self, index: usize, track: Track) -> Result<usize, usize> {
        if let Some(existing) = self.tracks.iter().position(|t| *t == track) {
            return Err(existing);
        }
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Track> {
        (index < self.tracks.len()).then(|| self.tracks.remove(index))
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return false;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        true
    }

    pub fn set_meta(&mut self, index: usize, meta: TrackMeta) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.meta = Some(meta);
        }
    }
}

pub fn scan_folder(root: &Path, recursive: bool) -> Vec<Track> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut tracks: Vec<Track> = walker
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio(entry.path()))
        .map(|entry| Track::new(entry.path()))
        .collect();

    tracks.sort_by(|a, b| a.path.cmp(&b.path));
    tracks.dedup_by(|a, b| a.path == b.path);
    tracks
}

/// Entries of an M3U playlist, resolved against the playlist's folder.
/// Comments, missing files and unsupported formats are skipped.
pub fn read_m3u(path: &Path) -> Vec<Track> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read playlist file");
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&raw);
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    text.lines()
        .map(|line| line.trim().trim_start_matches('\u{feff}'))
        .filter(|entry| !entry.is_empty() && !entry.starts_with('#'))
        .map(|entry| base.join(entry))
        .filter(|item| item.is_file() && is_audio(item))
        .map(Track::new)
        .collect()
}

pub fn is_audio(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    extensions
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}
