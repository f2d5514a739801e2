//! Tag lookup off the playback thread.
//!
//! Results are tagged with the playlist generation they were requested for; the
//! worker drops requests from superseded generations and the session drops any
//! stale result that still slips through.

use crate::model::TrackMeta;
use crate::playlist::Playlist;
use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

pub trait MetadataResolver: Send {
    /// `None` when the file carries no usable tags.
    fn resolve(&mut self, path: &Path) -> Option<TrackMeta>;
}

#[derive(Debug, Default)]
pub struct LoftyResolver;

impl MetadataResolver for LoftyResolver {
    fn resolve(&mut self, path: &Path) -> Option<TrackMeta> {
        let stripped = crate::config::strip_windows_verbatim_prefix(path);
        let tagged_file = match Probe::open(&stripped).and_then(|probe| probe.read()) {
            Ok(tagged_file) => tagged_file,
            Err(err) => {
                debug!(path = %stripped.display(), %err, "no readable tags");
                return None;
            }
        };
        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())?;

        let meta = TrackMeta {
            title: tag.title().as_deref().and_then(clean_value),
            artist: tag.artist().as_deref().and_then(clean_value),
            album: tag.album().as_deref().and_then(clean_value),
        };
        (!meta.is_empty()).then_some(meta)
    }
}

fn clean_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug)]
struct MetadataRequest {
    generation: u64,
    index: usize,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResult {
    pub generation: u64,
    pub index: usize,
    pub path: PathBuf,
    pub meta: Option<TrackMeta>,
}

pub struct MetadataLoader {
    requests: Option<Sender<MetadataRequest>>,
    results: Receiver<MetadataResult>,
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl MetadataLoader {
    pub fn spawn(mut resolver: Box<dyn MetadataResolver>) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<MetadataRequest>();
        let (result_tx, result_rx) = mpsc::channel();
        let generation = Arc::new(AtomicU64::new(0));
        let latest = Arc::clone(&generation);

        let handle = thread::Builder::new()
            .name(String::from("metadata"))
            .spawn(move || {
                let mut cache: HashMap<PathBuf, Option<TrackMeta>> = HashMap::new();
                for request in request_rx {
                    if request.generation < latest.load(Ordering::Acquire) {
                        continue;
                    }
                    let meta = cache
                        .entry(request.path.clone())
                        .or_insert_with(|| resolver.resolve(&request.path))
                        .clone();
                    let result = MetadataResult {
                        generation: request.generation,
                        index: request.index,
                        path: request.path,
                        meta,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                debug!("metadata worker exiting");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            generation,
            handle: Some(handle),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Supersede every outstanding request.
    pub fn begin_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn request(&self, index: usize, path: &Path) {
        let Some(requests) = &self.requests else {
            return;
        };
        let request = MetadataRequest {
            generation: self.generation(),
            index,
            path: path.to_path_buf(),
        };
        if requests.send(request).is_err() {
            warn!("metadata worker is gone");
        }
    }

    /// Start a new generation and queue every track that has no tags yet.
    pub fn request_playlist(&self, playlist: &Playlist) -> u64 {
        let generation = self.begin_generation();
        for (index, track) in playlist.tracks().iter().enumerate() {
            if track.meta.is_none() {
                self.request(index, &track.path);
            }
        }
        generation
    }

    pub fn try_results(&self) -> Vec<MetadataResult> {
        self.results.try_iter().collect()
    }

    /// Pending requests are abandoned; only a lookup already in progress is waited for.
    fn shutdown(&mut self) {
        self.begin_generation();
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetadataLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;
    use std::fs;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    struct TableResolver {
        titles: HashMap<PathBuf, String>,
        lookups: Arc<Mutex<Vec<PathBuf>>>,
        gate: Option<Receiver<()>>,
    }

    impl MetadataResolver for TableResolver {
        fn resolve(&mut self, path: &Path) -> Option<TrackMeta> {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            self.lookups.lock().unwrap().push(path.to_path_buf());
            self.titles.get(path).map(|title| TrackMeta {
                title: Some(title.clone()),
                ..TrackMeta::default()
            })
        }
    }

    fn collect(loader: &MetadataLoader, expected: usize) -> Vec<MetadataResult> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut results = Vec::new();
        while results.len() < expected && Instant::now() < deadline {
            results.extend(loader.try_results());
            thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn resolves_playlist_in_background() {
        let playlist = Playlist::new(vec![Track::new("a.mp3"), Track::new("b.mp3")]);
        let mut titles = HashMap::new();
        titles.insert(Track::new("a.mp3").path, String::from("Alpha"));
        let resolver = TableResolver {
            titles,
            lookups: Arc::default(),
            gate: None,
        };
        let loader = MetadataLoader::spawn(Box::new(resolver)).expect("spawn");
        let generation = loader.request_playlist(&playlist);

        let mut results = collect(&loader, 2);
        results.sort_by_key(|result| result.index);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| result.generation == generation));
        assert_eq!(
            results[0].meta.as_ref().and_then(|meta| meta.title.as_deref()),
            Some("Alpha")
        );
        assert_eq!(results[1].meta, None);
    }

    #[test]
    fn superseded_requests_are_skipped() {
        let (open_gate, gate) = mpsc::channel();
        let lookups = Arc::new(Mutex::new(Vec::new()));
        let resolver = TableResolver {
            titles: HashMap::new(),
            lookups: Arc::clone(&lookups),
            gate: Some(gate),
        };
        let loader = MetadataLoader::spawn(Box::new(resolver)).expect("spawn");
        let old = Playlist::new(vec![Track::new("old-1.mp3"), Track::new("old-2.mp3")]);
        let new = Playlist::new(vec![Track::new("new.mp3")]);

        loader.request_playlist(&old);
        let current = loader.request_playlist(&new);
        open_gate.send(()).expect("release worker");

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut fresh = Vec::new();
        while fresh.is_empty() && Instant::now() < deadline {
            fresh.extend(
                loader
                    .try_results()
                    .into_iter()
                    .filter(|result| result.generation == current),
            );
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].path, Track::new("new.mp3").path);
        assert!(!lookups.lock().unwrap().contains(&Track::new("old-2.mp3").path));
    }

    struct SlowResolver;

    impl MetadataResolver for SlowResolver {
        fn resolve(&mut self, _path: &Path) -> Option<TrackMeta> {
            thread::sleep(Duration::from_millis(20));
            None
        }
    }

    #[test]
    fn drop_abandons_queued_lookups() {
        let loader = MetadataLoader::spawn(Box::new(SlowResolver)).expect("spawn");
        let tracks = (0..100)
            .map(|n| Track::new(format!("track-{n}.mp3")))
            .collect();
        loader.request_playlist(&Playlist::new(tracks));

        let started = Instant::now();
        drop(loader);
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "drop took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn lofty_resolver_ignores_non_audio_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.mp3");
        fs::write(&path, b"not really audio").expect("write");
        assert_eq!(LoftyResolver.resolve(&path), None);
        assert_eq!(LoftyResolver.resolve(&dir.path().join("missing.flac")), None);
    }

    #[test]
    fn clean_value_trims_and_drops_empty() {
        assert_eq!(clean_value("  Song  "), Some(String::from("Song")));
        assert_eq!(clean_value("   "), None);
    }
}
