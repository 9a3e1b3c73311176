//! Video cache and background download manager.
//!
//! Reconciles the feed catalog against the on-disk cache directory, then
//! fetches missing items one at a time on a single background thread by
//! driving the external downloader. The UI thread only ever performs
//! non-blocking reads through [`VideoCache`]; all writes to the cache
//! directory and to the in-memory index happen on the worker thread.

use crate::cmd;
use crate::config::Config;
use crate::feed::{FeedItem, VideoFeed};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Feed sources whose items we know how to download and reconcile.
const KNOWN_SOURCES: [&str; 1] = ["yt"];

/// Extensions the downloader leaves behind for a complete file.
const COMPLETE_EXTENSIONS: [&str; 2] = ["mp4", "mkv"];
/// Extension of an in-progress download. Owned by the downloader tool.
const PARTIAL_EXTENSION: &str = "part";

const CHILD_POLL_INTERVAL_MS: u64 = 100;

/// Decide whether a complete cached file exists for `item_id`.
///
/// Scans `cache_dir` for files named `<item_id>.<ext>`, tolerating the
/// leftovers of interrupted downloads:
/// - exactly one match with a `.mp4`/`.mkv` extension is the cached file;
/// - a single `.part` file is an in-progress marker, not a result;
/// - anything else (unfamiliar extension, or two or more matches) is treated
///   as not cached, so we re-download rather than serve the wrong file.
pub fn reconcile_item(cache_dir: &Path, item_id: &str) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                "failed to scan video cache directory {}: {err}",
                cache_dir.display()
            );
            return None;
        }
    };

    let prefix = format!("{item_id}.");
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();

    if matches.len() > 1 {
        matches.sort();
        warn!(
            "multiple cache files for {item_id}, ignoring all of them: {}",
            matches
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return None;
    }

    let path = matches.pop()?;
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if COMPLETE_EXTENSIONS.contains(&ext) => Some(path),
        Some(PARTIAL_EXTENSION) => {
            // The downloader will pick the partial file up and finish it.
            debug!("partial download for {item_id}: {}", path.display());
            None
        }
        _ => {
            warn!(
                "unfamiliar file extension on cached video file: {}",
                path.display()
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillPhase {
    Idle,
    Filling,
    Cancelling,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, Option<PathBuf>>,
    active_id: Option<String>,
    phase: FillPhase,
}

/// The one cache object the UI touches.
///
/// Construction reconciles every feed item against the cache directory and,
/// when the auto-fill toggle is on and a downloader was resolved, starts
/// filling in the background. All accessors are non-blocking snapshot reads
/// and are safe to call from a UI timer.
pub struct VideoCache {
    cache_dir: PathBuf,
    downloader: Option<PathBuf>,
    feed: Arc<VideoFeed>,
    state: Arc<Mutex<CacheState>>,
    cancel: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

impl VideoCache {
    pub fn new(config: &Config, feed: Arc<VideoFeed>) -> VideoCache {
        let cache_dir = config.video_cache_directory.clone();
        let dir_exists = cache_dir.is_dir();
        if !dir_exists {
            warn!(
                "video cache directory does not exist: {}; downloads disabled",
                cache_dir.display()
            );
        }

        let mut entries = HashMap::new();
        for item in feed.items.iter() {
            if !KNOWN_SOURCES.contains(&item.source()) {
                // Reconciliation is keyed on the id alone, so the item still
                // gets a cache entry; only the downloader choice assumes a
                // known source.
                warn!(
                    "unrecognized feed video source {:?} for {}",
                    item.source(),
                    item.id
                );
            }
            let path = if dir_exists {
                reconcile_item(&cache_dir, &item.id)
            } else {
                None
            };
            entries.insert(item.id.clone(), path);
        }

        let cache = VideoCache {
            cache_dir,
            // Without a cache directory there is nowhere to download to.
            downloader: if dir_exists {
                config.downloader.clone()
            } else {
                None
            },
            feed,
            state: Arc::new(Mutex::new(CacheState {
                entries,
                active_id: None,
                phase: FillPhase::Idle,
            })),
            cancel: Arc::new(AtomicBool::new(false)),
            child: Arc::new(Mutex::new(None)),
        };

        if dir_exists && config.update_video_cache && !cache.is_complete() {
            if cache.downloader.is_some() {
                cache.start_filling_cache();
            } else {
                warn!("no video downloader found; unable to auto-populate the video cache");
            }
        }

        cache
    }

    /// Snapshot of the cache index: item id to the cached file, if any.
    /// A present path is the precondition for playback.
    pub fn cached_downloads(&self) -> HashMap<String, Option<PathBuf>> {
        self.state.lock().unwrap().entries.clone()
    }

    /// The cached file for one item, if it is available.
    pub fn cached_path(&self, item_id: &str) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(item_id)
            .cloned()
            .flatten()
    }

    /// The item whose downloader process is currently running, if any.
    pub fn active_download_id(&self) -> Option<String> {
        self.state.lock().unwrap().active_id.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .entries
            .values()
            .all(|entry| entry.is_some())
    }

    /// True while a fill (or its cancellation) is still in flight.
    pub fn is_filling(&self) -> bool {
        self.state.lock().unwrap().phase != FillPhase::Idle
    }

    /// Start downloading every currently-missing item, in feed order.
    ///
    /// Idempotent: a no-op when a fill is already running, when nothing is
    /// missing, or when no downloader is configured. The missing-item queue
    /// is captured here and not recomputed while the fill runs.
    pub fn start_filling_cache(&self) {
        let Some(downloader) = self.downloader.clone() else {
            warn!("no video downloader configured; cache will not be filled");
            return;
        };

        let queue: Vec<FeedItem> = {
            let mut state = self.state.lock().unwrap();
            if state.phase != FillPhase::Idle {
                return;
            }
            let queue: Vec<FeedItem> = self
                .feed
                .items
                .iter()
                .filter(|item| state.entries.get(&item.id).is_none_or(|e| e.is_none()))
                .cloned()
                .collect();
            if queue.is_empty() {
                return;
            }
            state.phase = FillPhase::Filling;
            self.cancel.store(false, Ordering::SeqCst);
            queue
        };

        let worker = DownloadWorker {
            cache_dir: self.cache_dir.clone(),
            downloader,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            child: self.child.clone(),
        };
        thread::spawn(move || worker.run(queue));
    }

    /// Stop background filling: no further queue items are started, and any
    /// in-flight downloader process is killed immediately.
    ///
    /// Returns without waiting for the worker thread to unwind, so teardown
    /// latency is bounded by kill latency. A no-op when nothing is running.
    pub fn stop_download(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if state.phase == FillPhase::Filling {
                state.phase = FillPhase::Cancelling;
            }
        }

        let mut slot = self.child.lock().unwrap();
        if let Some(child) = slot.as_mut() {
            info!("stopping active video download");
            cmd::kill_tree(child);
            *slot = None;
        }
    }
}

/// Serial download loop. Lives on its own thread; at most one exists per
/// [`VideoCache`] at a time, and it blocks on at most one child process.
struct DownloadWorker {
    cache_dir: PathBuf,
    downloader: PathBuf,
    state: Arc<Mutex<CacheState>>,
    cancel: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

impl DownloadWorker {
    fn run(self, queue: Vec<FeedItem>) {
        for item in &queue {
            if self.cancel.load(Ordering::SeqCst) {
                debug!("cache fill cancelled before {}", item.id);
                break;
            }
            self.download_one(item);
        }

        let mut state = self.state.lock().unwrap();
        state.active_id = None;
        state.phase = FillPhase::Idle;
    }

    fn download_one(&self, item: &FeedItem) {
        info!("downloading {}", item.name);

        let mut command = cmd::command(&self.downloader);
        command.args(downloader_args(&self.cache_dir, item));
        let spawned = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to start downloader for {}: {err}", item.id);
                return;
            }
        };

        {
            let mut slot = self.child.lock().unwrap();
            if self.cancel.load(Ordering::SeqCst) {
                // stop_download() ran between spawn and publication; it had
                // no handle to kill, so the child is ours to clean up.
                let mut child = spawned;
                cmd::kill_tree(&mut child);
                return;
            }
            *slot = Some(spawned);
        }
        self.state.lock().unwrap().active_id = Some(item.id.clone());

        let success = self.wait_for_child(&item.id);

        let mut state = self.state.lock().unwrap();
        state.active_id = None;
        if success {
            let path = reconcile_item(&self.cache_dir, &item.id);
            if path.is_none() {
                warn!(
                    "downloader reported success for {} but no usable file was found",
                    item.id
                );
            }
            state.entries.insert(item.id.clone(), path);
        }
    }

    /// Poll the published child until it exits. Returns whether it exited
    /// with success. The child slot being emptied from outside means
    /// `stop_download()` killed and reaped it.
    fn wait_for_child(&self, item_id: &str) -> bool {
        loop {
            {
                let mut slot = self.child.lock().unwrap();
                let Some(child) = slot.as_mut() else {
                    return false;
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        *slot = None;
                        if !status.success() {
                            warn!("download failed for {item_id} ({status}); leaving it uncached");
                        }
                        return status.success();
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("lost track of downloader process for {item_id}: {err}");
                        cmd::kill_tree(child);
                        *slot = None;
                        return false;
                    }
                }
            }
            thread::sleep(Duration::from_millis(CHILD_POLL_INTERVAL_MS));
        }
    }
}

/// Arguments for one downloader invocation.
///
/// The output template embeds the item id so [`reconcile_item`] finds the
/// result whatever container the tool picks, and the tool's own download
/// archive is redirected to the discard path so every invocation is
/// self-contained.
fn downloader_args(cache_dir: &Path, item: &FeedItem) -> Vec<OsString> {
    let template = cache_dir.join(format!("{}.%(ext)s", item.id));
    vec![
        OsString::from("--quiet"),
        OsString::from("--output"),
        template.into_os_string(),
        OsString::from("--download-archive"),
        cmd::discard_path().as_os_str().to_os_string(),
        OsString::from(&item.url),
    ]
}
