//! Recursive filesystem watcher feeding changed paths back into the index.
//!
//! The OS watcher runs on notify's own thread; events are reduced to
//! project-relative paths and queued until the session drains them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use crate::errors::Result;

/// Path segments that produce high-churn events and are always skipped.
const SKIP_SEGMENTS: &[&str] = &[
    "/.git/",
    "/node_modules/",
    "/target/",
    "/__pycache__/",
    "/.venv/",
];

/// Returns the `/`-separated path of `path` relative to `root`, or `None`
/// when the path is outside the root or inside a skipped directory.
fn relative_change(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy().replace('\\', "/");
    if rel.is_empty() {
        return None;
    }
    let padded = format!("/{}/", rel);
    if SKIP_SEGMENTS.iter().any(|seg| padded.contains(seg)) {
        return None;
    }
    Some(rel)
}

/// Handle owning a running watcher.
pub struct FileWatcher {
    root: PathBuf,
    pending: Arc<Mutex<BTreeSet<String>>>,
    watcher: Option<RecommendedWatcher>,
}

impl FileWatcher {
    /// Starts watching `root` recursively.
    pub fn start(root: &Path) -> Result<Self> {
        let root = root.to_path_buf();
        let pending = Arc::new(Mutex::new(BTreeSet::new()));

        let sink = Arc::clone(&pending);
        let event_root = root.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            return;
                        }
                        let mut queue = sink.lock().unwrap_or_else(|e| e.into_inner());
                        for path in &event.paths {
                            if let Some(rel) = relative_change(&event_root, path) {
                                debug!(path = %rel, "queued change");
                                queue.insert(rel);
                            }
                        }
                    }
                    Err(e) => error!("file watcher error: {}", e),
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "file watcher started");

        Ok(Self {
            root,
            pending,
            watcher: Some(watcher),
        })
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stops the watcher and drops the OS handle. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!(root = %self.root.display(), "file watcher stopped");
        }
    }

    /// Drains the queued changed paths.
    pub fn take_changes(&self) -> Vec<String> {
        let mut queue = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *queue).into_iter().collect()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
