//! The long-lived server context shared by every capability invocation.
//!
//! Exactly one `SessionContext` is built per process. It starts unbound (no
//! project), gets a project bound by `set_project_path`, and is torn down once
//! at shutdown: the watcher is stopped and a non-empty index cache is flushed
//! to the settings store.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ignore::WalkBuilder;
use tracing::{debug, error, info, warn};

use crate::config::{should_include_file, ProjectConfig};
use crate::errors::{CodeIndexError, Result};
use crate::settings::{project_key, ProjectSettings};
use crate::types::{current_timestamp, CachedIndex, FileEntry, FileIndex, IndexCache};
use crate::watcher::FileWatcher;

/// Outcome of binding a project to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSummary {
    pub base_path: String,
    pub file_count: usize,
    /// `true` when the index came from the persisted cache.
    pub restored: bool,
    pub watching: bool,
}

/// Process-wide mutable server state.
pub struct SessionContext {
    settings_root: PathBuf,
    base_path: String,
    settings: ProjectSettings,
    project_config: ProjectConfig,
    file_index: FileIndex,
    index_cache: IndexCache,
    watcher: Option<FileWatcher>,
    torn_down: bool,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl SessionContext {
    /// Creates an unbound context whose project settings will live under
    /// `settings_root`.
    pub fn new(settings_root: PathBuf) -> Self {
        let settings = ProjectSettings::new(&settings_root, "");
        Self {
            settings_root,
            base_path: String::new(),
            settings,
            project_config: ProjectConfig::default(),
            file_index: FileIndex::new(),
            index_cache: IndexCache::new(),
            watcher: None,
            torn_down: false,
        }
    }

    /// Binds the session to the project directory at `path`.
    ///
    /// The new binding is prepared in full (settings, config, index) before
    /// anything is committed, so a failure leaves the current binding as it
    /// was. On success the previous project is released (watcher stopped,
    /// cache flushed). The index is restored from the settings store when a
    /// cached result set exists, otherwise rebuilt from disk.
    pub fn bind_project(&mut self, path: &str) -> Result<BindSummary> {
        let requested = Path::new(path);
        if path.trim().is_empty() || !requested.is_dir() {
            return Err(CodeIndexError::NotADirectory {
                path: path.to_string(),
            });
        }
        let canonical = requested.canonicalize()?;
        let base = canonical.to_string_lossy().to_string();

        let settings = ProjectSettings::new(&self.settings_root, &base);
        let project_config = ProjectConfig {
            base_path: base.clone(),
            ..settings.load_config()?
        };
        settings.save_config(&project_config)?;

        let key = project_key(&base);
        let cached = if base == self.base_path && self.index_cache.contains_key(&key) {
            Some(self.index_cache.clone())
        } else {
            load_cached_index(&settings, &key)
        };
        let (file_index, index_cache, restored) = match cached {
            Some(cache) => {
                let index = cache
                    .get(&key)
                    .map(CachedIndex::to_file_index)
                    .unwrap_or_default();
                (index, cache, true)
            }
            None => {
                let index = walk_project(&canonical, &project_config);
                let mut cache = IndexCache::new();
                cache.insert(key, result_set(&base, &index));
                (index, cache, false)
            }
        };

        self.release_project();
        self.settings = settings;
        self.base_path = base.clone();
        self.project_config = project_config;
        self.file_index = file_index;
        self.index_cache = index_cache;

        match FileWatcher::start(&canonical) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!(base_path = %base, "file watcher unavailable: {}", e),
        }

        info!(
            base_path = %base,
            files = self.file_index.len(),
            restored,
            "project bound"
        );

        Ok(BindSummary {
            base_path: base,
            file_count: self.file_index.len(),
            restored,
            watching: self.watcher_running(),
        })
    }

    /// Stops the watcher and flushes the cache of the currently bound project.
    fn release_project(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if !self.index_cache.is_empty() {
            if let Err(e) = self.settings.save_index(&self.index_cache) {
                error!(base_path = %self.base_path, "failed to flush index cache: {}", e);
            }
        }
        self.file_index.clear();
        self.index_cache.clear();
    }

    /// Tears the session down: stops the watcher and flushes a non-empty
    /// index cache. Only the first call does any work.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        if let Some(mut watcher) = self.watcher.take() {
            info!("stopping file watcher");
            watcher.stop();
        }

        if !self.base_path.is_empty() && !self.index_cache.is_empty() {
            info!(base_path = %self.base_path, "saving index cache");
            self.settings.save_index(&self.index_cache)?;
        }
        Ok(())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("session teardown failed: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl SessionContext {
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn project_config(&self) -> &ProjectConfig {
        &self.project_config
    }

    pub fn file_index(&self) -> &FileIndex {
        &self.file_index
    }

    pub fn index_cache(&self) -> &IndexCache {
        &self.index_cache
    }

    pub fn watcher_running(&self) -> bool {
        self.watcher.as_ref().is_some_and(FileWatcher::is_running)
    }

    fn require_base(&self) -> Result<&Path> {
        if self.base_path.is_empty() {
            return Err(CodeIndexError::ProjectNotSet);
        }
        Ok(Path::new(&self.base_path))
    }
}

// ---------------------------------------------------------------------------
// Indexing
// ---------------------------------------------------------------------------

/// Builds an index entry for `rel` from filesystem metadata, or `None` when
/// the file is missing, not a regular file, or filtered out by the config.
fn entry_for(root: &Path, rel: &str, config: &ProjectConfig) -> Option<FileEntry> {
    if !should_include_file(rel, config) {
        return None;
    }
    let metadata = std::fs::metadata(root.join(rel)).ok()?;
    if !metadata.is_file() || metadata.len() > config.max_file_size {
        return None;
    }
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let extension = Path::new(rel)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    Some(FileEntry {
        path: rel.to_string(),
        size: metadata.len(),
        extension,
        modified,
    })
}

/// Walks `root` honouring `.gitignore` and indexes every file the config
/// admits.
fn walk_project(root: &Path, config: &ProjectConfig) -> FileIndex {
    let mut index = FileIndex::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if let Some(file) = entry_for(root, &rel, config) {
            index.insert(rel, file);
        }
    }
    index
}

fn result_set(base_path: &str, index: &FileIndex) -> CachedIndex {
    CachedIndex {
        base_path: base_path.to_string(),
        indexed_at: current_timestamp(),
        files: index.values().cloned().collect(),
    }
}

/// Loads the persisted cache when it holds a result set for `key`.
fn load_cached_index(settings: &ProjectSettings, key: &str) -> Option<IndexCache> {
    match settings.load_index() {
        Ok(Some(cache)) if cache.contains_key(key) => Some(cache),
        Ok(_) => None,
        Err(e) => {
            warn!(base_path = %settings.base_path(), "ignoring unreadable index cache: {}", e);
            None
        }
    }
}

impl SessionContext {
    /// Rebuilds the file index from disk and stores the result set in the
    /// index cache. Returns the number of indexed files.
    pub fn rebuild_index(&mut self) -> Result<usize> {
        let root = self.require_base()?.to_path_buf();
        self.file_index = walk_project(&root, &self.project_config);
        self.store_result_set();
        info!(base_path = %self.base_path, files = self.file_index.len(), "index rebuilt");
        Ok(self.file_index.len())
    }

    /// Applies the changes queued by the watcher to the index. Returns the
    /// number of paths examined.
    pub fn apply_pending_changes(&mut self) -> Result<usize> {
        let changes = match &self.watcher {
            Some(watcher) => watcher.take_changes(),
            None => return Ok(0),
        };
        if changes.is_empty() {
            return Ok(0);
        }
        let root = self.require_base()?.to_path_buf();
        for rel in &changes {
            match entry_for(&root, rel, &self.project_config) {
                Some(file) => {
                    self.file_index.insert(rel.clone(), file);
                }
                None => {
                    self.file_index.remove(rel);
                }
            }
        }
        self.store_result_set();
        debug!(changes = changes.len(), "applied watcher changes");
        Ok(changes.len())
    }

    fn store_result_set(&mut self) {
        if let Some(key) = self.settings.project_key() {
            self.index_cache
                .insert(key, result_set(&self.base_path, &self.file_index));
        }
    }

    /// Removes the project's on-disk settings, stops the watcher and clears
    /// the in-memory index. The project stays bound; nothing is cached again
    /// until the index is rebuilt.
    pub fn clear_settings(&mut self) -> Result<()> {
        self.settings.clear()?;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.file_index.clear();
        self.index_cache.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Returns `true` if following `rel` lexically climbs above its starting point.
fn escapes_root(rel: &Path) -> bool {
    let mut depth: i32 = 0;
    for component in rel.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

impl SessionContext {
    /// Resolves a project-relative path to an existing file inside the
    /// project root.
    pub fn resolve_project_file(&self, rel: &str) -> Result<PathBuf> {
        let root = self.require_base()?;
        let rel_path = Path::new(rel);

        let candidate = root.join(rel_path);
        let canonical = match candidate.canonicalize() {
            Ok(p) => p,
            Err(_) if escapes_root(rel_path) => {
                return Err(CodeIndexError::PathOutsideRoot {
                    path: rel.to_string(),
                })
            }
            Err(_) => {
                return Err(CodeIndexError::FileNotFound {
                    path: rel.to_string(),
                })
            }
        };

        if !canonical.starts_with(root) {
            return Err(CodeIndexError::PathOutsideRoot {
                path: rel.to_string(),
            });
        }
        if !canonical.is_file() {
            return Err(CodeIndexError::FileNotFound {
                path: rel.to_string(),
            });
        }
        Ok(canonical)
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the single session, serializing access across
/// transports.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionContext>>,
}

impl SharedSession {
    pub fn new(context: SessionContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Locks the session, recovering a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, SessionContext> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs the single teardown of the underlying context.
    pub fn shutdown(&self) -> Result<()> {
        self.lock().shutdown()
    }
}
