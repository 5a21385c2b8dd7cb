//! On-disk project settings: configuration and the persisted index cache.
//!
//! Each project gets its own directory under the settings root, named by a
//! short hash of the project's absolute path, so several projects can share
//! one root without colliding.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{self, ProjectConfig, CONFIG_FILENAME};
use crate::errors::{CodeIndexError, Result};
use crate::types::{sha256_hex, IndexCache};

/// Name of the directory created under the settings root.
pub const SETTINGS_DIR_NAME: &str = "code_indexer";

/// Name of the persisted index cache file.
pub const INDEX_CACHE_FILENAME: &str = "index_cache.json";

/// Returns the default settings root: the platform cache directory, or the
/// system temp directory when there is none.
pub fn default_settings_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(SETTINGS_DIR_NAME)
}

/// Computes the project key for an absolute base path.
pub fn project_key(base_path: &str) -> String {
    sha256_hex(base_path.as_bytes())[..16].to_string()
}

/// Settings handle for a single project.
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    base_path: String,
    settings_dir: Option<PathBuf>,
}

impl ProjectSettings {
    /// Creates a handle for `base_path` under `root`.
    ///
    /// An empty base path yields a placeholder that never touches the disk.
    pub fn new(root: &Path, base_path: &str) -> Self {
        let settings_dir = if base_path.is_empty() {
            None
        } else {
            Some(root.join(project_key(base_path)))
        };
        Self {
            base_path: base_path.to_string(),
            settings_dir,
        }
    }

    /// Returns `true` if this handle is the unbound placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.settings_dir.is_none()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn settings_dir(&self) -> Option<&Path> {
        self.settings_dir.as_deref()
    }

    /// Returns the project key, or `None` for the placeholder.
    pub fn project_key(&self) -> Option<String> {
        (!self.is_placeholder()).then(|| project_key(&self.base_path))
    }

    fn require_dir(&self) -> Result<&Path> {
        self.settings_dir().ok_or(CodeIndexError::ProjectNotSet)
    }

    /// Loads the project configuration, falling back to defaults.
    pub fn load_config(&self) -> Result<ProjectConfig> {
        match self.settings_dir() {
            Some(dir) => config::load_config(dir, &self.base_path),
            None => Ok(ProjectConfig::default()),
        }
    }

    pub fn save_config(&self, project_config: &ProjectConfig) -> Result<()> {
        config::save_config(self.require_dir()?, project_config)
    }

    /// Persists the index cache. A no-op for the placeholder.
    pub fn save_index(&self, cache: &IndexCache) -> Result<()> {
        let Some(dir) = self.settings_dir() else {
            debug!("placeholder settings, index cache not saved");
            return Ok(());
        };
        let json = serde_json::to_string(cache)?;
        config::write_atomic(dir, INDEX_CACHE_FILENAME, &json)?;
        info!(
            path = %dir.join(INDEX_CACHE_FILENAME).display(),
            projects = cache.len(),
            "saved index cache"
        );
        Ok(())
    }

    /// Loads the persisted index cache, `None` if nothing was saved.
    pub fn load_index(&self) -> Result<Option<IndexCache>> {
        let Some(dir) = self.settings_dir() else {
            return Ok(None);
        };
        let path = dir.join(INDEX_CACHE_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Removes the project's settings directory. Missing is fine.
    pub fn clear(&self) -> Result<()> {
        let dir = self.require_dir()?;
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(path = %dir.display(), "cleared project settings");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Describes the settings directory and which files it holds.
    pub fn info(&self) -> Value {
        match self.settings_dir() {
            None => json!({ "configured": false }),
            Some(dir) => json!({
                "configured": true,
                "base_path": self.base_path,
                "settings_directory": dir.display().to_string(),
                "exists": dir.exists(),
                "config_file": dir.join(CONFIG_FILENAME).exists(),
                "index_cache_file": dir.join(INDEX_CACHE_FILENAME).exists(),
            }),
        }
    }
}
