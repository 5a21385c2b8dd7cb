use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A single indexed file, keyed by its project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root, always `/`-separated.
    pub path: String,
    /// Size in bytes at indexing time.
    pub size: u64,
    /// Lower-cased extension without the dot; empty when absent.
    pub extension: String,
    /// Modification time as UNIX seconds.
    pub modified: i64,
}

/// In-memory file index: relative path to entry.
pub type FileIndex = BTreeMap<String, FileEntry>;

/// A cached result set for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIndex {
    /// Absolute project root the result set was produced for.
    pub base_path: String,
    /// UNIX seconds when the result set was last rebuilt or patched.
    pub indexed_at: i64,
    /// The indexed files.
    pub files: Vec<FileEntry>,
}

impl CachedIndex {
    /// Rebuilds a file index from the cached entries.
    pub fn to_file_index(&self) -> FileIndex {
        self.files
            .iter()
            .map(|entry| (entry.path.clone(), entry.clone()))
            .collect()
    }
}

/// Index cache: project key to cached result set.
pub type IndexCache = BTreeMap<String, CachedIndex>;

/// Kinds of capability exposed to protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Resource,
    Tool,
}

impl CapabilityKind {
    /// Returns the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Resource => "resource",
            CapabilityKind::Tool => "tool",
        }
    }
}

/// Computes the hex SHA-256 digest of the given bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Returns the current UNIX timestamp in seconds.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(sha256_hex(b"fn main() {}"), sha256_hex(b"fn main() {}"));
        assert_ne!(sha256_hex(b"a"), sha256_hex(b"b"));
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn test_cached_index_to_file_index() {
        let cached = CachedIndex {
            base_path: "/tmp/project".to_string(),
            indexed_at: 1,
            files: vec![FileEntry {
                path: "src/main.rs".to_string(),
                size: 12,
                extension: "rs".to_string(),
                modified: 1000,
            }],
        };
        let index = cached.to_file_index();
        assert_eq!(index.len(), 1);
        assert_eq!(index["src/main.rs"].size, 12);
    }
}
