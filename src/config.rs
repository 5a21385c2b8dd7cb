use std::fs;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::errors::{CodeIndexError, Result};

/// Name of the configuration file stored inside a project's settings directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Port used by the HTTP bridge when the deployment flag is set without a port.
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Configuration for an indexed project.
///
/// Controls which files are indexed and how large they may be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Root directory of the project being indexed.
    pub base_path: String,
    /// Glob patterns for files to include during indexing.
    pub include: Vec<String>,
    /// Glob patterns for files to exclude during indexing.
    pub exclude: Vec<String>,
    /// Maximum file size in bytes; files larger than this are skipped.
    pub max_file_size: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let include = [
            "py", "js", "jsx", "ts", "tsx", "java", "kt", "scala", "go", "rs", "c", "h", "cpp",
            "hpp", "cc", "cs", "rb", "php", "swift", "m", "sh", "lua", "zig", "md", "toml",
            "json", "yaml", "yml",
        ]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect();

        Self {
            version: 1,
            base_path: String::new(),
            include,
            exclude: vec![
                ".git/**".to_string(),
                "target/**".to_string(),
                "node_modules/**".to_string(),
                "__pycache__/**".to_string(),
                ".venv/**".to_string(),
                "venv/**".to_string(),
                "dist/**".to_string(),
                "build/**".to_string(),
                "**/*.min.*".to_string(),
            ],
            max_file_size: 1_048_576,
        }
    }
}

/// Loads the project configuration from the given settings directory.
///
/// If the configuration file does not exist, returns a default configuration
/// with `base_path` set to the given project root.
pub fn load_config(settings_dir: &Path, base_path: &str) -> Result<ProjectConfig> {
    let config_path = settings_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(ProjectConfig {
            base_path: base_path.to_string(),
            ..ProjectConfig::default()
        });
    }

    let contents = fs::read_to_string(&config_path).map_err(|e| CodeIndexError::Config {
        message: format!(
            "failed to read config file '{}': {}",
            config_path.display(),
            e
        ),
    })?;

    serde_json::from_str(&contents).map_err(|e| CodeIndexError::Config {
        message: format!(
            "failed to parse config file '{}': {}",
            config_path.display(),
            e
        ),
    })
}

/// Saves the project configuration into the settings directory.
pub fn save_config(settings_dir: &Path, config: &ProjectConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).map_err(|e| CodeIndexError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;
    write_atomic(settings_dir, CONFIG_FILENAME, &json)
}

/// Writes `contents` to `dir/file_name` through a temporary file and a rename,
/// so a partial write never replaces a good file.
pub fn write_atomic(dir: &Path, file_name: &str, contents: &str) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CodeIndexError::Config {
        message: format!(
            "failed to create settings directory '{}': {}",
            dir.display(),
            e
        ),
    })?;

    let final_path = dir.join(file_name);
    let tmp_path = final_path.with_extension("tmp");

    fs::write(&tmp_path, contents).map_err(|e| CodeIndexError::Config {
        message: format!(
            "failed to write temporary file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, &final_path).map_err(|e| CodeIndexError::Config {
        message: format!(
            "failed to rename '{}' to '{}': {}",
            tmp_path.display(),
            final_path.display(),
            e
        ),
    })
}

/// Determines whether a file should be indexed based on the configuration's
/// include and exclude glob patterns.
///
/// A file is included only if it matches at least one include pattern and
/// does not match any exclude pattern. Exclude patterns take precedence.
pub fn should_include_file(file_path: &str, config: &ProjectConfig) -> bool {
    let match_opts = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    for pattern_str in &config.exclude {
        if let Ok(pattern) = Pattern::new(pattern_str) {
            if pattern.matches_with(file_path, match_opts) {
                return false;
            }
        }
    }

    config.include.iter().any(|pattern_str| {
        Pattern::new(pattern_str)
            .map(|pattern| pattern.matches_with(file_path, match_opts))
            .unwrap_or(false)
    })
}

/// Which transport the process serves the protocol on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// Stateless HTTP bridge bound to the given port.
    Http { port: u16 },
}

impl TransportMode {
    /// Selects the transport from the deployment flag and port settings.
    ///
    /// Either one selects HTTP; absence of both selects stdio.
    pub fn select(force_http: bool, deploy_flag: Option<&str>, port: Option<&str>) -> Result<Self> {
        let flagged = force_http || deploy_flag.is_some_and(|v| !v.is_empty());
        let port = port.map(str::trim).filter(|p| !p.is_empty());

        match (flagged, port) {
            (false, None) => Ok(TransportMode::Stdio),
            (_, Some(raw)) => {
                let port = raw.parse::<u16>().map_err(|_| CodeIndexError::Config {
                    message: format!("invalid port '{}'", raw),
                })?;
                Ok(TransportMode::Http { port })
            }
            (true, None) => Ok(TransportMode::Http {
                port: DEFAULT_HTTP_PORT,
            }),
        }
    }
}
