//! Tool definitions and handlers.
//!
//! Each tool is registered with a JSON Schema for its arguments so MCP
//! clients can discover it through `tools/list`.

use glob::{MatchOptions, Pattern};
use serde_json::{json, Value};

use super::registry::{Capability, CapabilityRegistry};
use crate::errors::{CodeIndexError, Result};
use crate::session::SessionContext;
use crate::types::sha256_hex;

/// Default cap on `search_code` matches.
const DEFAULT_MAX_RESULTS: usize = 100;

/// Longest line excerpt returned by `search_code`.
const MAX_LINE_CHARS: usize = 300;

/// Registers every tool on `registry`.
pub fn register(registry: &mut CapabilityRegistry) -> Result<()> {
    registry.register(Capability::tool(
        "set_project_path",
        "Set the base project directory to index. Restores a cached index when one exists.",
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path of the project directory"
                }
            },
            "required": ["path"]
        }),
        handle_set_project_path,
    ))?;
    registry.register(Capability::tool(
        "refresh_index",
        "Rebuild the file index of the current project from disk.",
        json!({ "type": "object", "properties": {} }),
        handle_refresh_index,
    ))?;
    registry.register(Capability::tool(
        "find_files",
        "Find indexed files whose project-relative path matches a glob pattern.",
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. '*.rs' or 'src/**/test_*.py'"
                }
            },
            "required": ["pattern"]
        }),
        handle_find_files,
    ))?;
    registry.register(Capability::tool(
        "search_code",
        "Search indexed files for lines containing a literal string.",
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Literal text to search for"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case exactly (default: true)"
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Optional glob restricting which files are searched"
                },
                "max_results": {
                    "type": "number",
                    "description": "Maximum number of matches to return (default: 100)"
                }
            },
            "required": ["pattern"]
        }),
        handle_search_code,
    ))?;
    registry.register(Capability::tool(
        "get_file_summary",
        "Summarize a project file: size, line count, extension and content hash.",
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                }
            },
            "required": ["file_path"]
        }),
        handle_get_file_summary,
    ))?;
    registry.register(Capability::tool(
        "get_settings_info",
        "Describe the settings directory, index sizes and watcher state.",
        json!({ "type": "object", "properties": {} }),
        handle_get_settings_info,
    ))?;
    registry.register(Capability::tool(
        "clear_settings",
        "Delete the project's stored settings and cached index.",
        json!({ "type": "object", "properties": {} }),
        handle_clear_settings,
    ))?;
    Ok(())
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CodeIndexError::invalid_params(format!("missing required parameter: {}", key)))
}

fn glob_pattern(raw: &str) -> Result<Pattern> {
    Pattern::new(raw).map_err(|e| CodeIndexError::invalid_params(format!("invalid glob '{}': {}", raw, e)))
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn require_project(ctx: &mut SessionContext) -> Result<()> {
    if ctx.base_path().is_empty() {
        return Err(CodeIndexError::ProjectNotSet);
    }
    ctx.apply_pending_changes()?;
    Ok(())
}

fn handle_set_project_path(ctx: &mut SessionContext, args: Value) -> Result<Value> {
    let path = required_str(&args, "path")?;
    let summary = ctx.bind_project(path)?;
    let source = if summary.restored {
        "restored from cache"
    } else {
        "freshly indexed"
    };
    let watcher = if summary.watching { "active" } else { "inactive" };
    Ok(Value::String(format!(
        "Project path set to: {}. {} files {}. File watcher {}.",
        summary.base_path, summary.file_count, source, watcher
    )))
}

fn handle_refresh_index(ctx: &mut SessionContext, _args: Value) -> Result<Value> {
    let count = ctx.rebuild_index()?;
    Ok(Value::String(format!("Project re-indexed. Found {} files.", count)))
}

fn handle_find_files(ctx: &mut SessionContext, args: Value) -> Result<Value> {
    let pattern = glob_pattern(required_str(&args, "pattern")?)?;
    require_project(ctx)?;

    let files: Vec<&str> = ctx
        .file_index()
        .keys()
        .filter(|path| pattern.matches_with(path, GLOB_OPTIONS))
        .map(String::as_str)
        .collect();
    Ok(json!({ "count": files.len(), "files": files }))
}

fn handle_search_code(ctx: &mut SessionContext, args: Value) -> Result<Value> {
    let needle = required_str(&args, "pattern")?;
    if needle.is_empty() {
        return Err(CodeIndexError::invalid_params("pattern must not be empty"));
    }
    let case_sensitive = args
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let file_filter = match args.get("file_pattern").and_then(Value::as_str) {
        Some(raw) => Some(glob_pattern(raw)?),
        None => None,
    };
    let max_results = args
        .get("max_results")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_MAX_RESULTS);
    require_project(ctx)?;

    let needle = if case_sensitive {
        needle.to_string()
    } else {
        needle.to_lowercase()
    };
    let root = std::path::Path::new(ctx.base_path());
    let mut matches = Vec::new();
    let mut truncated = false;

    'files: for path in ctx.file_index().keys() {
        if let Some(filter) = &file_filter {
            if !filter.matches_with(path, GLOB_OPTIONS) {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(root.join(path)) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            let hit = if case_sensitive {
                line.contains(&needle)
            } else {
                line.to_lowercase().contains(&needle)
            };
            if !hit {
                continue;
            }
            if matches.len() >= max_results {
                truncated = true;
                break 'files;
            }
            let text: String = line.trim().chars().take(MAX_LINE_CHARS).collect();
            matches.push(json!({ "file": path, "line": idx + 1, "text": text }));
        }
    }

    Ok(json!({
        "count": matches.len(),
        "truncated": truncated,
        "matches": matches,
    }))
}

fn handle_get_file_summary(ctx: &mut SessionContext, args: Value) -> Result<Value> {
    let rel = required_str(&args, "file_path")?;
    let path = ctx.resolve_project_file(rel)?;
    let bytes = std::fs::read(&path)?;
    let text = String::from_utf8_lossy(&bytes);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    Ok(json!({
        "file_path": rel,
        "size": bytes.len(),
        "line_count": text.lines().count(),
        "extension": extension,
        "sha256": sha256_hex(&bytes),
        "indexed": ctx.file_index().contains_key(rel),
    }))
}

fn handle_get_settings_info(ctx: &mut SessionContext, _args: Value) -> Result<Value> {
    Ok(json!({
        "base_path": ctx.base_path(),
        "settings": ctx.settings().info(),
        "file_count": ctx.file_index().len(),
        "cached_projects": ctx.index_cache().len(),
        "watcher_active": ctx.watcher_running(),
    }))
}

fn handle_clear_settings(ctx: &mut SessionContext, _args: Value) -> Result<Value> {
    ctx.clear_settings()?;
    Ok(Value::String(
        "Project settings, index, and cache have been cleared. File watcher stopped; \
         use refresh_index or set_project_path to index again."
            .to_string(),
    ))
}
