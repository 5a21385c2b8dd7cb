//! Resource handlers: project configuration, file content, project structure.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::registry::{Capability, CapabilityRegistry};
use crate::errors::{CodeIndexError, Result};
use crate::session::SessionContext;

pub const CONFIG_URI: &str = "config://code-indexer";
pub const FILES_URI_TEMPLATE: &str = "files://{file_path}";
pub const STRUCTURE_URI: &str = "structure://project";

/// Registers every resource on `registry`.
pub fn register(registry: &mut CapabilityRegistry) -> Result<()> {
    registry.register(Capability::resource(
        CONFIG_URI,
        "project_config",
        "Current project configuration and index status.",
        "application/json",
        handle_config,
    )?)?;
    registry.register(Capability::resource(
        FILES_URI_TEMPLATE,
        "file_content",
        "Raw content of a project file. Encode '/' in nested paths as %2F.",
        "text/plain",
        handle_file_content,
    )?)?;
    registry.register(Capability::resource(
        STRUCTURE_URI,
        "project_structure",
        "Directory tree of the indexed project files.",
        "application/json",
        handle_structure,
    )?)?;
    Ok(())
}

fn handle_config(ctx: &mut SessionContext, _params: Value) -> Result<Value> {
    if ctx.base_path().is_empty() {
        return Ok(json!({
            "status": "not_configured",
            "message": "Project path not set. Use set_project_path to choose a project directory first.",
        }));
    }
    ctx.apply_pending_changes()?;
    let settings_directory = ctx
        .settings()
        .settings_dir()
        .map(|d| d.display().to_string());
    Ok(json!({
        "base_path": ctx.base_path(),
        "file_count": ctx.file_index().len(),
        "settings_directory": settings_directory,
        "watcher_active": ctx.watcher_running(),
        "config": ctx.project_config(),
    }))
}

fn handle_file_content(ctx: &mut SessionContext, params: Value) -> Result<Value> {
    let rel = params
        .get("file_path")
        .and_then(Value::as_str)
        .ok_or_else(|| CodeIndexError::invalid_params("missing file path"))?;
    let path = ctx.resolve_project_file(rel)?;
    let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => CodeIndexError::NotUtf8 {
            path: rel.to_string(),
        },
        _ => e.into(),
    })?;
    Ok(Value::String(content))
}

/// A node of the project tree: directories map names to children, files
/// carry their size.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum TreeNode {
    Dir(BTreeMap<String, TreeNode>),
    File(u64),
}

fn insert_path(dir: &mut BTreeMap<String, TreeNode>, parts: &[&str], size: u64) {
    match parts {
        [] => {}
        [name] => {
            dir.insert(name.to_string(), TreeNode::File(size));
        }
        [name, rest @ ..] => {
            let child = dir
                .entry(name.to_string())
                .or_insert_with(|| TreeNode::Dir(BTreeMap::new()));
            if let TreeNode::File(_) = child {
                *child = TreeNode::Dir(BTreeMap::new());
            }
            if let TreeNode::Dir(children) = child {
                insert_path(children, rest, size);
            }
        }
    }
}

fn handle_structure(ctx: &mut SessionContext, _params: Value) -> Result<Value> {
    if ctx.base_path().is_empty() {
        return Err(CodeIndexError::ProjectNotSet);
    }
    ctx.apply_pending_changes()?;

    let mut tree = BTreeMap::new();
    for (path, entry) in ctx.file_index() {
        let parts: Vec<&str> = path.split('/').collect();
        insert_path(&mut tree, &parts, entry.size);
    }
    Ok(json!({ "base_path": ctx.base_path(), "tree": tree }))
}
