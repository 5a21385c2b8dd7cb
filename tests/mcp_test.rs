use std::fs;

use code_index_mcp::errors::{CodeIndexError, Result};
use code_index_mcp::mcp::registry::*;
use code_index_mcp::mcp::transport::*;
use code_index_mcp::mcp::{build_registry, Dispatcher};
use code_index_mcp::session::{SessionContext, SharedSession};
use code_index_mcp::types::CapabilityKind;
use serde_json::{json, Value};
use tempfile::TempDir;

fn echo(_: &mut SessionContext, params: Value) -> Result<Value> {
    Ok(params)
}

fn leaky(_: &mut SessionContext, _: Value) -> Result<Value> {
    Err(CodeIndexError::Io(std::io::Error::other(
        "open /home/alice/.config/secret failed",
    )))
}

fn explodes(_: &mut SessionContext, _: Value) -> Result<Value> {
    panic!("handler bug")
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    }))
    .unwrap()
}

fn dispatcher_with(registry: CapabilityRegistry, dir: &TempDir) -> Dispatcher {
    let session = SharedSession::new(SessionContext::new(dir.path().join("settings")));
    Dispatcher::new(registry, session)
}

/// Dispatcher over the real registry with a bound three-file project.
fn bound_dispatcher(dir: &TempDir) -> Dispatcher {
    let project = dir.path().join("project");
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(project.join("src/main.rs"), "fn main() {\n    run_server();\n}\n").unwrap();
    fs::write(project.join("src/server.rs"), "pub fn run_server() {}\n").unwrap();
    fs::write(project.join("notes.md"), "Run_Server docs\n").unwrap();

    let dispatcher = dispatcher_with(build_registry().unwrap(), dir);
    let response = dispatcher.dispatch(&request(
        1,
        "tools/call",
        json!({"name": "set_project_path", "arguments": {"path": project.to_str().unwrap()}}),
    ));
    assert!(response.error.is_none(), "{:?}", response.error);
    dispatcher
}

fn tool_text(response: &JsonRpcResponse) -> String {
    let result = response.result.as_ref().expect("expected a result");
    result["content"][0]["text"].as_str().unwrap().to_string()
}

#[test]
fn test_build_registry_lists_capabilities() {
    let registry = build_registry().unwrap();
    let tools: Vec<String> = registry
        .tool_definitions()
        .into_iter()
        .map(|t| t.name)
        .collect();
    for name in [
        "set_project_path",
        "refresh_index",
        "find_files",
        "search_code",
        "get_file_summary",
        "get_settings_info",
        "clear_settings",
    ] {
        assert!(tools.iter().any(|t| t == name), "missing tool {}", name);
    }

    let fixed = registry.resource_definitions(false);
    assert!(fixed.iter().any(|r| r.uri.as_deref() == Some("config://code-indexer")));
    let templates = registry.resource_definitions(true);
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].uri_template.as_deref(), Some("files://{file_path}"));
}

#[test]
fn test_tool_definitions_have_object_schemas() {
    for tool in build_registry().unwrap().tool_definitions() {
        assert_eq!(tool.input_schema["type"], "object", "tool {}", tool.name);
    }
}

#[test]
fn test_register_rejects_duplicates() {
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::tool("find_files", "", json!({}), echo))
        .unwrap();
    assert!(matches!(
        registry.register(Capability::tool("find_files", "", json!({}), echo)),
        Err(CodeIndexError::DuplicateCapability { .. })
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_register_rejects_overlapping_templates() {
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::resource("files://{file_path}", "a", "", "text/plain", echo).unwrap())
        .unwrap();
    assert!(matches!(
        registry.register(Capability::resource("files://{other}", "b", "", "text/plain", echo).unwrap()),
        Err(CodeIndexError::AmbiguousCapability { .. })
    ));
    assert!(matches!(
        registry.register(Capability::resource("files://README", "c", "", "text/plain", echo).unwrap()),
        Err(CodeIndexError::AmbiguousCapability { .. })
    ));
    registry
        .register(Capability::resource("files://{dir}/{name}", "d", "", "text/plain", echo).unwrap())
        .unwrap();
}

#[test]
fn test_resolve_unknown_capability() {
    let registry = build_registry().unwrap();
    assert!(matches!(
        registry.resolve("tools://nothing"),
        Err(CodeIndexError::UnknownCapability { .. })
    ));
    let resolved = registry.resolve("files://src%2Flib.rs").unwrap();
    assert_eq!(resolved.capability.kind, CapabilityKind::Resource);
    assert_eq!(resolved.captures["file_path"], json!("src/lib.rs"));
}

#[test]
fn test_dispatch_unknown_method_keeps_id() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher_with(build_registry().unwrap(), &dir);

    let response = dispatcher.dispatch(&request(9, "does/not/exist", json!({})));
    assert_eq!(response.id, json!(9));
    assert_eq!(response.error.unwrap().code, -32601);

    let response = dispatcher.dispatch(&request(10, "tools/call", json!({"name": "nope"})));
    assert_eq!(response.id, json!(10));
    assert_eq!(response.error.unwrap().code, -32601);
}

#[test]
fn test_dispatch_missing_params_is_invalid_params() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher_with(build_registry().unwrap(), &dir);
    let response = dispatcher.dispatch(&request(3, "resources/read", json!({})));
    assert_eq!(response.error.unwrap().code, -32602);
}

#[test]
fn test_dispatch_direct_method_passes_params_and_captures() {
    let dir = TempDir::new().unwrap();
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::resource("notes://{topic}", "notes", "", "application/json", echo).unwrap())
        .unwrap();
    registry
        .register(Capability::tool("echo", "", json!({"type": "object"}), echo))
        .unwrap();
    let dispatcher = dispatcher_with(registry, &dir);

    let response = dispatcher.dispatch(&request(1, "echo", json!({"a": 1})));
    let text = tool_text(&response);
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"a": 1}));

    let response = dispatcher.dispatch(&request(2, "resources/read", json!({"uri": "notes://rust"})));
    let result = response.result.unwrap();
    assert_eq!(result["contents"][0]["uri"], "notes://rust");
    let body: Value = serde_json::from_str(result["contents"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["topic"], "rust");
}

#[test]
fn test_dispatch_sanitizes_system_errors() {
    let dir = TempDir::new().unwrap();
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::tool("leaky", "", json!({}), leaky))
        .unwrap();
    let dispatcher = dispatcher_with(registry, &dir);

    let response = dispatcher.dispatch(&request(4, "tools/call", json!({"name": "leaky"})));
    let error = response.error.unwrap();
    assert_eq!(error.code, -32603);
    assert!(!error.message.contains("alice"));
    assert_eq!(dispatcher.stats().errors(), 1);
}

#[test]
fn test_dispatch_contains_handler_panics() {
    let dir = TempDir::new().unwrap();
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::tool("explodes", "", json!({}), explodes))
        .unwrap();
    registry
        .register(Capability::tool("echo", "", json!({}), echo))
        .unwrap();
    let dispatcher = dispatcher_with(registry, &dir);

    let response = dispatcher.dispatch(&request(5, "tools/call", json!({"name": "explodes"})));
    let error = response.error.unwrap();
    assert_eq!(error.code, -32603);
    assert_eq!(error.message, "internal error while handling tools/call");

    let response = dispatcher.dispatch(&request(6, "tools/call", json!({"name": "echo"})));
    assert!(response.error.is_none());
}

#[test]
fn test_tools_require_bound_project() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher_with(build_registry().unwrap(), &dir);
    let response = dispatcher.dispatch(&request(
        1,
        "tools/call",
        json!({"name": "find_files", "arguments": {"pattern": "*.rs"}}),
    ));
    let error = response.error.unwrap();
    assert_eq!(error.code, -32000);
    assert!(error.message.contains("set_project_path"));
}

#[test]
fn test_config_resource_before_and_after_binding() {
    let dir = TempDir::new().unwrap();
    let unbound = dispatcher_with(build_registry().unwrap(), &dir);
    let response = unbound.dispatch(&request(1, "resources/read", json!({"uri": "config://code-indexer"})));
    let text = response.result.unwrap()["contents"][0]["text"].as_str().unwrap().to_string();
    assert!(text.contains("not_configured"));

    let dir = TempDir::new().unwrap();
    let bound = bound_dispatcher(&dir);
    let response = bound.dispatch(&request(2, "resources/read", json!({"uri": "config://code-indexer"})));
    let text = response.result.unwrap()["contents"][0]["text"].as_str().unwrap().to_string();
    let config: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(config["file_count"], 3);
}

#[test]
fn test_files_resource_reads_nested_path() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);
    let response = dispatcher.dispatch(&request(
        2,
        "resources/read",
        json!({"uri": "files://src%2Fserver.rs"}),
    ));
    let result = response.result.unwrap();
    assert_eq!(result["contents"][0]["text"], "pub fn run_server() {}\n");
    assert_eq!(result["contents"][0]["mimeType"], "text/plain");
}

#[test]
fn test_files_resource_rejects_escape_and_missing() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);

    let response = dispatcher.dispatch(&request(
        3,
        "resources/read",
        json!({"uri": "files://..%2F..%2Fetc%2Fpasswd"}),
    ));
    let error = response.error.unwrap();
    assert_eq!(error.code, -32000);
    assert!(error.message.contains("outside the project root"));

    let response = dispatcher.dispatch(&request(
        4,
        "resources/read",
        json!({"uri": "files://missing.rs"}),
    ));
    assert!(response.error.unwrap().message.contains("file not found"));
}

#[test]
fn test_files_resource_reports_binary_content() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);
    fs::write(dir.path().join("project/blob.bin"), [0xffu8, 0xfe, 0x00, 0x81]).unwrap();

    let response = dispatcher.dispatch(&request(
        5,
        "resources/read",
        json!({"uri": "files://blob.bin"}),
    ));
    let error = response.error.unwrap();
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "file is not valid UTF-8: blob.bin");
}

#[test]
fn test_find_files_and_search_code() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);

    let response = dispatcher.dispatch(&request(
        5,
        "tools/call",
        json!({"name": "find_files", "arguments": {"pattern": "*.rs"}}),
    ));
    let found: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(found["files"], json!(["src/main.rs", "src/server.rs"]));

    let response = dispatcher.dispatch(&request(
        6,
        "tools/call",
        json!({"name": "search_code", "arguments": {"pattern": "run_server"}}),
    ));
    let hits: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(hits["count"], 2);
    assert_eq!(hits["matches"][0]["file"], "src/main.rs");
    assert_eq!(hits["matches"][0]["line"], 2);

    let response = dispatcher.dispatch(&request(
        7,
        "tools/call",
        json!({"name": "search_code", "arguments": {
            "pattern": "run_server", "case_sensitive": false, "max_results": 2
        }}),
    ));
    let hits: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(hits["count"], 2);
    assert_eq!(hits["truncated"], true);

    let response = dispatcher.dispatch(&request(
        8,
        "tools/call",
        json!({"name": "search_code", "arguments": {
            "pattern": "run_server", "case_sensitive": false, "file_pattern": "*.md"
        }}),
    ));
    let hits: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(hits["count"], 1);
    assert_eq!(hits["matches"][0]["file"], "notes.md");
}

#[test]
fn test_get_file_summary() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);
    let response = dispatcher.dispatch(&request(
        9,
        "tools/call",
        json!({"name": "get_file_summary", "arguments": {"file_path": "src/main.rs"}}),
    ));
    let summary: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(summary["line_count"], 3);
    assert_eq!(summary["extension"], "rs");
    assert_eq!(summary["indexed"], true);
    assert_eq!(summary["sha256"].as_str().unwrap().len(), 64);
}

#[test]
fn test_structure_resource() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);
    let response = dispatcher.dispatch(&request(
        10,
        "resources/read",
        json!({"uri": "structure://project"}),
    ));
    let text = response.result.unwrap()["contents"][0]["text"].as_str().unwrap().to_string();
    let structure: Value = serde_json::from_str(&text).unwrap();
    assert!(structure["tree"]["src"]["main.rs"].is_number());
    assert!(structure["tree"]["notes.md"].is_number());
}

#[test]
fn test_settings_info_and_clear() {
    let dir = TempDir::new().unwrap();
    let dispatcher = bound_dispatcher(&dir);
    let response = dispatcher.dispatch(&request(
        11,
        "tools/call",
        json!({"name": "get_settings_info"}),
    ));
    let info: Value = serde_json::from_str(&tool_text(&response)).unwrap();
    assert_eq!(info["file_count"], 3);
    assert_eq!(info["settings"]["config_file"], true);

    let response = dispatcher.dispatch(&request(12, "tools/call", json!({"name": "clear_settings"})));
    assert!(tool_text(&response).contains("cleared"));
    assert!(dispatcher.session().lock().file_index().is_empty());
}
