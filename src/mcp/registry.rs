//! Capability registry: identifiers mapped to handlers.
//!
//! Identifiers are either exact strings (tool names, fixed resource URIs) or
//! URI templates such as `files://{file_path}`. A template placeholder
//! captures exactly one `/`-delimited segment. Registration rejects any
//! identifier that could match the same input as one already registered, so
//! resolution never depends on registration order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CodeIndexError, Result};
use crate::session::SessionContext;
use crate::types::CapabilityKind;

/// Handler invoked with the session and the (already merged) parameters.
pub type Handler = fn(&mut SessionContext, Value) -> Result<Value>;

const SCHEME_SEPARATOR: &str = "://";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    scheme: String,
    segments: Vec<Segment>,
}

/// Splits `uri` into its scheme (empty when absent) and path segments.
fn split_uri(uri: &str) -> (&str, Vec<&str>) {
    match uri.split_once(SCHEME_SEPARATOR) {
        Some((scheme, rest)) => (scheme, rest.split('/').collect()),
        None => ("", uri.split('/').collect()),
    }
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, parts) = split_uri(raw);
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
                    Segment::Placeholder(name.to_string())
                }
                _ if part.contains(['{', '}']) => {
                    return Err(CodeIndexError::Config {
                        message: format!("malformed URI template segment '{}' in '{}'", part, raw),
                    })
                }
                _ => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the placeholders, in order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Matches `uri` structurally, returning the percent-decoded captures.
    pub fn matches(&self, uri: &str) -> Option<Map<String, Value>> {
        let (scheme, parts) = split_uri(uri);
        if scheme != self.scheme || parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = Map::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(_) if part.is_empty() => return None,
                Segment::Placeholder(name) => {
                    let decoded = urlencoding::decode(part)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    captures.insert(name.clone(), Value::String(decoded));
                }
            }
        }
        Some(captures)
    }

    /// Returns `true` if some input could match both templates.
    pub fn overlaps(&self, other: &UriTemplate) -> bool {
        self.scheme == other.scheme
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    _ => true,
                })
    }
}

/// How a capability is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityId {
    Exact(String),
    Template(UriTemplate),
}

impl CapabilityId {
    pub fn as_str(&self) -> &str {
        match self {
            CapabilityId::Exact(s) => s,
            CapabilityId::Template(t) => t.as_str(),
        }
    }

    fn conflicts_with(&self, other: &CapabilityId) -> bool {
        match (self, other) {
            (CapabilityId::Exact(a), CapabilityId::Exact(b)) => a == b,
            (CapabilityId::Exact(a), CapabilityId::Template(t))
            | (CapabilityId::Template(t), CapabilityId::Exact(a)) => t.matches(a).is_some(),
            (CapabilityId::Template(a), CapabilityId::Template(b)) => a.overlaps(b),
        }
    }
}

/// A registered capability.
#[derive(Debug, Clone)]
pub struct Capability {
    pub id: CapabilityId,
    pub kind: CapabilityKind,
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments (tools only).
    pub input_schema: Option<Value>,
    /// MIME type of the returned content (resources only).
    pub mime_type: Option<String>,
    pub handler: Handler,
}

impl Capability {
    /// Declares a tool addressed by its exact name.
    pub fn tool(name: &str, description: &str, input_schema: Value, handler: Handler) -> Self {
        Self {
            id: CapabilityId::Exact(name.to_string()),
            kind: CapabilityKind::Tool,
            name: name.to_string(),
            description: description.to_string(),
            input_schema: Some(input_schema),
            mime_type: None,
            handler,
        }
    }

    /// Declares a resource. A URI containing `{...}` is parsed as a template.
    pub fn resource(
        uri: &str,
        name: &str,
        description: &str,
        mime_type: &str,
        handler: Handler,
    ) -> Result<Self> {
        let id = if uri.contains(['{', '}']) {
            CapabilityId::Template(UriTemplate::parse(uri)?)
        } else {
            CapabilityId::Exact(uri.to_string())
        };
        Ok(Self {
            id,
            kind: CapabilityKind::Resource,
            name: name.to_string(),
            description: description.to_string(),
            input_schema: None,
            mime_type: Some(mime_type.to_string()),
            handler,
        })
    }

    pub fn identifier(&self) -> &str {
        self.id.as_str()
    }

    pub fn is_template(&self) -> bool {
        matches!(self.id, CapabilityId::Template(_))
    }
}

/// A tool definition as listed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A resource or resource template as listed by `resources/list` and
/// `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "uriTemplate", skip_serializing_if = "Option::is_none")]
    pub uri_template: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// The result of resolving an identifier.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub capability: &'a Capability,
    /// Placeholder captures; empty for exact matches.
    pub captures: Map<String, Value>,
}

/// Mapping from capability identifier to handler.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability, rejecting duplicates and overlapping templates.
    pub fn register(&mut self, capability: Capability) -> Result<()> {
        for existing in &self.entries {
            if existing.id == capability.id {
                return Err(CodeIndexError::DuplicateCapability {
                    name: capability.identifier().to_string(),
                });
            }
            if existing.id.conflicts_with(&capability.id) {
                return Err(CodeIndexError::AmbiguousCapability {
                    name: capability.identifier().to_string(),
                    existing: existing.identifier().to_string(),
                });
            }
        }
        self.entries.push(capability);
        Ok(())
    }

    /// Resolves a tool name or resource URI. Exact identifiers are tried
    /// before templates.
    pub fn resolve(&self, name: &str) -> Result<Resolved<'_>> {
        if let Some(capability) = self
            .entries
            .iter()
            .find(|c| matches!(&c.id, CapabilityId::Exact(id) if id == name))
        {
            return Ok(Resolved {
                capability,
                captures: Map::new(),
            });
        }
        self.entries
            .iter()
            .find_map(|capability| match &capability.id {
                CapabilityId::Template(t) => t.matches(name).map(|captures| Resolved {
                    capability,
                    captures,
                }),
                CapabilityId::Exact(_) => None,
            })
            .ok_or_else(|| CodeIndexError::UnknownCapability {
                name: name.to_string(),
            })
    }

    /// Resolves `name` and requires the match to be of `kind`.
    pub fn resolve_kind(&self, kind: CapabilityKind, name: &str) -> Result<Resolved<'_>> {
        let resolved = self.resolve(name)?;
        if resolved.capability.kind != kind {
            return Err(CodeIndexError::UnknownCapability {
                name: format!("{} {}", kind.as_str(), name),
            });
        }
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .filter(|c| c.kind == CapabilityKind::Tool)
            .map(|c| ToolDefinition {
                name: c.name.clone(),
                description: c.description.clone(),
                input_schema: c
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            })
            .collect()
    }

    /// Resource definitions; `templates` selects templated or fixed URIs.
    pub fn resource_definitions(&self, templates: bool) -> Vec<ResourceDefinition> {
        self.entries
            .iter()
            .filter(|c| c.kind == CapabilityKind::Resource && c.is_template() == templates)
            .map(|c| {
                let id = c.identifier().to_string();
                let (uri, uri_template) = if templates {
                    (None, Some(id))
                } else {
                    (Some(id), None)
                };
                ResourceDefinition {
                    uri,
                    uri_template,
                    name: c.name.clone(),
                    description: c.description.clone(),
                    mime_type: c.mime_type.clone().unwrap_or_else(|| "text/plain".to_string()),
                }
            })
            .collect()
    }
}
