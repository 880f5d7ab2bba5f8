//! Tool and resource registration
//!
//! The registry is populated once at startup and then frozen behind an `Arc`
//! by the dispatcher. Tools are keyed by name; resources by URI, which may
//! be a literal or a template such as `todo://tasks/{task_id}`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use regex::Regex;
use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, ReadResourceContent, ReadResourceResult, TextContent,
    TextResourceContents,
};
use serde_json::{Map, Value};

use crate::{
    errors::{HandlerError, NotFoundError, RegistryError},
    mcp::schema::{SchemaMap, ValidatedArgs},
};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ValidatedArgs) -> Result<CallToolResult, HandlerError>;
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// `params` holds the values bound to template placeholders; it is empty
    /// for literal URIs.
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<ReadResourceResult, HandlerError>;
}

pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub input_schema: SchemaMap,
    pub output_schema: Option<SchemaMap>,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: String,
}

impl ResourceMetadata {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            title: None,
            description: None,
            mime_type: mime_type.into(),
        }
    }

    pub fn json() -> Self {
        Self::new("application/json")
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum UriPattern {
    Exact(String),
    Template {
        raw: String,
        matcher: Regex,
        literal_prefix_len: usize,
        placeholders: Vec<String>,
    },
}

impl UriPattern {
    pub fn parse(uri: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidUriTemplate {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if uri.trim().is_empty() {
            return Err(invalid("uri must not be empty"));
        }

        if !uri.contains('{') && !uri.contains('}') {
            return Ok(Self::Exact(uri.to_string()));
        }

        let mut pattern = String::from("^");
        let mut placeholders: Vec<String> = Vec::new();
        let mut literal_prefix_len = None;
        let mut rest = uri;

        while let Some(open) = rest.find('{') {
            let literal = &rest[..open];
            if literal.contains('}') {
                return Err(invalid("unbalanced `}`"));
            }
            pattern.push_str(&regex::escape(literal));
            if literal_prefix_len.is_none() {
                literal_prefix_len = Some(uri.len() - rest.len() + open);
            }

            let after_open = &rest[open + 1..];
            let close = after_open.find('}').ok_or_else(|| invalid("unclosed `{`"))?;
            let name = &after_open[..close];
            if name.is_empty()
                || !name
                    .chars()
                    .all(|character| character.is_ascii_alphanumeric() || character == '_')
            {
                return Err(invalid(
                    "placeholder names must be non-empty and alphanumeric",
                ));
            }
            if placeholders.iter().any(|existing| existing == name) {
                return Err(invalid("placeholder names must be unique"));
            }

            pattern.push_str(&format!("(?P<{name}>[^/]+)"));
            placeholders.push(name.to_string());
            rest = &after_open[close + 1..];
        }

        if rest.contains('}') {
            return Err(invalid("unbalanced `}`"));
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let matcher = Regex::new(&pattern).map_err(|err| invalid(&err.to_string()))?;
        Ok(Self::Template {
            raw: uri.to_string(),
            matcher,
            literal_prefix_len: literal_prefix_len.unwrap_or(0),
            placeholders,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(uri) => uri,
            Self::Template { raw, .. } => raw,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template { .. })
    }

    fn captures(&self, uri: &str) -> Option<HashMap<String, String>> {
        match self {
            Self::Exact(exact) => (exact == uri).then(HashMap::new),
            Self::Template {
                matcher,
                placeholders,
                ..
            } => {
                let captures = matcher.captures(uri)?;
                Some(
                    placeholders
                        .iter()
                        .filter_map(|name| {
                            captures
                                .name(name)
                                .map(|value| (name.clone(), value.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }

    fn literal_prefix_len(&self) -> usize {
        match self {
            Self::Exact(uri) => uri.len(),
            Self::Template {
                literal_prefix_len, ..
            } => *literal_prefix_len,
        }
    }
}

pub struct ResourceEntry {
    pub name: String,
    pub uri: UriPattern,
    pub metadata: ResourceMetadata,
    pub resolver: Arc<dyn ResourceResolver>,
}

pub struct ResourceMatch {
    pub entry: Arc<ResourceEntry>,
    pub params: HashMap<String, String>,
}

#[derive(Default)]
pub struct Registry {
    tools: Vec<Arc<ToolEntry>>,
    tool_index: HashMap<String, usize>,
    resources: Vec<Arc<ResourceEntry>>,
    resource_names: HashMap<String, usize>,
    exact_uris: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        input_schema: SchemaMap,
        output_schema: Option<SchemaMap>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.tool_index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        self.tool_index.insert(name.clone(), self.tools.len());
        self.tools.push(Arc::new(ToolEntry {
            name,
            description: description.into(),
            input_schema,
            output_schema,
            handler,
        }));
        Ok(())
    }

    pub fn register_resource(
        &mut self,
        name: impl Into<String>,
        uri: &str,
        metadata: ResourceMetadata,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.resource_names.contains_key(&name) {
            return Err(RegistryError::DuplicateResourceName(name));
        }

        let pattern = UriPattern::parse(uri)?;
        if self
            .resources
            .iter()
            .any(|entry| entry.uri.as_str() == pattern.as_str())
        {
            return Err(RegistryError::DuplicateResourceUri(uri.to_string()));
        }

        let index = self.resources.len();
        if let UriPattern::Exact(exact) = &pattern {
            self.exact_uris.insert(exact.clone(), index);
        }
        self.resource_names.insert(name.clone(), index);
        self.resources.push(Arc::new(ResourceEntry {
            name,
            uri: pattern,
            metadata,
            resolver,
        }));
        Ok(())
    }

    pub fn resolve_tool(&self, name: &str) -> Result<Arc<ToolEntry>, NotFoundError> {
        self.tool_index
            .get(name)
            .map(|index| Arc::clone(&self.tools[*index]))
            .ok_or_else(|| NotFoundError::Tool(name.to_string()))
    }

    /// Exact URIs win; otherwise the matching template with the longest
    /// literal prefix, earliest registration breaking ties.
    pub fn resolve_resource(&self, uri: &str) -> Result<ResourceMatch, NotFoundError> {
        if let Some(index) = self.exact_uris.get(uri) {
            return Ok(ResourceMatch {
                entry: Arc::clone(&self.resources[*index]),
                params: HashMap::new(),
            });
        }

        let mut best: Option<(usize, &Arc<ResourceEntry>, HashMap<String, String>)> = None;
        for entry in self.resources.iter().filter(|entry| entry.uri.is_template()) {
            let Some(params) = entry.uri.captures(uri) else {
                continue;
            };
            let prefix_len = entry.uri.literal_prefix_len();
            if best
                .as_ref()
                .map_or(true, |(best_len, _, _)| prefix_len > *best_len)
            {
                best = Some((prefix_len, entry, params));
            }
        }

        best.map(|(_, entry, params)| ResourceMatch {
            entry: Arc::clone(entry),
            params,
        })
        .ok_or_else(|| NotFoundError::Resource(uri.to_string()))
    }

    pub fn tools(&self) -> impl Iterator<Item = &Arc<ToolEntry>> {
        self.tools.iter()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceEntry>> {
        self.resources.iter().filter(|entry| !entry.uri.is_template())
    }

    pub fn resource_templates(&self) -> impl Iterator<Item = &Arc<ResourceEntry>> {
        self.resources.iter().filter(|entry| entry.uri.is_template())
    }
}

/// Wraps a JSON object as the `structuredContent` of a tool result, with a
/// single text block alongside it.
pub fn tool_result(text: impl Into<String>, structured: Map<String, Value>) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text.into(), None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(structured),
    }
}

/// Builds a single-entry text resource result.
pub fn text_resource(
    uri: &str,
    mime_type: &str,
    text: impl Into<String>,
) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some(mime_type.to_string()),
            text: text.into(),
            uri: uri.to_string(),
        })],
        meta: None,
    }
}
