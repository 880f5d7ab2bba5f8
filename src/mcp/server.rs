//! The central Model Context Protocol engine
//!
//! A [`Dispatcher`] owns the frozen [`Registry`] and the [`Validator`]. Each
//! inbound HTTP request opens one [`Session`], feeds it the decoded body and
//! drops it; nothing carries over from one session to the next.

use std::{fmt, sync::Arc};

use rust_mcp_sdk::schema::{
    CallToolRequestParams, Implementation, InitializeResult, ListResourcesResult,
    ReadResourceRequestParams, Resource, ServerCapabilities, ServerCapabilitiesResources,
    ServerCapabilitiesTools,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::DispatchError,
    mcp::{
        registry::Registry,
        rpc::{json_rpc_error, ProtocolRequest, ProtocolResponse},
        schema::{ValidationError, Validator},
    },
};

pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDescriptor<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTemplateDescriptor<'a> {
    uri_template: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    mime_type: &'a str,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    validator: Validator,
}

impl Dispatcher {
    pub fn new(registry: Registry, validator: Validator) -> Self {
        Self {
            registry: Arc::new(registry),
            validator,
        }
    }

    /// Opens a single-use session. The session is consumed by
    /// [`Session::handle_payload`] and never reused.
    pub fn open_session(self: &Arc<Self>) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            dispatcher: Arc::clone(self),
            phase: Phase::Received,
        };
        debug!(session_id = %session.id, "protocol session opened");
        session
    }

    fn list_tools(&self) -> Value {
        let unknown_fields = self.validator.unknown_fields();
        let tools: Vec<ToolDescriptor<'_>> = self
            .registry
            .tools()
            .map(|tool| ToolDescriptor {
                name: &tool.name,
                description: &tool.description,
                input_schema: tool.input_schema.to_json_schema(unknown_fields),
                output_schema: tool
                    .output_schema
                    .as_ref()
                    .map(|schema| schema.to_json_schema(unknown_fields)),
            })
            .collect();

        json!({ "tools": tools })
    }

    fn list_resources(&self) -> Value {
        let resources = self
            .registry
            .resources()
            .map(|entry| Resource {
                annotations: None,
                description: entry.metadata.description.clone(),
                icons: vec![],
                meta: None,
                mime_type: Some(entry.metadata.mime_type.clone()),
                name: entry.name.clone(),
                size: None,
                title: entry.metadata.title.clone(),
                uri: entry.uri.as_str().to_string(),
            })
            .collect();

        serde_json::to_value(ListResourcesResult {
            meta: None,
            next_cursor: None,
            resources,
        })
        .expect("resources list result serialization")
    }

    fn list_resource_templates(&self) -> Value {
        let templates: Vec<ResourceTemplateDescriptor<'_>> = self
            .registry
            .resource_templates()
            .map(|entry| ResourceTemplateDescriptor {
                uri_template: entry.uri.as_str(),
                name: &entry.name,
                title: entry.metadata.title.as_deref(),
                description: entry.metadata.description.as_deref(),
                mime_type: &entry.metadata.mime_type,
            })
            .collect();

        json!({ "resourceTemplates": templates })
    }

    fn initialize(&self, params: Option<&Value>) -> Result<Value, DispatchError> {
        let protocol_version = negotiate_protocol_version(params)?;

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: Some(ServerCapabilitiesResources {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.to_string(),
            instructions: None,
            meta: None,
        };

        Ok(serde_json::to_value(initialize_result).expect("initialize result serialization"))
    }
}

/// Where a session stands in handling its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Resolving,
    Validating,
    Executing,
    ValidatingOutput,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::Resolving => "resolving",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::ValidatingOutput => "validating_output",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One stateless request/response cycle bound to a [`Dispatcher`].
pub struct Session {
    id: Uuid,
    dispatcher: Arc<Dispatcher>,
    phase: Phase,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Handles one decoded HTTP body (a request object or a batch) and returns
    /// the JSON to write back, or `None` when nothing expects a reply.
    pub async fn handle_payload(mut self, payload: Value) -> Option<Value> {
        let Value::Array(batch) = payload else {
            return self
                .handle_message(payload)
                .await
                .map(ProtocolResponse::into_value);
        };

        if batch.is_empty() {
            return Some(json_rpc_error(None, -32600, "Invalid Request"));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_message(item).await {
                responses.push(response.into_value());
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    /// Handles a single request object.
    pub async fn handle(mut self, payload: Value) -> Option<ProtocolResponse> {
        self.handle_message(payload).await
    }

    async fn handle_message(&mut self, payload: Value) -> Option<ProtocolResponse> {
        self.enter(Phase::Received);
        let request = match ProtocolRequest::decode(payload) {
            Ok(request) => request,
            Err(response) => {
                self.enter(Phase::Failed);
                return Some(response);
            }
        };

        let response = self.process(&request).await;

        info!(
            session_id = %self.id,
            method = %request.method,
            params = %redact_audit_params(request.params.as_ref()),
            outcome = if response.is_failure() { "failure" } else { "success" },
            "mcp action audited"
        );

        if request.is_notification() {
            None
        } else {
            Some(response)
        }
    }

    async fn process(&mut self, request: &ProtocolRequest) -> ProtocolResponse {
        let dispatcher = Arc::clone(&self.dispatcher);
        let params = request.params.clone();

        let outcome = match request.method.as_str() {
            "initialize" => dispatcher.initialize(params.as_ref()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(dispatcher.list_tools()),
            "tools/call" => self.call_tool(&dispatcher, params).await,
            "resources/list" => Ok(dispatcher.list_resources()),
            "resources/templates/list" => Ok(dispatcher.list_resource_templates()),
            "resources/read" => self.read_resource(&dispatcher, params).await,
            method if request.is_notification() && method.starts_with("notifications/") => {
                Ok(json!({}))
            }
            method => Err(DispatchError::MethodNotFound(method.to_string())),
        };

        let id = request.id.clone().unwrap_or(Value::Null);
        match outcome {
            Ok(result) => {
                self.enter(Phase::Succeeded);
                ProtocolResponse::Success { id, result }
            }
            Err(err) => {
                debug!(session_id = %self.id, phase = %self.phase, error = %err, "request failed");
                self.enter(Phase::Failed);
                ProtocolResponse::failure(id, err)
            }
        }
    }

    async fn call_tool(
        &mut self,
        dispatcher: &Dispatcher,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        let call: CallToolRequestParams = decode_params(params)?;

        self.enter(Phase::Resolving);
        let tool = dispatcher.registry.resolve_tool(&call.name)?;

        self.enter(Phase::Validating);
        let arguments = call.arguments.unwrap_or_default();
        let args = dispatcher
            .validator
            .validate_input(&tool.input_schema, &arguments)
            .map_err(DispatchError::InvalidArguments)?;

        self.enter(Phase::Executing);
        let mut result = tool.handler.call(args).await?;

        self.enter(Phase::ValidatingOutput);
        if let Some(schema) = tool.output_schema.as_ref() {
            let structured = result.structured_content.as_ref().ok_or_else(|| {
                DispatchError::InvalidOutput(ValidationError {
                    path: "$".to_string(),
                    reason: "structured content is required by the output schema".to_string(),
                })
            })?;
            let validated = dispatcher
                .validator
                .validate_output(schema, structured)
                .map_err(DispatchError::InvalidOutput)?;
            result.structured_content = Some(validated);
        }

        Ok(serde_json::to_value(result).expect("tool result serialization"))
    }

    async fn read_resource(
        &mut self,
        dispatcher: &Dispatcher,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        let read: ReadResourceRequestParams = decode_params(params)?;

        self.enter(Phase::Resolving);
        let matched = dispatcher.registry.resolve_resource(&read.uri)?;

        self.enter(Phase::Executing);
        let result = matched
            .entry
            .resolver
            .read(&read.uri, &matched.params)
            .await?;

        self.enter(Phase::ValidatingOutput);
        let result = serde_json::to_value(result).expect("read resource result serialization");
        check_resource_contents(&result, &matched.entry.metadata.mime_type)?;

        Ok(result)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(session_id = %self.id, phase = %self.phase, "protocol session closed");
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, DispatchError> {
    let Some(raw_params) = params else {
        return Err(DispatchError::InvalidParams("params are required".to_string()));
    };

    serde_json::from_value(raw_params).map_err(|err| DispatchError::InvalidParams(err.to_string()))
}

fn is_json_mime(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Text declared as JSON must parse as JSON.
fn check_resource_contents(result: &Value, declared_mime_type: &str) -> Result<(), DispatchError> {
    let contents = result
        .get("contents")
        .and_then(Value::as_array)
        .ok_or_else(|| DispatchError::MalformedContent("contents must be an array".to_string()))?;

    for content in contents {
        let mime_type = content
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or(declared_mime_type);
        let Some(text) = content.get("text").and_then(Value::as_str) else {
            continue;
        };

        if is_json_mime(mime_type) {
            serde_json::from_str::<Value>(text).map_err(|err| {
                DispatchError::MalformedContent(format!(
                    "content declared as {mime_type} is not valid JSON: {err}"
                ))
            })?;
        }
    }

    Ok(())
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<&'static str, DispatchError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            DispatchError::InvalidParams("initialize params.protocolVersion is required".to_string())
        })?;

    Ok(SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|supported| *supported == offered_version)
        .unwrap_or(LATEST_PROTOCOL_VERSION))
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
