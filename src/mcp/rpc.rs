//! JSON-RPC protocol representations and formatting utilities
//!
//! Decodes inbound request objects and renders the single success or failure
//! envelope produced for each of them.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{DispatchError, NotFoundError};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
struct RawRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// A decoded request. `id` is `None` for notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolRequest {
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

impl ProtocolRequest {
    pub fn decode(payload: Value) -> Result<Self, ProtocolResponse> {
        let Some(object) = payload.as_object() else {
            return Err(ProtocolResponse::failure(
                Value::Null,
                DispatchError::InvalidRequest,
            ));
        };

        let id = object.get("id").cloned();
        let reply_id = id.clone().unwrap_or(Value::Null);
        if !matches!(
            id,
            None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_))
        ) {
            return Err(ProtocolResponse::failure(
                Value::Null,
                DispatchError::InvalidRequest,
            ));
        }

        let raw: RawRequest = match serde_json::from_value(payload) {
            Ok(raw) => raw,
            Err(_) => {
                return Err(ProtocolResponse::failure(
                    reply_id,
                    DispatchError::InvalidRequest,
                ))
            }
        };

        if raw.jsonrpc != JSONRPC_VERSION || raw.method.trim().is_empty() {
            return Err(ProtocolResponse::failure(
                reply_id,
                DispatchError::InvalidRequest,
            ));
        }

        Ok(Self {
            id,
            method: raw.method,
            params: raw.params,
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcFault {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

fn fault_data(code: &str, message: impl Into<String>, details: Value) -> Option<Value> {
    Some(json!({
        "code": code,
        "message": message.into(),
        "details": details,
    }))
}

impl From<DispatchError> for RpcFault {
    fn from(err: DispatchError) -> Self {
        let code = err.code();
        let (message, data) = match err {
            DispatchError::InvalidRequest => ("Invalid Request".to_string(), None),
            DispatchError::MethodNotFound(_) => ("Method not found".to_string(), None),
            DispatchError::NotFound(NotFoundError::Tool(name)) => (
                "Method not found".to_string(),
                fault_data("tool_not_found", "unknown tool name", json!({ "name": name })),
            ),
            DispatchError::NotFound(NotFoundError::Resource(uri)) => (
                "Method not found".to_string(),
                fault_data(
                    "resource_not_found",
                    "unknown resource uri",
                    json!({ "uri": uri }),
                ),
            ),
            DispatchError::InvalidParams(reason) => (
                "Invalid params".to_string(),
                fault_data("invalid_params", reason, json!({})),
            ),
            DispatchError::InvalidArguments(err) => (
                "Invalid params".to_string(),
                fault_data("invalid_arguments", err.reason, json!({ "path": err.path })),
            ),
            DispatchError::Handler(err) => (err.message, None),
            DispatchError::InvalidOutput(err) => (
                "Internal error".to_string(),
                fault_data("invalid_output", err.reason, json!({ "path": err.path })),
            ),
            DispatchError::MalformedContent(reason) => (
                "Internal error".to_string(),
                fault_data("malformed_resource_content", reason, json!({})),
            ),
        };

        Self {
            code,
            message,
            data,
        }
    }
}

/// Exactly one of these is produced for every request that expects a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolResponse {
    Success { id: Value, result: Value },
    Failure { id: Value, fault: RpcFault },
}

impl ProtocolResponse {
    pub fn failure(id: Value, err: DispatchError) -> Self {
        Self::Failure {
            id,
            fault: RpcFault::from(err),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Success { id, result } => json_rpc_result(Some(id), result),
            Self::Failure { id, fault } => {
                json_rpc_error_with_data(Some(id), fault.code, &fault.message, fault.data)
            }
        }
    }
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let error = RpcError {
        code: i64::from(code),
        data,
        message: message.to_string(),
    };

    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let response = JsonrpcErrorResponse::new(error, Some(request_id));
        return serde_json::to_value(response).expect("jsonrpc error response serialization");
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "error": error
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        return serde_json::to_value(response).expect("jsonrpc result response serialization");
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}
