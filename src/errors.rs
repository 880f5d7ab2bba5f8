use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::schema::ValidationError;

/// Transport-level faults raised before a protocol envelope exists.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal error")]
    Internal { code: &'static str, message: String },
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl AppError {
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            code,
            message: message.into(),
        }
    }
}

fn transport_fault(code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": null
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Internal { code, message } => {
                tracing::error!(code, error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(transport_fault(-32603, "Internal server error")),
                )
                    .into_response()
            }
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(transport_fault(-32000, "Method not allowed.")),
            )
                .into_response(),
        }
    }
}

/// Startup-time registration faults. Fatal to the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("resource `{0}` is already registered")]
    DuplicateResourceName(String),
    #[error("resource uri `{0}` is already registered")]
    DuplicateResourceUri(String),
    #[error("invalid uri template `{uri}`: {reason}")]
    InvalidUriTemplate { uri: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("unknown tool `{0}`")]
    Tool(String),
    #[error("unknown resource uri `{0}`")]
    Resource(String),
}

/// Fault raised by a tool handler or resource resolver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Every way a single protocol request can fail once it reached the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request")]
    InvalidRequest,
    #[error("method `{0}` not found")]
    MethodNotFound(String),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(ValidationError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("invalid output: {0}")]
    InvalidOutput(ValidationError),
    #[error("malformed resource content: {0}")]
    MalformedContent(String),
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound(_) | Self::NotFound(_) => -32601,
            Self::InvalidParams(_) | Self::InvalidArguments(_) => -32602,
            Self::Handler(_) | Self::InvalidOutput(_) | Self::MalformedContent(_) => -32603,
        }
    }
}
