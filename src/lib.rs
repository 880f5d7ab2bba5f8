use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use domain::{calculator::register_calculator, tasks::TaskStore, todolist::register_todolist};
use errors::RegistryError;
use mcp::{registry::Registry, server::Dispatcher};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Registers the calculator and the task list against one shared store.
pub fn build_registry(store: Arc<TaskStore>) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    register_calculator(&mut registry)?;
    register_todolist(&mut registry, store)?;
    Ok(registry)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(
            "/mcp",
            post(http::handlers::mcp_endpoint)
                .get(http::handlers::method_not_allowed)
                .delete(http::handlers::method_not_allowed),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
