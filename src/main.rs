use std::{future::IntoFuture, sync::Arc};

use mcp_dispatch_server::{
    build_app, build_registry,
    config::Config,
    domain::tasks::TaskStore,
    logging,
    mcp::{schema::Validator, server::Dispatcher},
    AppState,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let store = Arc::new(TaskStore::seeded());
    let registry = build_registry(store)?;
    let dispatcher = Dispatcher::new(registry, Validator::new(config.unknown_fields));
    let app = build_app(AppState::new(dispatcher));

    let listener = match tokio::net::TcpListener::bind(bind_socket).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(bind_addr = %bind_socket, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        "server starting"
    );

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()).into_future() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
