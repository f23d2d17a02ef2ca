use log::*;
use service::AppState;
use std::io;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod auth;
mod controller;
mod error;
mod extractors;
pub mod router;
mod ws;

pub use error::{Error, Result};

/// Binds the configured interface and port, then serves until `shutdown`
/// is cancelled.
pub async fn init_server(app_state: AppState, shutdown: CancellationToken) -> io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = app_state.config.port;

    let listener = TcpListener::bind((interface.as_str(), port)).await?;
    info!(
        "Server starting... listening for connections on http://{}",
        listener.local_addr()?
    );

    serve(listener, app_state, shutdown).await
}

/// Serves the dashboard routes on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let app = router::define_routes(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Shutdown requested, no longer accepting connections");
        })
        .await
}
