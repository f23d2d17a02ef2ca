use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use web::auth::JwtAuthenticator;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        "Starting dashboard_realtime in {} mode",
        config.runtime_env()
    );

    let Some(jwt_secret) = config.jwt_secret().map(str::to_owned) else {
        error!("JWT_SECRET must be set to verify dashboard tokens");
        return ExitCode::FAILURE;
    };
    let authenticator = Arc::new(JwtAuthenticator::new(&jwt_secret, config.jwt_issuer()));

    let (dispatcher, event_publisher) = service::init_realtime(&config);
    let shutdown = CancellationToken::new();

    let heartbeat = dispatcher
        .heartbeat_monitor(config.heartbeat_settings())
        .spawn(shutdown.clone());

    let app_state = AppState::new(config, dispatcher, event_publisher, authenticator);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
        signal.cancel();
    });

    let result = web::init_server(app_state, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = heartbeat.await {
        warn!("Heartbeat monitor ended abnormally: {e}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {e}");
            ExitCode::FAILURE
        }
    }
}
