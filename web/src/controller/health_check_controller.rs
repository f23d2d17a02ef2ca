use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use log::*;
use service::AppState;

/// GET liveness probe. Also reports how many dashboards are connected.
pub(crate) async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    trace!(
        "Health check with {} live connection(s)",
        app_state.dispatcher.connection_count()
    );
    (StatusCode::OK, "healthy")
}
