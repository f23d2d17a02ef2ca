use crate::controller::ApiResponse;
use crate::error::Error;
use crate::extractors::bearer_credential::BearerCredential;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use realtime::access;
use realtime::error::Error as RealtimeError;
use service::AppState;

/// GET connection and room counts for operational dashboards.
///
/// Same view as the in-band `get_stats` message, and restricted the same way:
/// only elevated roles may read it.
pub(crate) async fn read(
    State(app_state): State<AppState>,
    BearerCredential(credential): BearerCredential,
) -> Result<impl IntoResponse, Error> {
    let principal = app_state.authenticator.authenticate(&credential).await?;
    if !access::may_read_stats(&principal.role) {
        return Err(RealtimeError::permission_denied("statistics require an elevated role").into());
    }

    let stats = app_state.dispatcher.stats();
    debug!("Stats requested by {}: {:?}", principal.identity, stats);

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), stats)))
}
