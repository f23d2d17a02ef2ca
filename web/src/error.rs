use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use serde_json::json;

use realtime::error::{Error as RealtimeError, ErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(RealtimeError);

impl Error {
    fn status(&self) -> StatusCode {
        match self.0.error_kind {
            ErrorKind::AuthenticationRejected(_) => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ErrorKind::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            ErrorKind::DeliveryFailure | ErrorKind::StaleConnection => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let body = Json(json!({
            "type": "error",
            "data": { "code": self.0.code(), "message": self.0.to_string() },
        }));
        (status, body).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<RealtimeError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (
                RealtimeError::authentication_rejected("expired"),
                StatusCode::UNAUTHORIZED,
            ),
            (
                RealtimeError::permission_denied("stats"),
                StatusCode::FORBIDDEN,
            ),
            (RealtimeError::malformed("bad"), StatusCode::BAD_REQUEST),
            (
                RealtimeError::new(ErrorKind::DeliveryFailure),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(Error::from(err).into_response().status(), expected);
        }
    }
}
