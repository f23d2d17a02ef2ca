use crate::error::Error;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use log::*;
use realtime::error::Error as RealtimeError;
use serde::Deserialize;

const BEARER_PREFIX: &str = "Bearer ";

/// Opaque bearer credential presented by a dashboard client.
///
/// Read from `Authorization: Bearer <token>`, falling back to a `token` query
/// parameter because browsers cannot set headers on a WebSocket handshake.
pub(crate) struct BearerCredential(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerCredential
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        if let Some(token) = header {
            return Ok(BearerCredential(token.to_string()));
        }

        let query = Query::<TokenQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Query(query)| query.token)
            .filter(|token| !token.is_empty());

        match query {
            Some(token) => Ok(BearerCredential(token)),
            None => {
                trace!("Request without bearer credential");
                Err(RealtimeError::authentication_rejected("missing bearer credential").into())
            }
        }
    }
}
