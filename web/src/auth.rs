//! Bearer-token authentication for dashboard connections.
//!
//! Tokens are HS256 JWTs issued by the main application at login. This module
//! only verifies them and maps the claims onto a `Principal`; issuing tokens
//! is not its concern.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::*;
use realtime::error::{Error, Result};
use realtime::{Authenticator, Principal};
use serde::{Deserialize, Serialize};

/// Application roles as they appear in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardRole {
    Hr,
    Admin,
    PropertyManager,
}

impl DashboardRole {
    /// HR staff and admins see every tenant.
    pub fn is_elevated(self) -> bool {
        matches!(self, DashboardRole::Hr | DashboardRole::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardClaims {
    pub sub: String,
    pub role: DashboardRole,
    /// Property id; required for `property_manager`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, credential: &str) -> Result<Principal> {
        let data = decode::<DashboardClaims>(credential, &self.key, &self.validation).map_err(
            |e| {
                debug!("Rejected dashboard token: {e}");
                Error::authentication_rejected("invalid or expired token").with_source(e)
            },
        )?;

        let claims = data.claims;
        Principal::from_descriptor(claims.sub, claims.role.is_elevated(), claims.tenant)
    }
}
