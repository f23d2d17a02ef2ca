//! Error types for the `realtime` crate.
//!
//! Follows the same layout as the other layers: a root `Error` struct holding an
//! `ErrorKind` and an optional source error for chaining.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Failure categories for the event-distribution core.
///
/// Only `AuthenticationRejected` ever reaches whatever accepted the transport;
/// every other kind is local to a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or expired credential at connect time.
    AuthenticationRejected(String),
    /// An authenticated identity asked for a room or admin action it may not use.
    PermissionDenied(String),
    /// Unparseable or unrecognized inbound frame.
    MalformedMessage(String),
    /// Transport error or send timeout while pushing to one recipient.
    DeliveryFailure,
    /// No activity seen within the staleness threshold.
    StaleConnection,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn authentication_rejected(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationRejected(reason.into()))
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied(reason.into()))
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedMessage(reason.into()))
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Stable machine-readable code sent to clients in `error` frames.
    pub fn code(&self) -> &'static str {
        match self.error_kind {
            ErrorKind::AuthenticationRejected(_) => "authentication_rejected",
            ErrorKind::PermissionDenied(_) => "permission_denied",
            ErrorKind::MalformedMessage(_) => "malformed_message",
            ErrorKind::DeliveryFailure => "delivery_failure",
            ErrorKind::StaleConnection => "stale_connection",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::AuthenticationRejected(reason) => {
                write!(f, "Authentication rejected: {reason}")
            }
            ErrorKind::PermissionDenied(reason) => write!(f, "Permission denied: {reason}"),
            ErrorKind::MalformedMessage(reason) => write!(f, "Malformed message: {reason}"),
            ErrorKind::DeliveryFailure => write!(f, "Delivery failure"),
            ErrorKind::StaleConnection => write!(f, "Stale connection"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::malformed(err.to_string()).with_source(err)
    }
}
