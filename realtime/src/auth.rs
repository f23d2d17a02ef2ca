use crate::access::Principal;
use crate::error::Result;
use async_trait::async_trait;

/// Resolves the opaque bearer credential presented at connect time into a
/// `Principal`. Implementations live outside this crate; a rejection must be
/// reported as `ErrorKind::AuthenticationRejected`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Principal>;
}
