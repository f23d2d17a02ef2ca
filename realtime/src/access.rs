//! Stateless access policy deciding which rooms an identity may join.
//!
//! The policy is a closed decision table over `(role, room kind, scope match)`.
//! It drives both explicit subscription requests and the default rooms joined
//! right after a connection registers.

use crate::error::{Error, Result};
use crate::rooms::RoomId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, already-authenticated subject id for one connected client.
pub type Identity = String;

/// The single partition (property, location) a scoped identity is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantScope(String);

impl TenantScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Visibility class of a connected identity. A tenant scope exists only for
/// the scoped role, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// Cross-tenant visibility (HR staff, administrators).
    Elevated,
    /// Single-tenant visibility (property managers).
    Scoped(TenantScope),
}

impl Role {
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Elevated)
    }

    pub fn tenant_scope(&self) -> Option<&TenantScope> {
        match self {
            Role::Elevated => None,
            Role::Scoped(scope) => Some(scope),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Elevated => "elevated",
            Role::Scoped(_) => "scoped",
        }
    }
}

/// Resolved identity descriptor handed over by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: Identity,
    pub role: Role,
}

impl Principal {
    pub fn elevated(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            role: Role::Elevated,
        }
    }

    pub fn scoped(identity: impl Into<Identity>, scope: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: Role::Scoped(TenantScope::new(scope)),
        }
    }

    /// Builds a principal from the loose `{subject, role, optional scope}`
    /// descriptor shape. A scoped role without a scope cannot be placed in any
    /// room and is rejected outright.
    pub fn from_descriptor(
        identity: impl Into<Identity>,
        elevated: bool,
        tenant_scope: Option<String>,
    ) -> Result<Self> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(Error::authentication_rejected("empty subject id"));
        }

        match (elevated, tenant_scope) {
            (true, _) => Ok(Self::elevated(identity)),
            (false, Some(scope)) if !scope.is_empty() => Ok(Self::scoped(identity, scope)),
            (false, _) => Err(Error::authentication_rejected(
                "scoped role requires a tenant scope",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    GlobalRequiresElevated,
    ForeignTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// The complete decision table.
pub fn evaluate(role: &Role, room: &RoomId) -> Decision {
    match (role, room) {
        (Role::Elevated, RoomId::Global) => Decision::Allow,
        (Role::Elevated, RoomId::Tenant(_)) => Decision::Allow,
        (Role::Scoped(_), RoomId::Global) => Decision::Deny(DenyReason::GlobalRequiresElevated),
        (Role::Scoped(own), RoomId::Tenant(requested)) if own == requested => Decision::Allow,
        (Role::Scoped(_), RoomId::Tenant(_)) => Decision::Deny(DenyReason::ForeignTenant),
    }
}

/// `evaluate` lifted into the crate's error type.
pub fn authorize(role: &Role, room: &RoomId) -> Result<()> {
    match evaluate(role, room) {
        Decision::Allow => Ok(()),
        Decision::Deny(DenyReason::GlobalRequiresElevated) => Err(Error::permission_denied(
            format!("room {room} requires an elevated role"),
        )),
        Decision::Deny(DenyReason::ForeignTenant) => Err(Error::permission_denied(format!(
            "room {room} belongs to another tenant"
        ))),
    }
}

/// Rooms joined automatically right after registration.
pub fn default_rooms(role: &Role) -> Vec<RoomId> {
    match role {
        Role::Elevated => vec![RoomId::Global],
        Role::Scoped(scope) => vec![RoomId::Tenant(scope.clone())],
    }
}

/// Whether the role may read server-wide connection statistics.
pub fn may_read_stats(role: &Role) -> bool {
    role.is_elevated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn tenant(scope: &str) -> RoomId {
        RoomId::Tenant(TenantScope::new(scope))
    }

    #[test]
    fn decision_table_is_exhaustive_over_role_room_and_scope() {
        let elevated = Role::Elevated;
        let scoped = Role::Scoped(TenantScope::new("P1"));

        let cases = [
            (&elevated, RoomId::Global, Decision::Allow),
            (&elevated, tenant("P1"), Decision::Allow),
            (&elevated, tenant("P2"), Decision::Allow),
            (
                &scoped,
                RoomId::Global,
                Decision::Deny(DenyReason::GlobalRequiresElevated),
            ),
            (&scoped, tenant("P1"), Decision::Allow),
            (
                &scoped,
                tenant("P2"),
                Decision::Deny(DenyReason::ForeignTenant),
            ),
        ];

        for (role, room, expected) in cases {
            assert_eq!(evaluate(role, &room), expected, "{role:?} -> {room}");
        }
    }

    #[test]
    fn authorize_maps_denials_to_permission_denied() {
        let scoped = Role::Scoped(TenantScope::new("P2"));

        let err = authorize(&scoped, &tenant("P1")).unwrap_err();
        assert!(matches!(err.error_kind, ErrorKind::PermissionDenied(_)));

        let err = authorize(&scoped, &RoomId::Global).unwrap_err();
        assert!(matches!(err.error_kind, ErrorKind::PermissionDenied(_)));

        assert!(authorize(&scoped, &tenant("P2")).is_ok());
    }

    #[test]
    fn default_rooms_follow_role() {
        assert_eq!(default_rooms(&Role::Elevated), vec![RoomId::Global]);
        assert_eq!(
            default_rooms(&Role::Scoped(TenantScope::new("P1"))),
            vec![tenant("P1")]
        );
    }

    #[test]
    fn default_rooms_always_pass_the_policy() {
        for role in [Role::Elevated, Role::Scoped(TenantScope::new("P9"))] {
            for room in default_rooms(&role) {
                assert_eq!(evaluate(&role, &room), Decision::Allow);
            }
        }
    }

    #[test]
    fn only_elevated_reads_stats() {
        assert!(may_read_stats(&Role::Elevated));
        assert!(!may_read_stats(&Role::Scoped(TenantScope::new("P1"))));
    }

    #[test]
    fn descriptor_requires_scope_for_scoped_role() {
        let err = Principal::from_descriptor("mgr-1", false, None).unwrap_err();
        assert!(matches!(
            err.error_kind,
            ErrorKind::AuthenticationRejected(_)
        ));

        let principal = Principal::from_descriptor("mgr-1", false, Some("P1".into())).unwrap();
        assert_eq!(principal, Principal::scoped("mgr-1", "P1"));

        // Elevated identities ignore any scope they were handed.
        let principal = Principal::from_descriptor("hr-1", true, Some("P1".into())).unwrap();
        assert_eq!(principal.role, Role::Elevated);
    }

    #[test]
    fn descriptor_rejects_empty_subject() {
        assert!(Principal::from_descriptor("", true, None).is_err());
    }
}
