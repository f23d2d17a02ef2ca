use crate::access::{self, Identity, Principal, TenantScope};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

const GLOBAL_ROOM: &str = "global";
const TENANT_PREFIX: &str = "tenant-";

/// A named delivery partition: the single global room or one room per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
    Global,
    Tenant(TenantScope),
}

impl RoomId {
    pub fn tenant(scope: impl Into<String>) -> Self {
        RoomId::Tenant(TenantScope::new(scope))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Global => f.write_str(GLOBAL_ROOM),
            RoomId::Tenant(scope) => write!(f, "{TENANT_PREFIX}{scope}"),
        }
    }
}

impl FromStr for RoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == GLOBAL_ROOM {
            return Ok(RoomId::Global);
        }
        match s.strip_prefix(TENANT_PREFIX) {
            Some(scope) if !scope.is_empty() => Ok(RoomId::tenant(scope)),
            _ => Err(Error::malformed(format!("unknown room id '{s}'"))),
        }
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Room membership with a reverse index so that purging an identity does not
/// scan every room.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// room -> members. Rooms are created lazily and never removed.
    members: HashMap<RoomId, HashSet<Identity>>,
    /// identity -> joined rooms
    memberships: HashMap<Identity, BTreeSet<RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `principal` to `room` if the access policy allows it. Returns
    /// whether the membership is new; repeating a granted subscription is a
    /// no-op.
    pub fn subscribe(&mut self, principal: &Principal, room: &RoomId) -> Result<bool> {
        access::authorize(&principal.role, room)?;

        let added = self
            .members
            .entry(room.clone())
            .or_default()
            .insert(principal.identity.clone());
        self.memberships
            .entry(principal.identity.clone())
            .or_default()
            .insert(room.clone());

        Ok(added)
    }

    /// Removes the membership if present. Never fails.
    pub fn unsubscribe(&mut self, identity: &str, room: &RoomId) -> bool {
        let removed = self
            .members
            .get_mut(room)
            .map(|members| members.remove(identity))
            .unwrap_or(false);

        if let Some(rooms) = self.memberships.get_mut(identity) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(identity);
            }
        }

        removed
    }

    /// Members of `room`; empty for a room nobody ever joined.
    pub fn members_of(&self, room: &RoomId) -> impl Iterator<Item = &Identity> {
        self.members.get(room).into_iter().flatten()
    }

    pub fn rooms_of(&self, identity: &str) -> Vec<RoomId> {
        self.memberships
            .get(identity)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops every membership held by `identity` and returns the rooms it left.
    pub fn purge(&mut self, identity: &str) -> Vec<RoomId> {
        let rooms = self.memberships.remove(identity).unwrap_or_default();
        for room in &rooms {
            if let Some(members) = self.members.get_mut(room) {
                members.remove(identity);
            }
        }
        rooms.into_iter().collect()
    }

    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// Member count per room, keyed by the room's wire id.
    pub fn member_counts(&self) -> BTreeMap<String, usize> {
        self.members
            .iter()
            .map(|(room, members)| (room.to_string(), members.len()))
            .collect()
    }
}
