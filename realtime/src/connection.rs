use crate::access::{Identity, Principal};
use crate::message::Frame;
use crate::rooms::RoomRegistry;
use chrono::{DateTime, Utc};
use log::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Unique identifier for one connection attempt (server-generated). Two
/// connections of the same identity always have different ids, which lets a
/// displaced handler clean up without touching its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Send half of a connection's outbound queue. The matching receiver is
/// drained by exactly one writer task, so frames reach the transport in the
/// order they were queued.
pub type SendHandle = mpsc::Sender<Frame>;

/// One live client.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub principal: Principal,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Instant,
    sender: SendHandle,
    closed: CancellationToken,
}

impl Connection {
    pub fn identity(&self) -> &Identity {
        &self.principal.identity
    }

    pub fn sender(&self) -> &SendHandle {
        &self.sender
    }

    /// Queues a transport-level ping without waiting. A closed queue means the
    /// writer is gone.
    pub fn probe(&self) -> Result<(), TrySendError<Frame>> {
        self.sender.try_send(Frame::Ping)
    }

    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_seen)
    }

    fn close_transport(&self) {
        self.closed.cancel();
    }
}

/// Everything a freshly registered connection needs to run its transport.
#[derive(Debug, Clone)]
pub struct Registration {
    pub connection_id: ConnectionId,
    pub closed: CancellationToken,
}

/// Maps identity to its single live connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<Identity, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection for `principal`, retiring any existing one for the
    /// same identity first. Both steps happen under the caller's exclusive
    /// borrow, so no observer can see two live connections for one identity.
    pub fn register(
        &mut self,
        rooms: &mut RoomRegistry,
        principal: Principal,
        sender: SendHandle,
        now: Instant,
    ) -> Registration {
        if self.retire(rooms, &principal.identity) {
            info!(
                "Displaced previous connection for {} by a new connection",
                principal.identity
            );
        }

        let connection = Connection {
            id: ConnectionId::new(),
            principal,
            connected_at: Utc::now(),
            last_seen: now,
            sender,
            closed: CancellationToken::new(),
        };
        let registration = Registration {
            connection_id: connection.id.clone(),
            closed: connection.closed.clone(),
        };

        debug!(
            "Registered connection {} for {} ({})",
            connection.id.as_str(),
            connection.identity(),
            connection.principal.role.name()
        );
        self.connections
            .insert(connection.identity().clone(), connection);

        registration
    }

    /// Updates `last_seen`. A missing identity is a lost race with retirement,
    /// not an error.
    pub fn touch(&mut self, identity: &str, now: Instant) -> bool {
        match self.connections.get_mut(identity) {
            Some(connection) => {
                connection.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Removes the connection, purges its room memberships and closes its
    /// transport as one step. Returns whether anything was retired.
    pub fn retire(&mut self, rooms: &mut RoomRegistry, identity: &str) -> bool {
        let Some(connection) = self.connections.remove(identity) else {
            return false;
        };

        let left = rooms.purge(identity);
        connection.close_transport();
        debug!(
            "Retired connection {} for {} (connected since {}, left {} room(s))",
            connection.id.as_str(),
            identity,
            connection.connected_at.to_rfc3339(),
            left.len()
        );
        true
    }

    /// `retire`, but only if the live connection is still the one identified by
    /// `connection_id`.
    pub fn retire_if_current(
        &mut self,
        rooms: &mut RoomRegistry,
        identity: &str,
        connection_id: &ConnectionId,
    ) -> bool {
        if self.is_current(identity, connection_id) {
            self.retire(rooms, identity)
        } else {
            false
        }
    }

    pub fn is_current(&self, identity: &str, connection_id: &ConnectionId) -> bool {
        self.connections
            .get(identity)
            .is_some_and(|connection| &connection.id == connection_id)
    }

    pub fn get(&self, identity: &str) -> Option<&Connection> {
        self.connections.get(identity)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }
}

/// Both registries behind the one guard that serializes every mutation.
#[derive(Debug, Default)]
pub struct Registries {
    pub connections: ConnectionRegistry,
    pub rooms: RoomRegistry,
}

pub type SharedRegistries = Arc<Mutex<Registries>>;
