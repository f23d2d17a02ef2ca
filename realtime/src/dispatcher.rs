use crate::access::{self, Identity, Principal};
use crate::connection::{ConnectionId, Registration, Registries, SendHandle, SharedRegistries};
use crate::error::{Error, ErrorKind};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatSettings};
use crate::message::{
    BroadcastEvent, ClientMessage, ControlMessage, DeliveryReport, EventTarget, Frame,
    StatsSnapshot,
};
use crate::rooms::RoomId;
use chrono::Utc;
use futures_util::future::join_all;
use log::*;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Upper bound on how long one recipient may hold up a send.
    pub send_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(2),
        }
    }
}

/// A resolved recipient, captured while holding the registry guard so the
/// send itself can proceed without it.
struct Recipient {
    identity: Identity,
    connection_id: ConnectionId,
    sender: SendHandle,
}

/// Façade over the registries, the access policy and the heartbeat monitor.
///
/// Client handlers and producers only ever reach shared state through here.
/// Every registry mutation happens under one guard and no guard is held
/// across an await.
pub struct Dispatcher {
    registries: SharedRegistries,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(settings: DispatcherSettings) -> Self {
        Self {
            registries: Arc::new(Mutex::new(Registries::default())),
            settings,
        }
    }

    /// Builds a heartbeat monitor that sweeps this dispatcher's registries.
    pub fn heartbeat_monitor(&self, settings: HeartbeatSettings) -> HeartbeatMonitor {
        HeartbeatMonitor::new(self.registries.clone(), settings)
    }

    /// Registers an authenticated client, replacing any previous connection for
    /// the same identity, joins the role's default rooms and queues the
    /// `connection_established` frame ahead of anything else.
    pub fn connect(&self, principal: Principal, sender: SendHandle) -> Registration {
        let mut guard = self.registries.lock();
        let registries = &mut *guard;

        let registration = registries.connections.register(
            &mut registries.rooms,
            principal.clone(),
            sender.clone(),
            Instant::now(),
        );

        let mut rooms = Vec::new();
        for room in access::default_rooms(&principal.role) {
            match registries.rooms.subscribe(&principal, &room) {
                Ok(_) => rooms.push(room),
                Err(e) => warn!("Default subscription of {} to {room} failed: {e}", principal.identity),
            }
        }

        let established = ControlMessage::ConnectionEstablished {
            identity: principal.identity.clone(),
            role: principal.role.name(),
            tenant_scope: principal.role.tenant_scope().map(|s| s.to_string()),
            rooms,
            server_time: Utc::now(),
        };
        match established.to_frame() {
            Ok(frame) => {
                if let Err(e) = sender.try_send(frame) {
                    warn!(
                        "Failed to queue connection_established for {}: {e}",
                        principal.identity
                    );
                }
            }
            Err(e) => error!("Failed to serialize connection_established: {e}"),
        }

        info!(
            "Registered {} connection for {}",
            principal.role.name(),
            principal.identity
        );
        registration
    }

    /// Cleanup path for a connection handler whose transport ended. Leaves a
    /// newer connection of the same identity alone.
    pub fn disconnect(&self, identity: &str, connection_id: &ConnectionId) -> bool {
        let mut guard = self.registries.lock();
        let registries = &mut *guard;
        let retired = registries.connections.retire_if_current(
            &mut registries.rooms,
            identity,
            connection_id,
        );
        if retired {
            info!("Connection for {identity} closed");
        }
        retired
    }

    /// Marks transport-level activity (e.g. a pong) for the connection.
    pub fn touch(&self, identity: &str, connection_id: &ConnectionId) -> bool {
        let mut registries = self.registries.lock();
        registries.connections.is_current(identity, connection_id)
            && registries.connections.touch(identity, Instant::now())
    }

    /// Handles one inbound text frame from a client and queues the reply on
    /// the same connection. Bad input yields an `error` reply; the connection
    /// stays open. Returns `None` when the connection was already displaced.
    pub async fn handle_client_frame(
        &self,
        identity: &str,
        connection_id: &ConnectionId,
        raw: &str,
    ) -> Option<ControlMessage> {
        let (reply, sender) = {
            let mut guard = self.registries.lock();
            let registries = &mut *guard;
            if !registries.connections.is_current(identity, connection_id) {
                return None;
            }

            let reply = match ClientMessage::parse(raw) {
                Ok(message) => {
                    registries.connections.touch(identity, Instant::now());
                    Self::process(registries, identity, message)
                }
                Err(e) => {
                    debug!("Malformed message from {identity}: {e}");
                    ControlMessage::error(&e)
                }
            };
            let sender = registries
                .connections
                .get(identity)
                .map(|connection| connection.sender().clone())?;
            (reply, sender)
        };

        match reply.to_frame() {
            Ok(frame) => {
                if self.push(&sender, frame).await.is_err() {
                    warn!("Failed to deliver reply to {identity}, retiring connection");
                    self.disconnect(identity, connection_id);
                }
            }
            Err(e) => error!("Failed to serialize reply for {identity}: {e}"),
        }

        Some(reply)
    }

    fn process(registries: &mut Registries, identity: &str, message: ClientMessage) -> ControlMessage {
        let Some(principal) = registries
            .connections
            .get(identity)
            .map(|connection| connection.principal.clone())
        else {
            return ControlMessage::error(&Error::new(ErrorKind::StaleConnection));
        };

        match message {
            ClientMessage::Subscribe { room } => {
                let result = room
                    .parse::<RoomId>()
                    .and_then(|room_id| {
                        registries
                            .rooms
                            .subscribe(&principal, &room_id)
                            .map(|_| room_id)
                    });
                match result {
                    Ok(room) => {
                        debug!("{identity} subscribed to {room}");
                        ControlMessage::SubscribeSuccess { room }
                    }
                    Err(e) => {
                        debug!("{identity} denied subscription to {room}: {e}");
                        ControlMessage::SubscribeError {
                            room,
                            code: e.code(),
                            message: e.to_string(),
                        }
                    }
                }
            }
            ClientMessage::Unsubscribe { room } => {
                // A room id that does not parse cannot have members, so there
                // is nothing to leave.
                if let Ok(room_id) = room.parse::<RoomId>() {
                    registries.rooms.unsubscribe(identity, &room_id);
                }
                ControlMessage::UnsubscribeSuccess { room }
            }
            ClientMessage::Heartbeat => ControlMessage::HeartbeatAck {
                server_time: Utc::now(),
            },
            ClientMessage::GetStats => {
                if access::may_read_stats(&principal.role) {
                    ControlMessage::Stats(Self::snapshot(registries))
                } else {
                    ControlMessage::error(&Error::permission_denied(
                        "statistics require an elevated role",
                    ))
                }
            }
        }
    }

    /// Delivers `event` to the union of its target rooms' members and target
    /// identities. Each recipient gets at most one copy. Slow or broken
    /// recipients are retired and never fail the call.
    pub async fn broadcast(&self, event: &BroadcastEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} event: {e}", event.event_type);
                return report;
            }
        };

        let recipients = self.resolve(&event.target, &mut report);
        report.attempted = recipients.len();

        let sends = recipients.into_iter().map(|recipient| {
            let frame = frame.clone();
            async move {
                let result = self.push(&recipient.sender, frame).await;
                (recipient, result)
            }
        });

        let mut failed = Vec::new();
        for (recipient, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver {} to {}: {e}. Retiring connection.",
                        event.event_type, recipient.identity
                    );
                    failed.push(recipient);
                }
            }
        }

        if !failed.is_empty() {
            let mut guard = self.registries.lock();
            let registries = &mut *guard;
            for recipient in &failed {
                registries.connections.retire_if_current(
                    &mut registries.rooms,
                    &recipient.identity,
                    &recipient.connection_id,
                );
            }
        }
        report.failed = failed.into_iter().map(|r| r.identity).collect();

        debug!(
            "Broadcast {}: attempted={} delivered={} failed={} not_connected={}",
            event.event_type,
            report.attempted,
            report.delivered,
            report.failed.len(),
            report.not_connected.len()
        );
        report
    }

    /// Sends one event to a single identity. Returns whether it was delivered.
    pub async fn notify_user(&self, identity: &str, event_type: &str, payload: Value) -> bool {
        let event = BroadcastEvent::new(event_type, payload, EventTarget::identity(identity));
        self.broadcast(&event).await.delivered == 1
    }

    pub fn stats(&self) -> StatsSnapshot {
        Self::snapshot(&self.registries.lock())
    }

    pub fn connection_count(&self) -> usize {
        self.registries.lock().connections.count()
    }

    fn snapshot(registries: &Registries) -> StatsSnapshot {
        StatsSnapshot {
            connections: registries.connections.count(),
            rooms: registries.rooms.room_count(),
            room_members: registries.rooms.member_counts(),
        }
    }

    fn resolve(&self, target: &EventTarget, report: &mut DeliveryReport) -> Vec<Recipient> {
        let registries = self.registries.lock();
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        let room_members = target
            .rooms
            .iter()
            .flat_map(|room| registries.rooms.members_of(room));
        for identity in room_members {
            if !seen.insert(identity.as_str()) {
                continue;
            }
            if let Some(connection) = registries.connections.get(identity) {
                recipients.push(Recipient {
                    identity: identity.clone(),
                    connection_id: connection.id.clone(),
                    sender: connection.sender().clone(),
                });
            }
        }

        for identity in &target.identities {
            if !seen.insert(identity.as_str()) {
                continue;
            }
            match registries.connections.get(identity) {
                Some(connection) => recipients.push(Recipient {
                    identity: identity.clone(),
                    connection_id: connection.id.clone(),
                    sender: connection.sender().clone(),
                }),
                None => report.not_connected.push(identity.clone()),
            }
        }

        recipients
    }

    /// One bounded send into a connection's queue.
    async fn push(&self, sender: &SendHandle, frame: Frame) -> Result<(), Error> {
        match tokio::time::timeout(self.settings.send_timeout, sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::new(ErrorKind::DeliveryFailure).with_source(e)),
            Err(e) => Err(Error::new(ErrorKind::DeliveryFailure).with_source(e)),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherSettings::default())
    }
}
