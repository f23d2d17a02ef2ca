use crate::message::{BroadcastEvent, EventTarget};
use crate::rooms::RoomId;
use crate::Dispatcher;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use serde_json::json;
use std::sync::Arc;

/// Handles domain events by converting them into broadcast events and handing
/// them to the dispatcher.
///
/// The domain layer decides which tenant an event belongs to and which users
/// should additionally hear about it. This handler only maps that onto rooms.
pub struct RealtimeDomainEventHandler {
    dispatcher: Arc<Dispatcher>,
}

impl RealtimeDomainEventHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Tenant events go to the tenant room and to the global room, where
    /// elevated users watch every tenant.
    fn tenant_target(tenant: &str, notify_user_ids: &[String]) -> EventTarget {
        EventTarget::rooms([RoomId::tenant(tenant), RoomId::Global])
            .and_identities(notify_user_ids.iter().cloned())
    }

    pub fn to_broadcast(event: &DomainEvent) -> BroadcastEvent {
        let event_type = event.event_type();
        match event {
            DomainEvent::ApplicationSubmitted {
                tenant,
                application_id,
                application,
                notify_user_ids,
            } => BroadcastEvent::new(
                event_type,
                json!({
                    "tenant": tenant,
                    "application_id": application_id,
                    "application": application,
                }),
                Self::tenant_target(tenant, notify_user_ids),
            ),
            DomainEvent::ApplicationApproved {
                tenant,
                application_id,
                approved_by,
                notify_user_ids,
            } => BroadcastEvent::new(
                event_type,
                json!({
                    "tenant": tenant,
                    "application_id": application_id,
                    "approved_by": approved_by,
                }),
                Self::tenant_target(tenant, notify_user_ids),
            ),
            DomainEvent::ApplicationRejected {
                tenant,
                application_id,
                rejected_by,
                reason,
                notify_user_ids,
            } => BroadcastEvent::new(
                event_type,
                json!({
                    "tenant": tenant,
                    "application_id": application_id,
                    "rejected_by": rejected_by,
                    "reason": reason,
                }),
                Self::tenant_target(tenant, notify_user_ids),
            ),
            DomainEvent::OnboardingProgressed {
                tenant,
                employee_id,
                completed_steps,
                total_steps,
                notify_user_ids,
            } => BroadcastEvent::new(
                event_type,
                json!({
                    "tenant": tenant,
                    "employee_id": employee_id,
                    "completed_steps": completed_steps,
                    "total_steps": total_steps,
                }),
                Self::tenant_target(tenant, notify_user_ids),
            ),
            DomainEvent::SystemNotice {
                message,
                tenants,
                notify_user_ids,
            } => {
                let rooms = std::iter::once(RoomId::Global)
                    .chain(tenants.iter().map(|tenant| RoomId::tenant(tenant.as_str())));
                BroadcastEvent::new(
                    event_type,
                    json!({ "message": message }),
                    EventTarget::rooms(rooms).and_identities(notify_user_ids.iter().cloned()),
                )
            }
        }
    }
}

#[async_trait]
impl EventHandler for RealtimeDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let broadcast = Self::to_broadcast(event);
        let report = self.dispatcher.broadcast(&broadcast).await;

        debug!(
            "Delivered {} to {}/{} recipient(s)",
            broadcast.event_type, report.delivered, report.attempted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Principal;
    use crate::message::Frame;
    use events::{EventPublisher, Id};
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn event_types(rx: &mut mpsc::Receiver<Frame>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Some(text) = frame.text() {
                let value: Value = serde_json::from_str(text).unwrap();
                types.push(value["type"].as_str().unwrap().to_string());
            }
        }
        types
    }

    #[test]
    fn tenant_events_target_tenant_and_global_rooms() {
        let event = DomainEvent::ApplicationSubmitted {
            tenant: "P1".into(),
            application_id: Id::new_v4(),
            application: json!({"position": "Leasing Agent"}),
            notify_user_ids: vec!["hr-7".into()],
        };

        let broadcast = RealtimeDomainEventHandler::to_broadcast(&event);

        assert_eq!(broadcast.event_type, "application_submitted");
        assert_eq!(
            broadcast.target.rooms,
            vec![RoomId::tenant("P1"), RoomId::Global]
        );
        assert_eq!(broadcast.target.identities, vec!["hr-7".to_string()]);
        assert_eq!(broadcast.payload["application"]["position"], "Leasing Agent");
    }

    #[test]
    fn system_notices_always_include_global() {
        let event = DomainEvent::SystemNotice {
            message: "maintenance".into(),
            tenants: vec!["P1".into(), "P2".into()],
            notify_user_ids: vec![],
        };

        let broadcast = RealtimeDomainEventHandler::to_broadcast(&event);

        assert_eq!(
            broadcast.target.rooms,
            vec![RoomId::Global, RoomId::tenant("P1"), RoomId::tenant("P2")]
        );
    }

    #[tokio::test]
    async fn published_events_respect_tenant_visibility() {
        let dispatcher = Arc::new(Dispatcher::default());
        let (hr_tx, mut hr_rx) = mpsc::channel(8);
        let (p1_tx, mut p1_rx) = mpsc::channel(8);
        let (p2_tx, mut p2_rx) = mpsc::channel(8);
        dispatcher.connect(Principal::elevated("hr-1"), hr_tx);
        dispatcher.connect(Principal::scoped("mgr-1", "P1"), p1_tx);
        dispatcher.connect(Principal::scoped("mgr-2", "P2"), p2_tx);

        let publisher = EventPublisher::new()
            .with_handler(Arc::new(RealtimeDomainEventHandler::new(dispatcher.clone())));
        publisher
            .publish(DomainEvent::OnboardingProgressed {
                tenant: "P1".into(),
                employee_id: Id::new_v4(),
                completed_steps: 3,
                total_steps: 5,
                notify_user_ids: vec![],
            })
            .await;

        assert_eq!(
            event_types(&mut hr_rx),
            vec!["connection_established", "onboarding_progressed"]
        );
        assert_eq!(
            event_types(&mut p1_rx),
            vec!["connection_established", "onboarding_progressed"]
        );
        assert_eq!(event_types(&mut p2_rx), vec!["connection_established"]);
    }
}
