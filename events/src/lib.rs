//! Domain events emitted by the HR and property-management request paths.
//!
//! This crate decouples business logic from delivery. Request handlers publish
//! a `DomainEvent` once their own work has been committed; registered
//! `EventHandler`s (the real-time dispatcher bridge among them) take it from
//! there.
//!
//! # Architecture
//!
//! - **DomainEvent**: every business event that can reach a dashboard
//! - **EventHandler**: trait for anything that reacts to domain events
//! - **EventPublisher**: fans an event out to the registered handlers
//!
//! The crate has no internal dependencies. Entity data travels as
//! serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Entity id type used across the platform.
pub type Id = Uuid;

/// Business-level changes that dashboards care about.
///
/// `tenant` is the property/location the change belongs to. Events carrying a
/// tenant reach that tenant's room and the global room; `notify_user_ids`
/// adds individual recipients on top.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A candidate submitted a job application for a property.
    ApplicationSubmitted {
        tenant: String,
        application_id: Id,
        /// Serialized application summary for optimistic UI updates.
        application: Value,
        notify_user_ids: Vec<String>,
    },
    ApplicationApproved {
        tenant: String,
        application_id: Id,
        approved_by: String,
        notify_user_ids: Vec<String>,
    },
    ApplicationRejected {
        tenant: String,
        application_id: Id,
        rejected_by: String,
        reason: Option<String>,
        notify_user_ids: Vec<String>,
    },
    /// An onboarding session advanced (document signed, step completed).
    OnboardingProgressed {
        tenant: String,
        employee_id: Id,
        completed_steps: u32,
        total_steps: u32,
        notify_user_ids: Vec<String>,
    },
    /// Operator notice. Always reaches the global room, plus any listed
    /// tenants and users.
    SystemNotice {
        message: String,
        tenants: Vec<String>,
        notify_user_ids: Vec<String>,
    },
}

impl DomainEvent {
    /// Wire name of the event as seen by dashboard clients.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ApplicationSubmitted { .. } => "application_submitted",
            DomainEvent::ApplicationApproved { .. } => "application_approved",
            DomainEvent::ApplicationRejected { .. } => "application_rejected",
            DomainEvent::OnboardingProgressed { .. } => "onboarding_progressed",
            DomainEvent::SystemNotice { .. } => "system_notice",
        }
    }
}

/// Trait for handling domain events.
/// Implementations perform side effects like pushing dashboard updates.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.seen.lock().unwrap().push(event.event_type());
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_handler_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let publisher = EventPublisher::new()
            .with_handler(first.clone())
            .with_handler(second.clone());

        publisher
            .publish(DomainEvent::SystemNotice {
                message: "maintenance at 22:00".into(),
                tenants: vec![],
                notify_user_ids: vec![],
            })
            .await;
        publisher
            .publish(DomainEvent::ApplicationApproved {
                tenant: "P1".into(),
                application_id: Id::new_v4(),
                approved_by: "hr-1".into(),
                notify_user_ids: vec![],
            })
            .await;

        let expected = vec!["system_notice", "application_approved"];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        assert_eq!(*second.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn publish_without_handlers_is_a_noop() {
        EventPublisher::default()
            .publish(DomainEvent::SystemNotice {
                message: "noop".into(),
                tenants: vec![],
                notify_user_ids: vec![],
            })
            .await;
    }
}
