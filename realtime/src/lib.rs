//! Real-time event distribution for HR and property-manager dashboards.
//!
//! This crate keeps track of every live dashboard connection and pushes
//! business events (new applications, approvals, onboarding progress, system
//! notices) to the clients allowed to see them.
//!
//! # Architecture
//!
//! - **Single connection per identity**: registering again for an identity
//!   retires the previous connection in the same step.
//! - **Rooms**: one `global` room for elevated users and one `tenant-<scope>`
//!   room per property. Visibility is enforced when a client joins a room, so
//!   delivery only has to resolve membership.
//! - **One guard**: connection and room registries sit behind a single mutex.
//!   Nothing holds it across an await.
//! - **One writer per transport**: each connection has a bounded FIFO queue
//!   drained by one task, so a recipient sees events in the order they were
//!   queued for it.
//! - **Ephemeral delivery**: offline identities miss events and reload fresh
//!   data on reconnect.
//!
//! # Message Flow
//!
//! 1. The web layer authenticates the bearer credential and calls
//!    `Dispatcher::connect` with the resolved `Principal`
//! 2. The connection joins its default rooms and receives
//!    `connection_established`
//! 3. Inbound frames go through `Dispatcher::handle_client_frame`
//! 4. Business code publishes a `DomainEvent`; `RealtimeDomainEventHandler`
//!    turns it into a `BroadcastEvent` and calls `Dispatcher::broadcast`
//! 5. `HeartbeatMonitor` evicts connections that stop showing activity
//!
//! # Example: notifying a single user
//!
//! ```rust,ignore
//! let delivered = app_state
//!     .dispatcher
//!     .notify_user("hr-1", "system_notice", json!({"message": "Payroll closes today"}))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - `access`: role/room decision table
//! - `auth`: seam for the external credential resolver
//! - `rooms`: room ids and membership
//! - `connection`: connection registry and the shared guard
//! - `heartbeat`: stale-connection sweeper
//! - `dispatcher`: inbound handling and outbound fan-out
//! - `message`: wire envelopes and broadcast values
//! - `domain_event_handler`: bridge from `events::DomainEvent`

pub mod access;
pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod domain_event_handler;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod rooms;

pub use access::{Identity, Principal, Role, TenantScope};
pub use auth::Authenticator;
pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use domain_event_handler::RealtimeDomainEventHandler;
pub use heartbeat::{HeartbeatMonitor, HeartbeatSettings};
pub use message::{BroadcastEvent, DeliveryReport, EventTarget, Frame, StatsSnapshot};
pub use rooms::RoomId;
