use config::Config;
use events::EventPublisher;
use log::info;
use realtime::{Authenticator, Dispatcher, RealtimeDomainEventHandler};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the dispatcher and wires it behind the domain event publisher.
pub fn init_realtime(config: &Config) -> (Arc<Dispatcher>, EventPublisher) {
    let settings = config.dispatcher_settings();
    info!(
        "Realtime config: send_timeout={:?}, outbound_buffer={}, heartbeat={:?}",
        settings.send_timeout,
        config.outbound_buffer,
        config.heartbeat_settings(),
    );

    let dispatcher = Arc::new(Dispatcher::new(settings));
    let event_publisher = EventPublisher::new().with_handler(Arc::new(
        RealtimeDomainEventHandler::new(dispatcher.clone()),
    ));

    (dispatcher, event_publisher)
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
    pub event_publisher: EventPublisher,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(
        app_config: Config,
        dispatcher: Arc<Dispatcher>,
        event_publisher: EventPublisher,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config: app_config,
            dispatcher,
            event_publisher,
            authenticator,
        }
    }
}
