use crate::access::Identity;
use crate::connection::SharedRegistries;
use log::*;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Period between sweeps.
    pub interval: Duration,
    /// Connections idle longer than this are retired.
    pub stale_after: Duration,
    /// Connections idle longer than this (but not yet stale) get a transport
    /// ping. `None` disables probing.
    pub probe_after: Option<Duration>,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
            probe_after: Some(Duration::from_secs(20)),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<Identity>,
    pub probed: usize,
}

/// Periodically evicts connections that stopped showing activity.
pub struct HeartbeatMonitor {
    registries: SharedRegistries,
    settings: HeartbeatSettings,
}

impl HeartbeatMonitor {
    pub fn new(registries: SharedRegistries, settings: HeartbeatSettings) -> Self {
        Self {
            registries,
            settings,
        }
    }

    /// Runs one sweep against `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let mut guard = self.registries.lock();
        let registries = &mut *guard;

        for connection in registries.connections.all() {
            let idle = connection.idle_for(now);

            if idle > self.settings.stale_after {
                debug!(
                    "Heartbeat timeout for {} after {:?} idle",
                    connection.identity(),
                    idle
                );
                report.evicted.push(connection.identity().clone());
                continue;
            }

            let Some(probe_after) = self.settings.probe_after else {
                continue;
            };
            if idle <= probe_after {
                continue;
            }

            match connection.probe() {
                Ok(()) => report.probed += 1,
                // Queue backed up; the writer is still alive, so let the
                // staleness threshold decide.
                Err(TrySendError::Full(_)) => {
                    trace!("Skipping probe for {}, queue full", connection.identity());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        "Probe failed for {}, transport already gone",
                        connection.identity()
                    );
                    report.evicted.push(connection.identity().clone());
                }
            }
        }

        for identity in &report.evicted {
            registries
                .connections
                .retire(&mut registries.rooms, identity);
        }

        if !report.evicted.is_empty() {
            info!(
                "Heartbeat sweep evicted {} stale connection(s)",
                report.evicted.len()
            );
        }

        report
    }

    /// Sweeps on a fixed period until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Heartbeat monitor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Principal;
    use crate::connection::Registries;
    use crate::message::Frame;
    use crate::rooms::RoomId;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn settings() -> HeartbeatSettings {
        HeartbeatSettings {
            interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
            probe_after: Some(Duration::from_secs(20)),
        }
    }

    fn register(
        registries: &SharedRegistries,
        principal: Principal,
        at: Instant,
    ) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(4);
        let mut guard = registries.lock();
        let registries = &mut *guard;
        for room in crate::access::default_rooms(&principal.role) {
            registries.rooms.subscribe(&principal, &room).unwrap();
        }
        registries
            .connections
            .register(&mut registries.rooms, principal, tx, at);
        rx
    }

    #[test]
    fn stale_connections_are_evicted_and_purged_from_rooms() {
        let registries: SharedRegistries = Arc::new(Mutex::new(Registries::default()));
        let start = Instant::now();
        let _stale = register(&registries, Principal::scoped("mgr-1", "P1"), start);
        let _fresh = register(
            &registries,
            Principal::elevated("hr-1"),
            start + Duration::from_secs(25),
        );

        let monitor = HeartbeatMonitor::new(registries.clone(), settings());
        let report = monitor.sweep(start + Duration::from_secs(31));

        assert_eq!(report.evicted, vec!["mgr-1".to_string()]);
        let guard = registries.lock();
        assert!(guard.connections.get("mgr-1").is_none());
        assert!(guard.connections.get("hr-1").is_some());
        assert_eq!(guard.rooms.members_of(&RoomId::tenant("P1")).count(), 0);
    }

    #[test]
    fn idle_connections_are_probed_before_eviction() {
        let registries: SharedRegistries = Arc::new(Mutex::new(Registries::default()));
        let start = Instant::now();
        let mut rx = register(&registries, Principal::elevated("hr-1"), start);

        let monitor = HeartbeatMonitor::new(registries.clone(), settings());
        let report = monitor.sweep(start + Duration::from_secs(21));

        assert_eq!(report.probed, 1);
        assert!(report.evicted.is_empty());
        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);
    }

    #[test]
    fn probe_on_closed_transport_retires_immediately() {
        let registries: SharedRegistries = Arc::new(Mutex::new(Registries::default()));
        let start = Instant::now();
        let rx = register(&registries, Principal::elevated("hr-1"), start);
        let _other = register(&registries, Principal::elevated("hr-2"), start);
        drop(rx);

        let monitor = HeartbeatMonitor::new(registries.clone(), settings());
        let report = monitor.sweep(start + Duration::from_secs(21));

        // The broken connection does not stop the sweep from probing the rest.
        assert_eq!(report.evicted, vec!["hr-1".to_string()]);
        assert_eq!(report.probed, 1);
        assert_eq!(registries.lock().connections.count(), 1);
    }

    #[test]
    fn probing_can_be_disabled() {
        let registries: SharedRegistries = Arc::new(Mutex::new(Registries::default()));
        let start = Instant::now();
        let mut rx = register(&registries, Principal::elevated("hr-1"), start);

        let monitor = HeartbeatMonitor::new(
            registries,
            HeartbeatSettings {
                probe_after: None,
                ..settings()
            },
        );
        let report = monitor.sweep(start + Duration::from_secs(25));

        assert_eq!(report, SweepReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_periodically_until_shutdown() {
        let registries: SharedRegistries = Arc::new(Mutex::new(Registries::default()));
        let _rx = register(&registries, Principal::elevated("hr-1"), Instant::now());

        let shutdown = CancellationToken::new();
        let handle = HeartbeatMonitor::new(registries.clone(), settings()).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(registries.lock().connections.count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
