//! Poll Scheduler - periodic, source-parallel refresh cycles
//!
//! Each cycle refreshes every supervisor concurrently and waits for all of
//! them; the period is slept *after* the cycle completes, so a slow source
//! delays the next cycle. There is no per-source timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::application::multivisor::Multivisor;
use crate::application::supervisor_tracker::SupervisorTracker;

/// Refresh all supervisors concurrently
///
/// Failures are logged per source and never affect the other sources.
///
/// # Returns
/// Number of supervisors whose state changed
pub async fn refresh_all(supervisors: &[Arc<SupervisorTracker>]) -> usize {
    let results = join_all(supervisors.iter().map(|supervisor| async move {
        let result = supervisor.refresh().await;
        (supervisor.name(), result)
    }))
    .await;

    let mut modified = 0;
    for (name, result) in results {
        match result {
            Ok(true) => modified += 1,
            Ok(false) => {}
            Err(e) => warn!(
                supervisor = %name,
                error = %e,
                "Refresh failed, retrying next poll"
            ),
        }
    }
    modified
}

/// Drives `Multivisor::poll_supervisors` until stopped
pub struct Poller {
    multivisor: Arc<Multivisor>,
    period: Duration,
}

impl Poller {
    pub fn new(multivisor: Arc<Multivisor>, period: Duration) -> Self {
        Self { multivisor, period }
    }

    /// Start the poll loop on the runtime
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(stop_rx).await });
        PollerHandle { stop_tx, task }
    }

    /// Poll, sleep, repeat until `stop` flips to true
    ///
    /// A cycle in progress always completes. Dropping the sending side
    /// also ends the loop, since nothing could stop it afterwards.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(period_ms = self.period.as_millis() as u64, "Poller started");
        while !*stop.borrow_and_update() {
            let modified = self.multivisor.poll_supervisors().await;
            debug!(modified, "Poll cycle complete");

            tokio::select! {
                _ = sleep(self.period) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        warn!("Poller handle dropped, stopping");
                        break;
                    }
                }
            }
        }
        info!("Poller stopped");
    }
}

/// Owner of a spawned poll loop
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Ask the loop to stop and wait up to `grace` for it to finish
    ///
    /// # Returns
    /// false if the loop was still busy when `grace` ran out
    pub async fn stop(self, grace: Duration) -> bool {
        if self.stop_tx.send(true).is_err() {
            debug!("Poller already stopped");
        }
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Poller task failed");
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_bus::EventBus;
    use crate::domain::{MultivisorConfig, SupervisorConfig};
    use crate::port::config_source::mocks::StaticConfigSource;
    use crate::port::supervisor_rpc::mocks::{MockConnector, MockSupervisorRpc};
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use std::time::Instant;

    fn bus() -> EventBus {
        EventBus::new(64, Arc::new(FixedTimeProvider::new(0)))
    }

    #[tokio::test]
    async fn test_parallel_refresh_bounded_by_slowest_source() {
        let latency = Duration::from_millis(100);
        let supervisors: Vec<Arc<SupervisorTracker>> = (0..5)
            .map(|i| {
                let rpc = Arc::new(MockSupervisorRpc::new());
                rpc.set_latency(latency);
                Arc::new(SupervisorTracker::new(
                    SupervisorConfig::new(format!("s{}", i)),
                    rpc,
                    bus(),
                ))
            })
            .collect();

        // getPID + 4 metadata calls + getAllProcessInfo per source
        let started = Instant::now();
        assert_eq!(refresh_all(&supervisors).await, 5);
        let elapsed = started.elapsed();

        assert!(
            elapsed < latency * 6 * 3,
            "expected ~{:?}, took {:?}",
            latency * 6,
            elapsed
        );
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_affect_others() {
        let healthy = Arc::new(MockSupervisorRpc::new());
        let broken = Arc::new(MockSupervisorRpc::new());
        broken.fail_metadata(true);
        let supervisors = vec![
            Arc::new(SupervisorTracker::new(SupervisorConfig::new("ok"), healthy, bus())),
            Arc::new(SupervisorTracker::new(SupervisorConfig::new("bad"), broken, bus())),
        ];

        assert_eq!(refresh_all(&supervisors).await, 1);
        assert!(supervisors[0].snapshot().await.running);
        assert!(!supervisors[1].snapshot().await.running);
    }

    fn multivisor(connector: Arc<MockConnector>) -> Arc<Multivisor> {
        let config = MultivisorConfig {
            supervisors: vec![SupervisorConfig::new("lid001")],
            ..Default::default()
        };
        Arc::new(
            Multivisor::load(Arc::new(StaticConfigSource::new(config)), connector, bus()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_poller_stops_when_asked() {
        let connector = Arc::new(MockConnector::new());
        let handle = Poller::new(multivisor(connector.clone()), Duration::from_millis(10)).spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.stop(Duration::from_secs(1)).await);

        let calls = connector.client("lid001").calls().len();
        assert!(calls > 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.client("lid001").calls().len(), calls);
    }

    #[tokio::test]
    async fn test_poller_stops_when_sender_dropped() {
        let connector = Arc::new(MockConnector::new());
        let poller = Poller::new(multivisor(connector.clone()), Duration::from_secs(60));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move { poller.run(stop_rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(stop_tx);

        let joined = tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(1), task).await);
        assert!(joined.is_ok());
        // One cycle ran before the sender went away
        assert_eq!(connector.client("lid001").calls()[0], "getPID");
    }

    #[tokio::test]
    async fn test_stop_before_first_cycle_skips_polling() {
        let connector = Arc::new(MockConnector::new());
        let poller = Poller::new(multivisor(connector.clone()), Duration::from_millis(10));
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        poller.run(stop_rx).await;
        assert!(connector.client("lid001").calls().is_empty());
    }
}
