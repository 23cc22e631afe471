//! # Change event bus
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`]. Trackers
//! publish structured [`ChangeEvent`]s; the [`SubscriberBroker`] is the only
//! built-in receiver and turns them into wire frames.
//!
//! ```text
//! SupervisorTracker ──┐
//! ProcessTracker    ──┼──► EventBus ───► SubscriberBroker ───► client queues
//! ProcessTracker    ──┘  (broadcast)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits on receivers.
//! - **Bounded capacity**: receivers that fall behind observe `Lagged(n)`.
//! - **No persistence**: events published with no receiver are dropped.
//!
//! [`SubscriberBroker`]: crate::application::broker::SubscriberBroker

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Level;

use crate::domain::{ChangeEvent, LogRecord, Process, Supervisor};
use crate::port::TimeProvider;

/// Injectable publish/subscribe channel for change events
///
/// Cheap to clone; every clone publishes into the same channel and stamps
/// events with the same clock.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<ChangeEvent>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EventBus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize, time_provider: Arc<dyn TimeProvider>) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx, time_provider }
    }

    /// Publishes an event, returning how many receivers will observe it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// A receiver only sees events sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.tx.subscribe()
    }

    pub fn publish_supervisor(&self, supervisor: Supervisor) -> usize {
        self.publish(ChangeEvent::supervisor_changed(supervisor, self.now()))
    }

    pub fn publish_process(&self, process: Process) -> usize {
        self.publish(ChangeEvent::process_changed(process, self.now()))
    }

    pub fn publish_log(&self, level: Level, name: impl Into<String>, message: impl Into<String>) -> usize {
        let now = self.now();
        let record = LogRecord {
            message: message.into(),
            level: level.to_string(),
            time: now as f64 / 1000.0,
            name: name.into(),
        };
        self.publish(ChangeEvent::log(record, now))
    }

    fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, EventPayload};
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn bus() -> EventBus {
        EventBus::new(16, Arc::new(FixedTimeProvider::new(1_500)))
    }

    #[tokio::test]
    async fn test_publish_without_receivers_is_dropped() {
        let bus = bus();
        assert_eq!(bus.publish_log(Level::INFO, "multivisor", "nobody listens"), 0);
    }

    #[tokio::test]
    async fn test_log_record_is_stamped() {
        let bus = bus();
        let mut rx = bus.subscribe();
        bus.publish_log(Level::INFO, "multivisor.web:api@s", "hello");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Log);
        assert_eq!(event.timestamp, 1_500);
        match &event.payload {
            EventPayload::Log(record) => {
                assert_eq!(record.level, "INFO");
                assert_eq!(record.time, 1.5);
                assert_eq!(record.message, "hello");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_receiver_sees_every_event() {
        let bus = bus();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish_log(Level::WARN, "m", "x"), 2);
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }
}
