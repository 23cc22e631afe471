//! # Subscriber broker: per-client fan-out of change events.
//!
//! ```text
//! EventBus ──► run() ──► dispatch(event)
//!                           │ encode once: "data: <JSON>\n\n"
//!                           ├──► [queue 1] ──► stream client 1
//!                           ├──► [queue 2] ──► stream client 2
//!                           └──► [queue N] ──► stream client N
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `dispatch()` uses `try_send`, a stalled client never
//!   delays the others or the publishers.
//! - **Overflow**: a full queue drops that frame for that client only.
//! - **Copy-on-iterate**: senders are cloned out of the registry before
//!   fan-out, so `subscribe`/`unsubscribe` may race with `dispatch` safely.
//! - **Guaranteed cleanup**: dropping a [`Subscription`] unregisters it, on
//!   every exit path of the delivery loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::event_bus::EventBus;
use crate::domain::{ChangeEvent, EventKind, EventPayload};

/// One serialized event-stream frame
pub type Frame = Arc<str>;

#[derive(Serialize)]
struct WireEvent<'a> {
    payload: &'a EventPayload,
    event: EventKind,
}

/// Encode an event as `data: {"payload": .., "event": ..}\n\n`
pub fn encode_frame(event: &ChangeEvent) -> Result<Frame, serde_json::Error> {
    let data = serde_json::to_string(&WireEvent {
        payload: &event.payload,
        event: event.kind(),
    })?;
    Ok(Arc::from(format!("data: {}\n\n", data)))
}

/// Registry of live streaming subscribers
pub struct SubscriberBroker {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Frame>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl SubscriberBroker {
    /// Minimum queue capacity is 1 (clamped)
    pub fn new(queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        })
    }

    /// Subscribe to the bus and spawn the forwarding loop.
    ///
    /// The bus receiver is created before returning, so nothing published
    /// afterwards is missed.
    pub fn spawn(bus: &EventBus, queue_capacity: usize) -> (Arc<Self>, JoinHandle<()>) {
        let broker = Self::new(queue_capacity);
        let rx = bus.subscribe();
        let handle = tokio::spawn(Arc::clone(&broker).run(rx));
        (broker, handle)
    }

    /// Forward bus events until the bus is closed
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<Arc<ChangeEvent>>) {
        info!("Subscriber broker started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.dispatch(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber broker lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Subscriber broker stopped");
    }

    /// Register a fresh delivery queue
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        debug!(subscriber = id, subscribers = count, "Subscriber added");
        Subscription {
            id,
            rx,
            broker: Arc::downgrade(self),
        }
    }

    /// Returns false when `id` was already gone
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver one event to every registered queue; returns the number of
    /// queues that accepted the frame.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let frame = match encode_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, event = %event.kind(), "Failed to encode event frame");
                return 0;
            }
        };

        let targets: Vec<(u64, mpsc::Sender<Frame>)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber = id, "Subscriber queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.lock();
            for id in closed {
                subscribers.remove(&id);
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<Frame>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered delivery queue; unsubscribes itself on drop
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Frame>,
    broker: Weak<SubscriberBroker>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `None` once the broker is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(self.id);
        }
    }
}
