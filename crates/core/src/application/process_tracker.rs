//! Process State Tracker - last known snapshot of one remote process
//!
//! Control operations (start/stop/restart) always finish with a refresh, so
//! the published state reflects what the remote side reports rather than
//! what was attempted.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};

use crate::application::event_bus::EventBus;
use crate::domain::Process;
use crate::error::Result;
use crate::port::SupervisorRpc;

pub struct ProcessTracker {
    uid: String,
    full_name: String,
    rpc: Arc<dyn SupervisorRpc>,
    bus: EventBus,
    snapshot: RwLock<Process>,
}

impl ProcessTracker {
    pub fn new(process: Process, rpc: Arc<dyn SupervisorRpc>, bus: EventBus) -> Self {
        Self {
            uid: process.uid.clone(),
            full_name: process.full_name.clone(),
            rpc,
            bus,
            snapshot: RwLock::new(process),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub async fn snapshot(&self) -> Process {
        self.snapshot.read().await.clone()
    }

    /// Re-fetch this process and publish `process_changed` if it differs
    ///
    /// # Returns
    /// true if the snapshot changed (ignoring `description` and `now`)
    ///
    /// # Errors
    /// Remote errors propagate; the stored snapshot is left untouched.
    pub async fn refresh(&self) -> Result<bool> {
        let info = self.rpc.get_process_info(&self.full_name).await?;

        let (previous, current) = {
            let mut snapshot = self.snapshot.write().await;
            let current = snapshot.updated(info);
            let previous = std::mem::replace(&mut *snapshot, current.clone());
            (previous, current)
        };

        if previous == current {
            return Ok(false);
        }

        let state_changed = previous.state != current.state;
        let message = format!(
            "{} changed from {} to {}",
            current, previous.statename, current.statename
        );
        self.bus.publish_process(current);
        if state_changed {
            self.announce(Level::INFO, message);
        }
        Ok(true)
    }

    /// Ask the remote side to start this process, then resync
    ///
    /// A failed start call is logged and swallowed; only a failure of the
    /// resync itself is returned.
    pub async fn start(&self) -> Result<()> {
        self.announce(Level::INFO, format!("Starting {}...", self.label().await));
        if let Err(e) = self.rpc.start_process(&self.full_name).await {
            self.announce(
                Level::ERROR,
                format!("Error trying to start {}: {}", self.label().await, e),
            );
        }
        self.refresh().await.map(|_| ())
    }

    /// Ask the remote side to stop this process, then resync
    pub async fn stop(&self) -> Result<()> {
        self.announce(Level::INFO, format!("Stopping {}...", self.label().await));
        if let Err(e) = self.rpc.stop_process(&self.full_name).await {
            self.announce(
                Level::ERROR,
                format!("Error trying to stop {}: {}", self.label().await, e),
            );
        }
        self.refresh().await.map(|_| ())
    }

    /// Stop (when running) and then start, strictly in that order
    pub async fn restart(&self) -> Result<()> {
        self.announce(Level::INFO, format!("Restarting {}...", self.label().await));
        if self.snapshot.read().await.running {
            self.stop().await?;
        }
        self.start().await
    }

    async fn label(&self) -> String {
        self.snapshot.read().await.to_string()
    }

    /// Log locally and forward to streaming clients as a `log` event
    fn announce(&self, level: Level, message: String) {
        match level {
            Level::ERROR => error!(uid = %self.uid, "{}", message),
            Level::WARN => warn!(uid = %self.uid, "{}", message),
            _ => info!(uid = %self.uid, "{}", message),
        }
        self.bus
            .publish_log(level, format!("multivisor.{}", self.uid), message);
    }
}
