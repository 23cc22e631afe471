//! Supervisor State Tracker - connection identity, metadata and process map
//! of one remote supervisord.
//!
//! ## Refresh sequence
//! ```text
//! getPID ──(error ⇒ pid = None)
//!   │
//!   ├─ pid changed? ── None  ⇒ clear metadata, running = false
//!   │                └ Some ⇒ fetch identification / versions, running = true
//!   │
//!   ├─ pid is Some ⇒ getAllProcessInfo ⇒ fresh ProcessTracker per uid
//!   │
//!   ├─ commit, diff old vs new process map
//!   │
//!   └─ modified ⇒ publish supervisor_changed(full snapshot)
//! ```
//! Nothing is committed until every remote call of the tick succeeded, so a
//! failed metadata fetch is retried on the next tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::application::event_bus::EventBus;
use crate::application::process_tracker::ProcessTracker;
use crate::domain::{Process, Supervisor, SupervisorConfig};
use crate::error::Result;
use crate::port::SupervisorRpc;

/// Metadata that only changes when the remote daemon's pid changes
#[derive(Debug, Clone, Default)]
struct Metadata {
    pid: Option<i64>,
    identification: Option<String>,
    api_version: Option<String>,
    version: Option<String>,
    supervisor_version: Option<String>,
}

pub struct SupervisorTracker {
    config: SupervisorConfig,
    rpc: Arc<dyn SupervisorRpc>,
    bus: EventBus,
    metadata: RwLock<Metadata>,
    processes: RwLock<BTreeMap<String, Arc<ProcessTracker>>>,
    // Serializes refreshes of this supervisor (poller vs. manual refresh)
    refresh_lock: Mutex<()>,
}

impl SupervisorTracker {
    pub fn new(config: SupervisorConfig, rpc: Arc<dyn SupervisorRpc>, bus: EventBus) -> Self {
        Self {
            config,
            rpc,
            bus,
            metadata: RwLock::new(Metadata::default()),
            processes: RwLock::new(BTreeMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub async fn process(&self, uid: &str) -> Option<Arc<ProcessTracker>> {
        self.processes.read().await.get(uid).cloned()
    }

    pub async fn processes(&self) -> Vec<Arc<ProcessTracker>> {
        self.processes.read().await.values().cloned().collect()
    }

    /// Full current view, processes included
    pub async fn snapshot(&self) -> Supervisor {
        let metadata = self.metadata.read().await.clone();
        let trackers = self.processes().await;
        let mut processes = BTreeMap::new();
        for tracker in trackers {
            processes.insert(tracker.uid().to_string(), tracker.snapshot().await);
        }
        Supervisor {
            name: self.config.name.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            running: metadata.pid.is_some(),
            pid: metadata.pid,
            identification: metadata.identification,
            api_version: metadata.api_version,
            version: metadata.version,
            supervisor_version: metadata.supervisor_version,
            processes,
        }
    }

    /// Poll the remote daemon and publish `supervisor_changed` on any change
    ///
    /// # Returns
    /// true if metadata or the process map changed
    ///
    /// # Errors
    /// An unreachable daemon is not an error. Metadata or process-list
    /// failures abort this tick and leave the previous state in place.
    pub async fn refresh(&self) -> Result<bool> {
        let _guard = self.refresh_lock.lock().await;
        debug!(supervisor = %self.config.name, "updating");

        let pid = match self.rpc.get_pid().await {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(supervisor = %self.config.name, error = %e, "Supervisor unreachable");
                None
            }
        };

        let previous_pid = self.metadata.read().await.pid;
        let transition = if pid != previous_pid {
            Some(self.fetch_metadata(pid).await?)
        } else {
            None
        };

        let fresh: BTreeMap<String, Process> = match pid {
            Some(_) => self
                .rpc
                .get_all_process_info()
                .await?
                .into_iter()
                .map(|info| Process::new(&self.config.name, &self.config.host, info))
                .map(|process| (process.uid.clone(), process))
                .collect(),
            None => BTreeMap::new(),
        };

        // Commit
        let mut modified = false;
        if let Some(metadata) = transition {
            match metadata.pid {
                Some(pid) => info!(supervisor = %self.config.name, pid, "Supervisor is up"),
                None => info!(supervisor = %self.config.name, "Supervisor is down"),
            }
            *self.metadata.write().await = metadata;
            modified = true;
        }

        let trackers: BTreeMap<String, Arc<ProcessTracker>> = fresh
            .values()
            .map(|process| {
                let tracker = ProcessTracker::new(process.clone(), Arc::clone(&self.rpc), self.bus.clone());
                (process.uid.clone(), Arc::new(tracker))
            })
            .collect();
        let old_trackers = std::mem::replace(&mut *self.processes.write().await, trackers);

        let mut old = BTreeMap::new();
        for (uid, tracker) in old_trackers {
            old.insert(uid, tracker.snapshot().await);
        }
        modified |= old != fresh;

        if modified {
            self.bus.publish_supervisor(self.snapshot().await);
        }
        Ok(modified)
    }

    async fn fetch_metadata(&self, pid: Option<i64>) -> Result<Metadata> {
        if pid.is_none() {
            return Ok(Metadata::default());
        }
        Ok(Metadata {
            pid,
            identification: Some(self.rpc.get_identification().await?),
            api_version: Some(self.rpc.get_api_version().await?),
            version: Some(self.rpc.get_version().await?),
            supervisor_version: Some(self.rpc.get_supervisor_version().await?),
        })
    }
}
