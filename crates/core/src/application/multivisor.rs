//! Multivisor - aggregate registry of all supervisor trackers
//!
//! Owns the supervisor table built from configuration. A reload swaps the
//! whole table at once; callers holding trackers from the old table keep
//! working on them until they drop them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::application::event_bus::EventBus;
use crate::application::poller::refresh_all;
use crate::application::process_tracker::ProcessTracker;
use crate::application::supervisor_tracker::SupervisorTracker;
use crate::domain::{split_uid, AggregateState};
use crate::error::{AppError, Result};
use crate::port::{ConfigSource, RpcConnector};

struct Registry {
    name: String,
    supervisors: BTreeMap<String, Arc<SupervisorTracker>>,
}

pub struct Multivisor {
    config_source: Arc<dyn ConfigSource>,
    connector: Arc<dyn RpcConnector>,
    bus: EventBus,
    registry: RwLock<Arc<Registry>>,
}

impl Multivisor {
    /// Load configuration and build one tracker per supervisor
    ///
    /// # Errors
    /// - AppError::Config / AppError::Domain for invalid configuration
    /// - AppError::Rpc if a client cannot be constructed
    pub fn load(
        config_source: Arc<dyn ConfigSource>,
        connector: Arc<dyn RpcConnector>,
        bus: EventBus,
    ) -> Result<Self> {
        let registry = Self::build(config_source.as_ref(), connector.as_ref(), &bus)?;
        Ok(Self {
            config_source,
            connector,
            bus,
            registry: RwLock::new(Arc::new(registry)),
        })
    }

    fn build(
        config_source: &dyn ConfigSource,
        connector: &dyn RpcConnector,
        bus: &EventBus,
    ) -> Result<Registry> {
        let config = config_source.load()?;
        config.validate()?;

        let mut supervisors = BTreeMap::new();
        for supervisor in config.supervisors {
            let rpc = connector.connect(&supervisor)?;
            let name = supervisor.name.clone();
            supervisors.insert(
                name,
                Arc::new(SupervisorTracker::new(supervisor, rpc, bus.clone())),
            );
        }
        info!(
            name = %config.name,
            supervisors = supervisors.len(),
            "Configuration loaded"
        );
        Ok(Registry {
            name: config.name,
            supervisors,
        })
    }

    /// Re-read configuration and replace the whole supervisor table
    ///
    /// On error the current table stays in place.
    pub async fn reload_config(&self) -> Result<usize> {
        let registry = Self::build(
            self.config_source.as_ref(),
            self.connector.as_ref(),
            &self.bus,
        )?;
        let count = registry.supervisors.len();
        *self.registry.write().await = Arc::new(registry);
        Ok(count)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn name(&self) -> String {
        self.registry.read().await.name.clone()
    }

    pub async fn supervisors(&self) -> Vec<Arc<SupervisorTracker>> {
        self.registry
            .read()
            .await
            .supervisors
            .values()
            .cloned()
            .collect()
    }

    pub async fn get_supervisor(&self, name: &str) -> Result<Arc<SupervisorTracker>> {
        self.registry
            .read()
            .await
            .supervisors
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Supervisor {} not found", name)))
    }

    /// Resolve `group:name@supervisor` to its current tracker
    pub async fn get_process(&self, uid: &str) -> Result<Arc<ProcessTracker>> {
        let (_, supervisor) = split_uid(uid)?;
        self.get_supervisor(supervisor)
            .await?
            .process(uid)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Process {} not found", uid)))
    }

    /// One concurrent refresh of every supervisor
    pub async fn poll_supervisors(&self) -> usize {
        let supervisors = self.supervisors().await;
        refresh_all(&supervisors).await
    }

    /// Aggregate export of the whole state tree
    pub async fn snapshot(&self) -> AggregateState {
        let registry = Arc::clone(&*self.registry.read().await);
        let mut supervisors = BTreeMap::new();
        for (name, tracker) in &registry.supervisors {
            supervisors.insert(name.clone(), tracker.snapshot().await);
        }
        AggregateState {
            name: registry.name.clone(),
            supervisors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MultivisorConfig, ProcessState, SupervisorConfig};
    use crate::port::config_source::mocks::StaticConfigSource;
    use crate::port::supervisor_rpc::mocks::MockConnector;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn config(names: &[&str]) -> MultivisorConfig {
        MultivisorConfig {
            name: "lab".to_string(),
            supervisors: names.iter().map(|n| SupervisorConfig::new(*n)).collect(),
        }
    }

    fn setup(names: &[&str]) -> (Arc<StaticConfigSource>, Arc<MockConnector>, Multivisor) {
        let source = Arc::new(StaticConfigSource::new(config(names)));
        let connector = Arc::new(MockConnector::new());
        let bus = EventBus::new(64, Arc::new(FixedTimeProvider::new(0)));
        let multivisor = Multivisor::load(source.clone(), connector.clone(), bus).unwrap();
        (source, connector, multivisor)
    }

    #[tokio::test]
    async fn test_get_process_by_uid() {
        let (_, connector, multivisor) = setup(&["lid001", "lid002"]);
        connector.client("lid001").add_process("web", "api", ProcessState::Running);
        connector.client("lid002").add_process("web", "api", ProcessState::Stopped);

        assert_eq!(multivisor.poll_supervisors().await, 2);

        let a = multivisor.get_process("web:api@lid001").await.unwrap();
        let b = multivisor.get_process("web:api@lid002").await.unwrap();
        assert!(a.snapshot().await.running);
        assert!(!b.snapshot().await.running);
    }

    #[tokio::test]
    async fn test_get_process_with_at_sign_in_program_name() {
        let (_, connector, multivisor) = setup(&["lid001", "smtp"]);
        connector
            .client("lid001")
            .add_process("mail", "relay@smtp", ProcessState::Running);
        multivisor.poll_supervisors().await;

        let relay = multivisor
            .get_process("mail:relay@smtp@lid001")
            .await
            .unwrap();
        assert_eq!(relay.full_name(), "mail:relay@smtp");
        assert_eq!(relay.snapshot().await.supervisor, "lid001");
    }

    #[tokio::test]
    async fn test_unknown_lookups() {
        let (_, _, multivisor) = setup(&["lid001"]);
        multivisor.poll_supervisors().await;

        assert!(matches!(
            multivisor.get_process("web:api@nowhere").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            multivisor.get_process("web:api@lid001").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            multivisor.get_process("no-at-sign").await,
            Err(AppError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_export() {
        let (_, connector, multivisor) = setup(&["lid001", "lid002"]);
        connector.client("lid001").add_process("web", "api", ProcessState::Running);
        connector.client("lid002").set_pid(None);
        multivisor.poll_supervisors().await;

        let state = multivisor.snapshot().await;
        assert_eq!(state.name, "lab");
        assert!(state.supervisors["lid001"].running);
        assert!(state.supervisors["lid001"]
            .processes
            .contains_key("web:api@lid001"));
        assert!(!state.supervisors["lid002"].running);
    }

    #[tokio::test]
    async fn test_reload_replaces_table() {
        let (source, _, multivisor) = setup(&["lid001"]);
        multivisor.poll_supervisors().await;

        source.replace(config(&["lid002", "lid003"]));
        assert_eq!(multivisor.reload_config().await.unwrap(), 2);

        assert!(multivisor.get_supervisor("lid001").await.is_err());
        let fresh = multivisor.get_supervisor("lid002").await.unwrap();
        assert!(!fresh.snapshot().await.running);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_current_table() {
        let (source, _, multivisor) = setup(&["lid001"]);
        source.replace(config(&["dup", "dup"]));

        assert!(multivisor.reload_config().await.is_err());
        assert!(multivisor.get_supervisor("lid001").await.is_ok());
    }
}
