//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;
use tracing::{info, warn};

use multivisor_core::application::{Multivisor, SubscriberBroker, Subscription};
use multivisor_core::domain::{AggregateState, Process};

use crate::error::to_rpc_error;
use crate::types::{ControlAction, ControlResponse, ReloadResponse, UidRequest};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    multivisor: Arc<Multivisor>,
    broker: Arc<SubscriberBroker>,
}

impl RpcHandler {
    pub fn new(multivisor: Arc<Multivisor>, broker: Arc<SubscriberBroker>) -> Self {
        Self { multivisor, broker }
    }

    /// state.get.v1
    pub async fn state(&self) -> Result<AggregateState, ErrorObjectOwned> {
        Ok(self.multivisor.snapshot().await)
    }

    /// state.refresh.v1
    pub async fn refresh(&self) -> Result<AggregateState, ErrorObjectOwned> {
        let modified = self.multivisor.poll_supervisors().await;
        info!(modified, "Manual refresh");
        Ok(self.multivisor.snapshot().await)
    }

    /// config.reload.v1
    pub async fn reload(&self) -> Result<ReloadResponse, ErrorObjectOwned> {
        let supervisors = self.multivisor.reload_config().await.map_err(|e| {
            warn!(error = %e, "Configuration reload failed, keeping current table");
            to_rpc_error(e)
        })?;
        info!(supervisors, "Configuration reloaded");
        Ok(ReloadResponse {
            reloaded: true,
            supervisors,
        })
    }

    /// process.info.v1
    pub async fn process_info(&self, params: UidRequest) -> Result<Process, ErrorObjectOwned> {
        let tracker = self
            .multivisor
            .get_process(&params.uid)
            .await
            .map_err(to_rpc_error)?;
        tracker.refresh().await.map_err(to_rpc_error)?;
        Ok(tracker.snapshot().await)
    }

    /// process.{start,stop,restart}.v1
    ///
    /// The uid is resolved before returning; the operation itself runs in a
    /// spawned task and reports through the event stream.
    pub async fn control(
        &self,
        action: ControlAction,
        params: UidRequest,
    ) -> Result<ControlResponse, ErrorObjectOwned> {
        let tracker = self
            .multivisor
            .get_process(&params.uid)
            .await
            .map_err(to_rpc_error)?;

        tokio::spawn(async move {
            let result = match action {
                ControlAction::Start => tracker.start().await,
                ControlAction::Stop => tracker.stop().await,
                ControlAction::Restart => tracker.restart().await,
            };
            if let Err(e) = result {
                warn!(uid = %tracker.uid(), action = %action, error = %e, "Resync after control failed");
            }
        });

        Ok(ControlResponse {
            uid: params.uid,
            accepted: true,
        })
    }

    /// events.subscribe.v1
    pub fn open_stream(&self) -> Subscription {
        self.broker.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multivisor_core::application::EventBus;
    use multivisor_core::domain::{MultivisorConfig, ProcessState, SupervisorConfig};
    use multivisor_core::port::config_source::mocks::StaticConfigSource;
    use multivisor_core::port::supervisor_rpc::mocks::MockConnector;
    use multivisor_core::port::time_provider::mocks::FixedTimeProvider;
    use std::time::Duration;

    use crate::error::code;

    fn handler() -> (Arc<MockConnector>, RpcHandler) {
        let config = MultivisorConfig {
            name: "lab".to_string(),
            supervisors: vec![SupervisorConfig::new("lid001")],
        };
        let connector = Arc::new(MockConnector::new());
        let bus = EventBus::new(64, Arc::new(FixedTimeProvider::new(0)));
        let broker = SubscriberBroker::new(16);
        let multivisor = Multivisor::load(
            Arc::new(StaticConfigSource::new(config)),
            connector.clone(),
            bus,
        )
        .unwrap();
        (connector, RpcHandler::new(Arc::new(multivisor), broker))
    }

    fn uid(uid: &str) -> UidRequest {
        UidRequest {
            uid: uid.to_string(),
        }
    }

    fn code_of(err: ErrorObjectOwned) -> i32 {
        err.code()
    }

    #[tokio::test]
    async fn test_refresh_returns_fresh_state() {
        let (connector, handler) = handler();
        connector.client("lid001").add_process("web", "api", ProcessState::Running);

        assert!(handler.state().await.unwrap().supervisors["lid001"].processes.is_empty());

        let state = handler.refresh().await.unwrap();
        assert_eq!(state.name, "lab");
        assert!(state.supervisors["lid001"].processes.contains_key("web:api@lid001"));
    }

    #[tokio::test]
    async fn test_process_info_refreshes() {
        let (connector, handler) = handler();
        let client = connector.client("lid001");
        client.add_process("web", "api", ProcessState::Running);
        handler.refresh().await.unwrap();

        client.set_process_state("web:api", ProcessState::Fatal);
        let process = handler.process_info(uid("web:api@lid001")).await.unwrap();
        assert_eq!(process.state, ProcessState::Fatal);
        assert!(!process.running);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_uids() {
        let (_, handler) = handler();
        handler.refresh().await.unwrap();

        let err = handler.process_info(uid("web:api@nowhere")).await.unwrap_err();
        assert_eq!(code_of(err), code::NOT_FOUND);

        let err = handler
            .control(ControlAction::Start, uid("missing-at"))
            .await
            .unwrap_err();
        assert_eq!(code_of(err), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_control_runs_in_background() {
        let (connector, handler) = handler();
        let client = connector.client("lid001");
        client.add_process("web", "api", ProcessState::Running);
        handler.refresh().await.unwrap();
        client.clear_calls();

        let response = handler
            .control(ControlAction::Stop, uid("web:api@lid001"))
            .await
            .unwrap();
        assert!(response.accepted);
        assert_eq!(response.uid, "web:api@lid001");

        for _ in 0..50 {
            if client.calls().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            client.calls(),
            vec!["stopProcess:web:api", "getProcessInfo:web:api"]
        );
    }

    #[tokio::test]
    async fn test_open_stream_registers_subscriber() {
        let (_, handler) = handler();
        let stream = handler.open_stream();
        assert_eq!(handler.broker.subscriber_count(), 1);
        drop(stream);
        assert_eq!(handler.broker.subscriber_count(), 0);
    }
}
