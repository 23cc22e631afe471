//! JSON-RPC Server
//!
//! Serves the control surface over HTTP and WebSocket on one TCP port.
//! The event stream is a WebSocket subscription: every notification carries
//! exactly one `data: <JSON>\n\n` frame.

use std::sync::Arc;

use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{RegisterMethodError, Server, ServerHandle};
use jsonrpsee::{RpcModule, SubscriptionMessage, SubscriptionSink};
use tracing::{debug, info};

use multivisor_core::application::{Multivisor, SubscriberBroker, Subscription};

use crate::handler::RpcHandler;
use crate::types::{ControlAction, UidRequest};

const DEFAULT_RPC_HOST: &str = "0.0.0.0";
const DEFAULT_RPC_PORT: u16 = 22000;

/// Pump broker frames into one subscriber until either side goes away
///
/// Dropping `stream` on return unregisters it from the broker.
async fn forward_frames(mut stream: Subscription, sink: SubscriptionSink) -> SubscriptionResult {
    debug!(subscriber = stream.id(), "Event stream opened");
    loop {
        tokio::select! {
            _ = sink.closed() => break,
            frame = stream.recv() => {
                let Some(frame) = frame else { break };
                let text: &str = &frame;
                let message = SubscriptionMessage::from_json(&text)?;
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!(subscriber = stream.id(), "Event stream closed");
    Ok(())
}

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        multivisor: Arc<Multivisor>,
        broker: Arc<SubscriberBroker>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(multivisor, broker)),
        }
    }

    /// Build the method table without binding a socket
    pub fn into_module(self) -> Result<RpcModule<()>, RegisterMethodError> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module.register_async_method("state.get.v1", move |_, _, _| {
            let handler = handler.clone();
            async move { handler.state().await }
        })?;

        let handler = self.handler.clone();
        module.register_async_method("state.refresh.v1", move |_, _, _| {
            let handler = handler.clone();
            async move { handler.refresh().await }
        })?;

        let handler = self.handler.clone();
        module.register_async_method("config.reload.v1", move |_, _, _| {
            let handler = handler.clone();
            async move { handler.reload().await }
        })?;

        let handler = self.handler.clone();
        module.register_async_method("process.info.v1", move |params, _, _| {
            let handler = handler.clone();
            async move {
                let req: UidRequest = params.parse()?;
                handler.process_info(req).await
            }
        })?;

        for (method, action) in [
            ("process.start.v1", ControlAction::Start),
            ("process.stop.v1", ControlAction::Stop),
            ("process.restart.v1", ControlAction::Restart),
        ] {
            let handler = self.handler.clone();
            module.register_async_method(method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: UidRequest = params.parse()?;
                    handler.control(action, req).await
                }
            })?;
        }

        let handler = self.handler.clone();
        module.register_subscription(
            "events.subscribe.v1",
            "events.frame.v1",
            "events.unsubscribe.v1",
            move |_, pending, _, _| {
                let handler = handler.clone();
                async move {
                    // Register before accepting so no frame published meanwhile is lost
                    let stream = handler.open_stream();
                    let sink = pending.accept().await?;
                    forward_frames(stream, sink).await
                }
            },
        )?;

        Ok(module)
    }

    /// Bind and start the JSON-RPC server
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let module = self.into_module().map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::rpc_params;
    use multivisor_core::application::EventBus;
    use multivisor_core::domain::{AggregateState, MultivisorConfig, ProcessState, SupervisorConfig};
    use multivisor_core::port::config_source::mocks::StaticConfigSource;
    use multivisor_core::port::supervisor_rpc::mocks::MockConnector;
    use multivisor_core::port::time_provider::mocks::FixedTimeProvider;
    use std::time::Duration;

    use crate::types::{ControlResponse, ReloadResponse};

    struct Fixture {
        connector: Arc<MockConnector>,
        broker: Arc<SubscriberBroker>,
        module: RpcModule<()>,
    }

    fn fixture() -> Fixture {
        let config = MultivisorConfig {
            name: "lab".to_string(),
            supervisors: vec![SupervisorConfig::new("lid001")],
        };
        let connector = Arc::new(MockConnector::new());
        let bus = EventBus::new(64, Arc::new(FixedTimeProvider::new(1_700_000_000_000)));
        let (broker, _) = SubscriberBroker::spawn(&bus, 16);
        let multivisor = Multivisor::load(
            Arc::new(StaticConfigSource::new(config)),
            connector.clone(),
            bus,
        )
        .unwrap();
        let server = RpcServer::new(
            RpcServerConfig::default(),
            Arc::new(multivisor),
            broker.clone(),
        );
        Fixture {
            connector,
            broker,
            module: server.into_module().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_state_methods() {
        let f = fixture();
        f.connector
            .client("lid001")
            .add_process("web", "api", ProcessState::Running);

        let state: AggregateState = f.module.call("state.refresh.v1", rpc_params![]).await.unwrap();
        assert!(state.supervisors["lid001"].running);

        let state: AggregateState = f.module.call("state.get.v1", rpc_params![]).await.unwrap();
        assert_eq!(state.supervisors["lid001"].processes.len(), 1);

        let reload: ReloadResponse = f.module.call("config.reload.v1", rpc_params![]).await.unwrap();
        assert!(reload.reloaded);
        assert_eq!(reload.supervisors, 1);
    }

    #[tokio::test]
    async fn test_control_by_uid() {
        let f = fixture();
        f.connector
            .client("lid001")
            .add_process("web", "api", ProcessState::Stopped);
        let _: AggregateState = f.module.call("state.refresh.v1", rpc_params![]).await.unwrap();

        let params = rpc_params![UidRequest {
            uid: "web:api@lid001".to_string()
        }];
        let response: ControlResponse = f.module.call("process.restart.v1", params).await.unwrap();
        assert!(response.accepted);

        let params = rpc_params![UidRequest {
            uid: "web:api@elsewhere".to_string()
        }];
        let result: Result<ControlResponse, _> = f.module.call("process.start.v1", params).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_event_subscription_delivers_frames() {
        let f = fixture();
        f.connector
            .client("lid001")
            .add_process("web", "api", ProcessState::Running);

        let mut subscription = f
            .module
            .subscribe_unbounded("events.subscribe.v1", rpc_params![])
            .await
            .unwrap();

        for _ in 0..50 {
            if f.broker.subscriber_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let _: AggregateState = f.module.call("state.refresh.v1", rpc_params![]).await.unwrap();

        let (frame, _) = tokio::time::timeout(Duration::from_secs(1), subscription.next::<String>())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"event\":\"supervisor_changed\""));

        drop(subscription);
        for _ in 0..50 {
            if f.broker.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.broker.subscriber_count(), 0);
    }
}
