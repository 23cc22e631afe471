// XML-RPC connector
// One SupervisordClient (and so one connection) per configured supervisor

use std::sync::Arc;

use tracing::debug;

use multivisor_core::domain::SupervisorConfig;
use multivisor_core::port::{RpcConnector, RpcError, SupervisorRpc};

use crate::supervisord::SupervisordClient;

#[derive(Debug, Default, Clone, Copy)]
pub struct XmlRpcConnector;

impl XmlRpcConnector {
    pub fn new() -> Self {
        Self
    }
}

impl RpcConnector for XmlRpcConnector {
    fn connect(&self, config: &SupervisorConfig) -> Result<Arc<dyn SupervisorRpc>, RpcError> {
        debug!(
            supervisor = %config.name,
            host = %config.host,
            port = config.port,
            authenticated = config.credentials().is_some(),
            "Creating supervisord client"
        );
        Ok(Arc::new(SupervisordClient::for_supervisor(config)?))
    }
}
