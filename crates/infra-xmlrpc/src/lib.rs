// Multivisor Infrastructure - supervisord XML-RPC adapter
// Implements: SupervisorRpc, RpcConnector

pub mod client;
pub mod codec;
pub mod connector;
pub mod supervisord;

pub use client::{Namespace, XmlRpcClient};
pub use codec::Value;
pub use connector::XmlRpcConnector;
pub use supervisord::SupervisordClient;
