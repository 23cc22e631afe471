// Port Layer - Interfaces for external dependencies

pub mod config_source;
pub mod supervisor_rpc;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use config_source::ConfigSource;
pub use supervisor_rpc::{RpcConnector, RpcError, SupervisorRpc};
pub use time_provider::TimeProvider;
