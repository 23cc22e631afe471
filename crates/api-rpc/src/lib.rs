//! JSON-RPC API Layer
//!
//! Control surface of the Multivisor daemon: aggregate state, reload,
//! per-process control and the change event stream.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
