//! RPC Request/Response Types
//!
//! `state.get.v1` and `state.refresh.v1` return the core `AggregateState`,
//! `process.info.v1` the core `Process`; only the small envelopes live here.

use serde::{Deserialize, Serialize};

/// process.{info,start,stop,restart}.v1 - Target one process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UidRequest {
    pub uid: String,
}

/// process.{start,stop,restart}.v1 - Operation accepted, runs in background
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub uid: String,
    pub accepted: bool,
}

/// config.reload.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub supervisors: usize,
}

/// Which control operation a `process.*.v1` call requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAction::Start => write!(f, "start"),
            ControlAction::Stop => write!(f, "stop"),
            ControlAction::Restart => write!(f, "restart"),
        }
    }
}
