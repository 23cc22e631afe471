// Supervisor Domain Model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::process::Process;

/// Point-in-time view of one remote supervisord
///
/// Invariant: `running == pid.is_some()`; an unreachable supervisor has no
/// metadata and no processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervisor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub pid: Option<i64>,
    pub identification: Option<String>,
    pub api_version: Option<String>,
    pub version: Option<String>,
    pub supervisor_version: Option<String>,
    pub running: bool,
    pub processes: BTreeMap<String, Process>,
}

/// Whole-tree export served to polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateState {
    pub name: String,
    pub supervisors: BTreeMap<String, Supervisor>,
}
