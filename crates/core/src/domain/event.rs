// Change Event Domain Model
// Events are structured here; the wire frame is produced by the broker

use serde::{Deserialize, Serialize};

use super::process::Process;
use super::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SupervisorChanged,
    ProcessChanged,
    Log,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::SupervisorChanged => write!(f, "supervisor_changed"),
            EventKind::ProcessChanged => write!(f, "process_changed"),
            EventKind::Log => write!(f, "log"),
        }
    }
}

/// Operator-facing log line forwarded to streaming clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
    pub level: String,
    /// Seconds since epoch
    pub time: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Supervisor(Box<Supervisor>),
    Process(Box<Process>),
    Log(LogRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub payload: EventPayload,
    /// Epoch milliseconds at publication
    pub timestamp: i64,
}

impl ChangeEvent {
    pub fn supervisor_changed(supervisor: Supervisor, timestamp: i64) -> Self {
        Self {
            payload: EventPayload::Supervisor(Box::new(supervisor)),
            timestamp,
        }
    }

    pub fn process_changed(process: Process, timestamp: i64) -> Self {
        Self {
            payload: EventPayload::Process(Box::new(process)),
            timestamp,
        }
    }

    pub fn log(record: LogRecord, timestamp: i64) -> Self {
        Self {
            payload: EventPayload::Log(record),
            timestamp,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Supervisor(_) => EventKind::SupervisorChanged,
            EventPayload::Process(_) => EventKind::ProcessChanged,
            EventPayload::Log(_) => EventKind::Log,
        }
    }
}
