// Domain Layer - Supervisors, processes and change events

pub mod config;
pub mod error;
pub mod event;
pub mod process;
pub mod supervisor;

// Re-exports
pub use config::{MultivisorConfig, SupervisorConfig, DEFAULT_NAME, DEFAULT_SUPERVISOR_PORT};
pub use error::DomainError;
pub use event::{ChangeEvent, EventKind, EventPayload, LogRecord};
pub use process::{split_uid, Process, ProcessInfo, ProcessState, RUNNING_STATES};
pub use supervisor::{AggregateState, Supervisor};
