// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid process uid: {0} (expected group:name@supervisor)")]
    InvalidUid(String),

    #[error("Invalid supervisor definition: {0}")]
    InvalidSupervisor(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
