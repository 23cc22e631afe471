// Configuration Domain Model
// Parsed by an infra adapter (ConfigSource port), consumed by the Multivisor service

use super::error::{DomainError, Result};

/// Name reported when the global section does not set one
pub const DEFAULT_NAME: &str = "multivisor";

/// supervisord's default inet_http_server port
pub const DEFAULT_SUPERVISOR_PORT: u16 = 9001;

/// Connection identity of one remote supervisord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SupervisorConfig {
    /// Host defaults to the supervisor name, port to 9001
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            host: name.clone(),
            name,
            port: DEFAULT_SUPERVISOR_PORT,
            username: None,
            password: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials are only used when both halves are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// `@` separates process name from supervisor name inside a uid
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DomainError::InvalidSupervisor("empty name".to_string()));
        }
        if self.name.contains('@') {
            return Err(DomainError::InvalidSupervisor(format!(
                "name '{}' must not contain '@'",
                self.name
            )));
        }
        if self.host.is_empty() {
            return Err(DomainError::InvalidSupervisor(format!(
                "supervisor '{}' has an empty host",
                self.name
            )));
        }
        Ok(())
    }
}

/// Full aggregator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultivisorConfig {
    pub name: String,
    pub supervisors: Vec<SupervisorConfig>,
}

impl Default for MultivisorConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            supervisors: Vec::new(),
        }
    }
}

impl MultivisorConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for supervisor in &self.supervisors {
            supervisor.validate()?;
            if !seen.insert(supervisor.name.as_str()) {
                return Err(DomainError::InvalidSupervisor(format!(
                    "duplicate supervisor '{}'",
                    supervisor.name
                )));
            }
        }
        Ok(())
    }
}
