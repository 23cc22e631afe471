// Remote supervisord port
// reason: async-trait for object-safe async methods behind Arc<dyn ..>
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{ProcessInfo, SupervisorConfig};

/// Failure of a single remote call
///
/// The adapter reports; callers decide whether a failure means
/// "unreachable", "abort this tick" or "log and resync".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Client for one remote supervisord
///
/// Implementations must serialize calls: at most one request in flight per
/// underlying connection.
#[async_trait]
pub trait SupervisorRpc: Send + Sync {
    /// Liveness probe, returns the daemon's own pid
    async fn get_pid(&self) -> Result<i64, RpcError>;

    async fn get_identification(&self) -> Result<String, RpcError>;

    async fn get_api_version(&self) -> Result<String, RpcError>;

    async fn get_version(&self) -> Result<String, RpcError>;

    async fn get_supervisor_version(&self) -> Result<String, RpcError>;

    async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>, RpcError>;

    /// # Arguments
    /// * `full_name` - `group:name`
    async fn get_process_info(&self, full_name: &str) -> Result<ProcessInfo, RpcError>;

    async fn start_process(&self, full_name: &str) -> Result<(), RpcError>;

    async fn stop_process(&self, full_name: &str) -> Result<(), RpcError>;
}

/// Builds one client per configured supervisor
pub trait RpcConnector: Send + Sync {
    fn connect(&self, config: &SupervisorConfig) -> Result<Arc<dyn SupervisorRpc>, RpcError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ProcessState;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// supervisord fault codes used by the mock
    pub const FAULT_BAD_NAME: i64 = 10;
    pub const FAULT_ALREADY_STARTED: i64 = 60;
    pub const FAULT_NOT_RUNNING: i64 = 70;

    #[derive(Debug, Clone)]
    struct MockState {
        pid: Option<i64>,
        identification: String,
        api_version: String,
        version: String,
        supervisor_version: String,
        processes: Vec<ProcessInfo>,
        fail_metadata: bool,
        fail_start: bool,
        fail_stop: bool,
        latency: Option<Duration>,
    }

    /// Scripted supervisord
    ///
    /// Tests mutate the remote state between refreshes and inspect the
    /// journal of issued calls.
    pub struct MockSupervisorRpc {
        state: Mutex<MockState>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSupervisorRpc {
        /// Reachable daemon with pid 100 and no processes
        pub fn new() -> Self {
            Self {
                state: Mutex::new(MockState {
                    pid: Some(100),
                    identification: "supervisor".to_string(),
                    api_version: "3.0".to_string(),
                    version: "3.0".to_string(),
                    supervisor_version: "4.2.5".to_string(),
                    processes: Vec::new(),
                    fail_metadata: false,
                    fail_start: false,
                    fail_stop: false,
                    latency: None,
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn set_pid(&self, pid: Option<i64>) {
            self.state.lock().unwrap().pid = pid;
        }

        pub fn set_identification(&self, identification: impl Into<String>) {
            self.state.lock().unwrap().identification = identification.into();
        }

        pub fn set_latency(&self, latency: Duration) {
            self.state.lock().unwrap().latency = Some(latency);
        }

        pub fn fail_metadata(&self, fail: bool) {
            self.state.lock().unwrap().fail_metadata = fail;
        }

        pub fn fail_start(&self, fail: bool) {
            self.state.lock().unwrap().fail_start = fail;
        }

        pub fn fail_stop(&self, fail: bool) {
            self.state.lock().unwrap().fail_stop = fail;
        }

        pub fn add_process(&self, group: &str, name: &str, state: ProcessState) {
            let info = ProcessInfo {
                group: group.to_string(),
                name: name.to_string(),
                state: state.code(),
                statename: state.to_string(),
                description: String::new(),
                now: 1_700_000_000,
                pid: if state.is_running() { 4242 } else { 0 },
                logfile: format!("/var/log/{}.log", name),
                stdout_logfile: format!("/var/log/{}.log", name),
                stderr_logfile: format!("/var/log/{}-err.log", name),
                ..Default::default()
            };
            self.state.lock().unwrap().processes.push(info);
        }

        pub fn remove_process(&self, full_name: &str) {
            self.state
                .lock()
                .unwrap()
                .processes
                .retain(|p| format!("{}:{}", p.group, p.name) != full_name);
        }

        pub fn set_process_state(&self, full_name: &str, state: ProcessState) {
            self.with_process(full_name, |p| {
                p.state = state.code();
                p.statename = state.to_string();
                p.pid = if state.is_running() { 4242 } else { 0 };
            });
        }

        /// Only touches the fields ignored by change detection
        pub fn tick_volatile(&self, full_name: &str, description: &str) {
            self.with_process(full_name, |p| {
                p.description = description.to_string();
                p.now += 1;
            });
        }

        /// Journal of issued calls, e.g. `stopProcess:web:api`
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn with_process(&self, full_name: &str, f: impl FnOnce(&mut ProcessInfo)) {
            let mut state = self.state.lock().unwrap();
            if let Some(p) = state
                .processes
                .iter_mut()
                .find(|p| format!("{}:{}", p.group, p.name) == full_name)
            {
                f(p);
            }
        }

        /// Records the call, applies latency, then snapshots the state
        async fn enter(&self, call: String) -> Result<MockState, RpcError> {
            self.calls.lock().unwrap().push(call);
            let latency = self.state.lock().unwrap().latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let state = self.state.lock().unwrap().clone();
            if state.pid.is_none() {
                return Err(RpcError::Transport("connection refused".to_string()));
            }
            Ok(state)
        }

        async fn metadata(&self, call: &str, pick: fn(&MockState) -> String) -> Result<String, RpcError> {
            let state = self.enter(call.to_string()).await?;
            if state.fail_metadata {
                return Err(RpcError::Transport(format!("{} failed", call)));
            }
            Ok(pick(&state))
        }

        fn find(state: &MockState, full_name: &str) -> Result<ProcessInfo, RpcError> {
            state
                .processes
                .iter()
                .find(|p| format!("{}:{}", p.group, p.name) == full_name)
                .cloned()
                .ok_or_else(|| RpcError::Fault {
                    code: FAULT_BAD_NAME,
                    message: format!("BAD_NAME: {}", full_name),
                })
        }
    }

    impl Default for MockSupervisorRpc {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SupervisorRpc for MockSupervisorRpc {
        async fn get_pid(&self) -> Result<i64, RpcError> {
            let state = self.enter("getPID".to_string()).await?;
            state
                .pid
                .ok_or_else(|| RpcError::Transport("connection refused".to_string()))
        }

        async fn get_identification(&self) -> Result<String, RpcError> {
            self.metadata("getIdentification", |s| s.identification.clone())
                .await
        }

        async fn get_api_version(&self) -> Result<String, RpcError> {
            self.metadata("getAPIVersion", |s| s.api_version.clone()).await
        }

        async fn get_version(&self) -> Result<String, RpcError> {
            self.metadata("getVersion", |s| s.version.clone()).await
        }

        async fn get_supervisor_version(&self) -> Result<String, RpcError> {
            self.metadata("getSupervisorVersion", |s| s.supervisor_version.clone())
                .await
        }

        async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>, RpcError> {
            let state = self.enter("getAllProcessInfo".to_string()).await?;
            Ok(state.processes)
        }

        async fn get_process_info(&self, full_name: &str) -> Result<ProcessInfo, RpcError> {
            let state = self.enter(format!("getProcessInfo:{}", full_name)).await?;
            Self::find(&state, full_name)
        }

        async fn start_process(&self, full_name: &str) -> Result<(), RpcError> {
            let state = self.enter(format!("startProcess:{}", full_name)).await?;
            let current = Self::find(&state, full_name)?;
            if state.fail_start || ProcessState::from(current.state).is_running() {
                return Err(RpcError::Fault {
                    code: FAULT_ALREADY_STARTED,
                    message: format!("ALREADY_STARTED: {}", full_name),
                });
            }
            self.set_process_state(full_name, ProcessState::Running);
            Ok(())
        }

        async fn stop_process(&self, full_name: &str) -> Result<(), RpcError> {
            let state = self.enter(format!("stopProcess:{}", full_name)).await?;
            let current = Self::find(&state, full_name)?;
            if state.fail_stop || !ProcessState::from(current.state).is_running() {
                return Err(RpcError::Fault {
                    code: FAULT_NOT_RUNNING,
                    message: format!("NOT_RUNNING: {}", full_name),
                });
            }
            self.set_process_state(full_name, ProcessState::Stopped);
            Ok(())
        }
    }

    /// Hands out one shared mock per supervisor name
    #[derive(Default)]
    pub struct MockConnector {
        clients: Mutex<HashMap<String, Arc<MockSupervisorRpc>>>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-register (or fetch) the mock backing `name`
        pub fn client(&self, name: &str) -> Arc<MockSupervisorRpc> {
            self.clients
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MockSupervisorRpc::new()))
                .clone()
        }
    }

    impl RpcConnector for MockConnector {
        fn connect(&self, config: &SupervisorConfig) -> Result<Arc<dyn SupervisorRpc>, RpcError> {
            let client: Arc<dyn SupervisorRpc> = self.client(&config.name);
            Ok(client)
        }
    }
}
