// Process Domain Model

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// supervisord process state codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
}

/// States for which a process is considered alive
pub const RUNNING_STATES: [ProcessState; 3] = [
    ProcessState::Running,
    ProcessState::Backoff,
    ProcessState::Starting,
];

impl ProcessState {
    pub fn code(self) -> i64 {
        match self {
            ProcessState::Stopped => 0,
            ProcessState::Starting => 10,
            ProcessState::Running => 20,
            ProcessState::Backoff => 30,
            ProcessState::Stopping => 40,
            ProcessState::Exited => 100,
            ProcessState::Fatal => 200,
            ProcessState::Unknown => 1000,
        }
    }

    pub fn is_running(self) -> bool {
        RUNNING_STATES.contains(&self)
    }
}

impl From<i64> for ProcessState {
    fn from(code: i64) -> Self {
        match code {
            0 => ProcessState::Stopped,
            10 => ProcessState::Starting,
            20 => ProcessState::Running,
            30 => ProcessState::Backoff,
            40 => ProcessState::Stopping,
            100 => ProcessState::Exited,
            200 => ProcessState::Fatal,
            _ => ProcessState::Unknown,
        }
    }
}

impl From<ProcessState> for i64 {
    fn from(state: ProcessState) -> Self {
        state.code()
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "STOPPED"),
            ProcessState::Starting => write!(f, "STARTING"),
            ProcessState::Running => write!(f, "RUNNING"),
            ProcessState::Backoff => write!(f, "BACKOFF"),
            ProcessState::Stopping => write!(f, "STOPPING"),
            ProcessState::Exited => write!(f, "EXITED"),
            ProcessState::Fatal => write!(f, "FATAL"),
            ProcessState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Raw process record as reported by `getProcessInfo` / `getAllProcessInfo`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub group: String,
    pub name: String,
    pub state: i64,
    pub statename: String,
    pub description: String,
    pub now: i64,
    pub pid: i64,
    pub start: i64,
    pub stop: i64,
    pub exitstatus: i64,
    pub spawnerr: String,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
}

/// One managed process under one supervisor
///
/// `supervisor` is a lookup key into the supervisor table, not an owner
/// reference; `host` is denormalized for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub group: String,
    pub name: String,
    pub full_name: String,
    pub uid: String,
    pub supervisor: String,
    pub host: String,
    pub state: ProcessState,
    pub statename: String,
    pub description: String,
    pub now: i64,
    pub running: bool,
    pub pid: i64,
    pub start: i64,
    pub stop: i64,
    pub exitstatus: i64,
    pub spawnerr: String,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
}

impl Process {
    pub fn new(supervisor: &str, host: &str, info: ProcessInfo) -> Self {
        let full_name = format!("{}:{}", info.group, info.name);
        let uid = format!("{}@{}", full_name, supervisor);
        let state = ProcessState::from(info.state);
        Self {
            group: info.group,
            name: info.name,
            full_name,
            uid,
            supervisor: supervisor.to_string(),
            host: host.to_string(),
            running: state.is_running(),
            state,
            statename: info.statename,
            description: info.description,
            now: info.now,
            pid: info.pid,
            start: info.start,
            stop: info.stop,
            exitstatus: info.exitstatus,
            spawnerr: info.spawnerr,
            logfile: info.logfile,
            stdout_logfile: info.stdout_logfile,
            stderr_logfile: info.stderr_logfile,
        }
    }

    /// Rebuild this snapshot from fresh info, keeping the owner fields
    pub fn updated(&self, info: ProcessInfo) -> Self {
        Self::new(&self.supervisor, &self.host, info)
    }
}

/// Change detection: `description` and `now` are volatile and ignored
impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.name == other.name
            && self.full_name == other.full_name
            && self.uid == other.uid
            && self.supervisor == other.supervisor
            && self.host == other.host
            && self.state == other.state
            && self.statename == other.statename
            && self.running == other.running
            && self.pid == other.pid
            && self.start == other.start
            && self.stop == other.stop
            && self.exitstatus == other.exitstatus
            && self.spawnerr == other.spawnerr
            && self.logfile == other.logfile
            && self.stdout_logfile == other.stdout_logfile
            && self.stderr_logfile == other.stderr_logfile
    }
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.full_name, self.supervisor)
    }
}

/// Split `group:name@supervisor` into (`group:name`, `supervisor`)
///
/// Supervisor names never contain `@`, so the split is at the last one.
pub fn split_uid(uid: &str) -> Result<(&str, &str)> {
    match uid.rsplit_once('@') {
        Some((full_name, supervisor)) if !full_name.is_empty() && !supervisor.is_empty() => {
            Ok((full_name, supervisor))
        }
        _ => Err(DomainError::InvalidUid(uid.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(state: ProcessState) -> ProcessInfo {
        ProcessInfo {
            group: "web".to_string(),
            name: "api".to_string(),
            state: state.code(),
            statename: state.to_string(),
            description: "pid 42, uptime 0:01:00".to_string(),
            now: 1_700_000_000,
            pid: 42,
            start: 1_699_999_940,
            ..Default::default()
        }
    }

    #[test]
    fn test_derived_identity() {
        let process = Process::new("lid001", "lid001.example.org", info(ProcessState::Running));
        assert_eq!(process.full_name, "web:api");
        assert_eq!(process.uid, "web:api@lid001");
        assert_eq!(process.supervisor, "lid001");
        assert_eq!(process.host, "lid001.example.org");
        assert!(process.running);
    }

    #[test]
    fn test_uid_unique_across_supervisors() {
        let a = Process::new("lid001", "h1", info(ProcessState::Running));
        let b = Process::new("lid002", "h2", info(ProcessState::Running));
        assert_eq!(a.full_name, b.full_name);
        assert_ne!(a.uid, b.uid);
    }

    #[test]
    fn test_equality_ignores_description_and_now() {
        let a = Process::new("s", "h", info(ProcessState::Running));
        let mut changed = info(ProcessState::Running);
        changed.description = "pid 42, uptime 0:02:00".to_string();
        changed.now += 60;
        let b = a.updated(changed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_detects_state_change() {
        let a = Process::new("s", "h", info(ProcessState::Running));
        let b = a.updated(info(ProcessState::Stopped));
        assert_ne!(a, b);
        assert!(!b.running);
    }

    #[test]
    fn test_running_states() {
        assert!(ProcessState::Starting.is_running());
        assert!(ProcessState::Backoff.is_running());
        assert!(!ProcessState::Exited.is_running());
        assert!(!ProcessState::Fatal.is_running());
        assert_eq!(ProcessState::from(999), ProcessState::Unknown);
    }

    #[test]
    fn test_state_serializes_as_code() {
        let process = Process::new("s", "h", info(ProcessState::Running));
        let json = serde_json::to_value(&process).unwrap();
        assert_eq!(json["state"], 20);
        assert_eq!(json["uid"], "web:api@s");
    }

    #[test]
    fn test_equality_detects_log_path_change() {
        let a = Process::new("s", "h", info(ProcessState::Running));
        let mut moved = info(ProcessState::Running);
        moved.stdout_logfile = "/var/log/web/api-stdout.log".to_string();
        assert_ne!(a, a.updated(moved));

        let mut moved = info(ProcessState::Running);
        moved.stderr_logfile = "/var/log/web/api-stderr.log".to_string();
        assert_ne!(a, a.updated(moved));
    }

    #[test]
    fn test_split_uid() {
        assert_eq!(split_uid("web:api@lid001").unwrap(), ("web:api", "lid001"));
        assert!(split_uid("web:api").is_err());
        assert!(split_uid("@lid001").is_err());
        assert!(split_uid("web:api@").is_err());
    }

    #[test]
    fn test_split_uid_with_at_sign_in_program_name() {
        let process = Process::new(
            "lid001",
            "h",
            ProcessInfo {
                group: "mail".to_string(),
                name: "relay@smtp".to_string(),
                ..info(ProcessState::Running)
            },
        );
        assert_eq!(process.uid, "mail:relay@smtp@lid001");
        assert_eq!(
            split_uid(&process.uid).unwrap(),
            ("mail:relay@smtp", "lid001")
        );
    }
}
