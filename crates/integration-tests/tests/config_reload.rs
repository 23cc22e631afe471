//! INI configuration loading and live reload of the supervisor table

use std::io::Write;
use std::sync::Arc;

use multivisor_core::application::{EventBus, Multivisor};
use multivisor_core::domain::ProcessState;
use multivisor_core::port::supervisor_rpc::mocks::MockConnector;
use multivisor_core::port::time_provider::mocks::FixedTimeProvider;
use multivisor_core::port::ConfigSource;
use multivisor_core::AppError;
use multivisor_infra_config::IniConfigSource;

fn write_config(file: &mut tempfile::NamedTempFile, text: &str) {
    let handle = file.as_file_mut();
    handle.set_len(0).unwrap();
    std::io::Seek::rewind(handle).unwrap();
    handle.write_all(text.as_bytes()).unwrap();
    handle.flush().unwrap();
}

fn temp_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
    write_config(&mut file, text);
    file
}

fn load(file: &tempfile::NamedTempFile, connector: Arc<MockConnector>) -> Multivisor {
    let source = Arc::new(IniConfigSource::new(file.path().to_string_lossy()));
    let bus = EventBus::new(64, Arc::new(FixedTimeProvider::new(0)));
    Multivisor::load(source, connector, bus).unwrap()
}

#[tokio::test]
async fn test_reload_adds_and_removes_supervisors() {
    let mut file = temp_config("[global]\nname = lab\n\n[supervisor:lid001]\nhost = a.example\n");
    let connector = Arc::new(MockConnector::new());
    connector
        .client("lid001")
        .add_process("web", "api", ProcessState::Running);
    connector
        .client("lid002")
        .add_process("db", "pg", ProcessState::Running);

    let multivisor = load(&file, connector.clone());
    multivisor.poll_supervisors().await;
    assert!(multivisor.get_process("web:api@lid001").await.is_ok());

    write_config(
        &mut file,
        "[global]\nname = lab-2\n\n[supervisor:lid002]\nhost = b.example\nport = 9011\n",
    );
    assert_eq!(multivisor.reload_config().await.unwrap(), 1);
    assert_eq!(multivisor.name().await, "lab-2");

    // Fresh table starts offline until the next poll
    let lid002 = multivisor.get_supervisor("lid002").await.unwrap();
    assert_eq!(lid002.config().port, 9011);
    assert!(!lid002.snapshot().await.running);

    multivisor.poll_supervisors().await;
    assert!(multivisor.get_process("db:pg@lid002").await.is_ok());
    assert!(matches!(
        multivisor.get_process("web:api@lid001").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_broken_reload_keeps_running_table() {
    let mut file = temp_config("[supervisor:lid001]\nhost = a.example\n");
    let multivisor = load(&file, Arc::new(MockConnector::new()));

    write_config(&mut file, "[supervisor:lid001]\nport = not-a-port\n");
    assert!(matches!(
        multivisor.reload_config().await,
        Err(AppError::Config(_))
    ));
    assert!(multivisor.get_supervisor("lid001").await.is_ok());
}

#[test]
fn test_supervisor_names_with_at_sign_are_rejected() {
    let source = IniConfigSource::inline("[supervisor:a@b]\nhost = a.example\n");
    assert!(matches!(source.load(), Err(AppError::Domain(_))));
}

#[tokio::test]
async fn test_mixed_case_supervisor_names_survive_into_uids() {
    let file = temp_config("[supervisor:Lab-A]\nport = 9002\n");
    let connector = Arc::new(MockConnector::new());
    connector
        .client("Lab-A")
        .add_process("web", "api", ProcessState::Running);

    let multivisor = load(&file, connector);
    multivisor.poll_supervisors().await;

    let supervisor = multivisor.get_supervisor("Lab-A").await.unwrap();
    assert_eq!(supervisor.config().host, "Lab-A");
    assert!(multivisor.get_process("web:api@Lab-A").await.is_ok());
    assert!(multivisor.get_supervisor("lab-a").await.is_err());
}
