//! Integration Tests for Error Handling
//!
//! Every failure aborts the run, keeps what was already logged, and still
//! releases the session.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use netrepeat::{Error, ErrorKind, Runner};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use test_utils::{create_test_run_config, log_records, Failure, MockConnector};

#[tokio::test]
async fn test_config_command_rejected_before_contact() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["configure terminal"]);

    let connector = MockConnector::new();
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert!(matches!(err, Error::UnsupportedCommand { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("configure terminal"));
    assert_eq!(connector.log("r1").opened, 0);
    assert!(!config.log_path.exists());
}

#[tokio::test]
async fn test_zero_repeat_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_run_config(temp_dir.path(), "r1", &["show clock"]);
    config.repeat = 0;

    let connector = MockConnector::new();
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert!(matches!(err, Error::InvalidRepeat { repeat: 0 }));
    assert_eq!(connector.log("r1").opened, 0);
}

#[tokio::test]
async fn test_transport_failure_keeps_earlier_records() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_run_config(
        temp_dir.path(),
        "r1",
        &["show a", "show b", "show c", "show d", "show e"],
    );
    config.repeat = 2;

    // Three commands go through, the fourth hits a dead connection
    let connector = MockConnector::new().fail_at(4, Failure::Transport);
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(err.command(), Some("show d"));
    assert_eq!(connector.executed("r1").len(), 4);

    let logged: Vec<String> = log_records(&config.log_path)
        .into_iter()
        .map(|(command, _)| command)
        .collect();
    assert_eq!(logged, vec!["show a", "show b", "show c"]);
    assert_eq!(connector.log("r1").closed, 1);
}

#[tokio::test]
async fn test_decode_failure_not_logged() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["show a", "show b"]);

    let connector = MockConnector::new().fail_at(2, Failure::Decode);
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(log_records(&config.log_path).len(), 1);
}

#[tokio::test]
async fn test_rejected_and_timed_out_commands_are_transport_failures() {
    for failure in [Failure::Rejected, Failure::Timeout] {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_run_config(temp_dir.path(), "r1", &["show a"]);

        let connector = MockConnector::new().fail_at(1, failure);
        let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport, "{:?}", failure);
        assert_eq!(connector.log("r1").closed, 1);
    }
}

#[tokio::test]
async fn test_connection_failure() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["show clock"]);

    let connector = MockConnector::new().fail_connect("r1");
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert!(matches!(err, Error::ConnectionFailed { .. }));
    assert_eq!(err.kind().exit_code(), 4);
    assert!(connector.executed("r1").is_empty());
}

#[tokio::test]
async fn test_log_write_failure_stops_run() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_run_config(temp_dir.path(), "r1", &["show a", "show b"]);
    // A directory where the log file should be
    fs::create_dir_all(&config.log_path).unwrap();
    config.repeat = 3;

    let connector = MockConnector::new();
    let err = Runner::new(connector.clone()).run(&config).await.unwrap_err();

    assert!(matches!(err, Error::LogWrite { .. }));
    assert_eq!(err.command(), Some("show a"));
    assert_eq!(connector.executed("r1"), vec!["show a"]);
    assert_eq!(connector.log("r1").closed, 1);
}

#[tokio::test]
async fn test_log_directory_failure_precedes_validation() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();

    // Even an invalid command list reports the directory problem first
    let mut config = create_test_run_config(temp_dir.path(), "r1", &["conf t"]);
    config.log_dir = blocker.join("log");
    config.log_path = config.log_dir.join("r1.log");

    let err = Runner::new(MockConnector::new()).run(&config).await.unwrap_err();
    assert!(matches!(err, Error::LogDirectory { .. }));
}

#[tokio::test]
async fn test_close_failure_does_not_fail_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["show clock"]);

    let connector = MockConnector::new().fail_close();
    let report = Runner::new(connector).run(&config).await.unwrap();
    assert_eq!(report.executed, 1);
}

#[tokio::test]
async fn test_cancellation_closes_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_run_config(temp_dir.path(), "r1", &["show clock"]);
    config.repeat = 100;

    let connector = MockConnector::new().with_delay(Duration::from_millis(20));
    let runner = Runner::new(connector.clone());
    let err = runner
        .run_until(&config, tokio::time::sleep(Duration::from_millis(70)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert_eq!(err.kind().exit_code(), 130);
    assert!(connector.executed("r1").len() < 100);
    assert_eq!(connector.log("r1").closed, 1);
    assert_eq!(connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_cancellation_during_login() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["show clock"]);

    let connector = MockConnector::new().with_open_delay(Duration::from_secs(3));
    let started = Instant::now();
    let err = Runner::new(connector.clone())
        .run_until(&config, tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(connector.executed("r1").is_empty());
    assert_eq!(connector.active_sessions(), 0);
    assert!(!config.log_path.exists());
}
