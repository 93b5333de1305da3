//! Contract Tests for Session Lifecycle
//!
//! Contract: one run opens exactly one session, issues commands on it one
//! at a time, and closes it on every path once it was opened.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use netrepeat::{RunPhase, Runner};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_utils::{create_test_run_config, Failure, MockConnector};

#[tokio::test]
async fn test_one_session_per_run() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_run_config(temp_dir.path(), "r1", &["show a", "show b"]);
    config.repeat = 5;

    let connector = MockConnector::new();
    Runner::new(connector.clone()).run(&config).await.unwrap();

    let log = connector.log("r1");
    assert_eq!(log.opened, 1);
    assert_eq!(log.closed, 1);
    assert_eq!(log.executed.len(), 10);
    assert_eq!(connector.peak_sessions(), 1);
}

#[tokio::test]
async fn test_closed_on_every_failure_after_open() {
    for failure in [
        Failure::Transport,
        Failure::Timeout,
        Failure::Decode,
        Failure::Rejected,
    ] {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_run_config(temp_dir.path(), "r1", &["show a", "show b"]);

        let connector = MockConnector::new().fail_at(2, failure);
        assert!(Runner::new(connector.clone()).run(&config).await.is_err());

        let log = connector.log("r1");
        assert_eq!((log.opened, log.closed), (1, 1), "{:?}", failure);
    }
}

#[tokio::test]
async fn test_not_opened_when_validation_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_run_config(temp_dir.path(), "r1", &["show a", "CONF T"]);

    let connector = MockConnector::new();
    assert!(Runner::new(connector.clone()).run(&config).await.is_err());
    assert_eq!(connector.log("r1").opened, 0);
}

#[tokio::test]
async fn test_shared_connector_serves_concurrent_runs() {
    let temp_dir = TempDir::new().unwrap();
    let a = create_test_run_config(temp_dir.path(), "r1", &["show a"]);
    let b = create_test_run_config(temp_dir.path(), "r2", &["show b"]);

    let connector = MockConnector::new().with_delay(Duration::from_millis(10));
    let runner = Runner::new(Arc::new(connector.clone()));
    let (ra, rb) = tokio::join!(runner.run(&a), runner.run(&b));

    assert!(ra.is_ok() && rb.is_ok());
    assert_eq!(connector.executed("r1"), vec!["show a"]);
    assert_eq!(connector.executed("r2"), vec!["show b"]);
    assert_eq!(connector.active_sessions(), 0);
}

#[test]
fn test_phase_contract() {
    assert!(RunPhase::Idle.can_transition_to(RunPhase::Validating));
    assert!(RunPhase::Validating.can_transition_to(RunPhase::Failed));
    assert!(!RunPhase::Validating.can_transition_to(RunPhase::Reporting));
    assert!(!RunPhase::Done.can_transition_to(RunPhase::Validating));
}
