//! Integration Tests for Multi-Device Runs

#[path = "../test_utils/mod.rs"]
mod test_utils;

use netrepeat::config::{DeviceEntry, FileConfig, RunSection};
use netrepeat::fleet::{first_failure, run_fleet, run_fleet_until};
use netrepeat::{CommandInput, ErrorKind, Runner};
use std::time::Duration;
use tempfile::TempDir;
use test_utils::{create_test_run_config, log_records, MockConnector};

#[tokio::test]
async fn test_entries_in_input_order_with_separate_logs() {
    let temp_dir = TempDir::new().unwrap();
    let hosts = ["r1", "r2", "r3", "r4", "r5"];
    let configs: Vec<_> = hosts
        .iter()
        .map(|host| {
            let mut config = create_test_run_config(temp_dir.path(), host, &["show clock"]);
            config.repeat = 2;
            config
        })
        .collect();

    let connector = MockConnector::new().with_delay(Duration::from_millis(5));
    let runner = Runner::new(connector.clone());
    let entries = run_fleet(&runner, &configs, 2).await;

    let order: Vec<&str> = entries.iter().map(|e| e.host.as_str()).collect();
    assert_eq!(order, hosts);
    assert!(entries.iter().all(|e| e.is_ok()));
    for config in &configs {
        assert_eq!(log_records(&config.log_path).len(), 2);
    }
    assert!(connector.peak_sessions() <= 2);
    assert_eq!(connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_others() {
    let temp_dir = TempDir::new().unwrap();
    let configs: Vec<_> = ["r1", "r2", "r3"]
        .iter()
        .map(|host| create_test_run_config(temp_dir.path(), host, &["show clock"]))
        .collect();

    let connector = MockConnector::new().fail_connect("r2");
    let entries = run_fleet(&Runner::new(connector.clone()), &configs, 4).await;

    assert!(entries[0].is_ok());
    assert!(!entries[1].is_ok());
    assert!(entries[2].is_ok());
    assert_eq!(first_failure(&entries).unwrap().kind(), ErrorKind::Connection);
    assert_eq!(connector.executed("r3"), vec!["show clock"]);
}

#[tokio::test]
async fn test_zero_parallel_still_runs() {
    let temp_dir = TempDir::new().unwrap();
    let configs = vec![create_test_run_config(temp_dir.path(), "r1", &["show clock"])];

    let entries = run_fleet(&Runner::new(MockConnector::new()), &configs, 0).await;
    assert!(entries[0].is_ok());
}

#[tokio::test]
async fn test_shutdown_cancels_pending_and_running() {
    let temp_dir = TempDir::new().unwrap();
    let configs: Vec<_> = ["r1", "r2", "r3"]
        .iter()
        .map(|host| {
            let mut config = create_test_run_config(temp_dir.path(), host, &["show clock"]);
            config.repeat = 50;
            config
        })
        .collect();

    let connector = MockConnector::new().with_delay(Duration::from_millis(10));
    let runner = Runner::new(connector.clone());
    let entries = run_fleet_until(
        &runner,
        &configs,
        1,
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    assert_eq!(entries.len(), 3);
    for entry in &entries {
        let err = entry.result.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{}", entry.host);
    }
    assert_eq!(connector.log("r3").opened, 0);
    assert_eq!(connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_file_config_drives_fleet() {
    let temp_dir = TempDir::new().unwrap();
    let file_config = FileConfig {
        run: RunSection {
            commands: vec![CommandInput::from("show version")],
            logdir: temp_dir.path().join("log"),
            logfile: "{host}.log".to_string(),
            ..RunSection::default()
        },
        devices: vec![DeviceEntry::new("core1"), DeviceEntry::new("core2")],
        ..FileConfig::default()
    };

    let configs = file_config.into_run_configs().unwrap();
    let entries = run_fleet(&Runner::new(MockConnector::new()), &configs, 4).await;

    assert!(entries.iter().all(|e| e.is_ok()));
    assert!(temp_dir.path().join("log").join("core1.log").is_file());
    assert!(temp_dir.path().join("log").join("core2.log").is_file());
}
