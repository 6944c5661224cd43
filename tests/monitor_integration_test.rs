#![cfg(all(unix, feature = "cli"))]

use small_launcher::core::{ProcessHandle, ProcessRunner};
use small_launcher::utils::monitor::ProcessTableMonitor;
use small_launcher::{RestartConfig, ServiceKind, ServiceSpec, TokioProcessRunner};
use std::collections::HashMap;

fn sleeper(name: &str) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        command: "/bin/sleep".to_string(),
        args: vec!["5".to_string()],
        env: HashMap::new(),
        working_dir: None,
        kind: ServiceKind::Background,
        critical: false,
        restart: RestartConfig::never(),
        readiness: None,
    }
}

#[tokio::test]
async fn test_monitor_sees_live_children_and_detects_death() {
    let runner = TokioProcessRunner::new();
    let mut handle = runner.spawn(&sleeper("worker")).await.unwrap();
    let pid = handle.pid().unwrap();

    let monitor = ProcessTableMonitor::new(true);
    let children = vec![("worker".to_string(), pid)];

    let stats = monitor.snapshot(&children).unwrap();
    assert_eq!(stats.len(), 1);
    assert!(stats[0].alive);
    assert_eq!(stats[0].pid, pid);
    assert!(monitor.missing(&children).is_empty());

    handle.kill().await.unwrap();

    // Once the child is reaped it must drop out of the process table
    let missing = monitor.missing(&children);
    assert_eq!(missing, vec!["worker".to_string()]);
}

#[test]
fn test_disabled_monitor_reports_nothing() {
    let monitor = ProcessTableMonitor::new(false);
    assert!(!monitor.is_enabled());
    assert!(monitor.snapshot(&[("worker".to_string(), 1)]).is_none());
    assert!(monitor.missing(&[("worker".to_string(), 1)]).is_empty());
}
