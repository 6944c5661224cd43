#![cfg(unix)]

use small_launcher::{
    LauncherError, RestartConfig, RestartPolicy, ServiceKind, ServiceSpec, ShutdownReason,
    Supervisor, SupervisorEvent, SupervisorOptions, TokioProcessRunner,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;

fn sh(name: &str, kind: ServiceKind, script: &str) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: HashMap::new(),
        working_dir: None,
        kind,
        critical: false,
        restart: RestartConfig::never(),
        readiness: None,
    }
}

fn options(grace_secs: u64) -> SupervisorOptions {
    SupervisorOptions {
        grace_period: Duration::from_secs(grace_secs),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn assert_process_gone(pid: u32) {
    let proc_path = format!("/proc/{}", pid);
    for _ in 0..20 {
        if !std::path::Path::new(&proc_path).exists() {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("pid {} still present in the process table", pid);
}

#[tokio::test]
async fn test_foreground_exit_code_becomes_launcher_exit_code() {
    let services = vec![sh("admin", ServiceKind::Foreground, "exit 7")];
    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options(5));

    assert_eq!(supervisor.run().await.unwrap(), 7);
}

#[tokio::test]
async fn test_background_is_terminated_when_foreground_exits() {
    let services = vec![
        sh("worker", ServiceKind::Background, "sleep 30"),
        sh("admin", ServiceKind::Foreground, "sleep 0.2"),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel();
    let supervisor =
        Supervisor::new(TokioProcessRunner::new(), services, options(5)).with_events(tx);

    let started = Instant::now();
    assert_eq!(supervisor.run().await.unwrap(), 0);
    // Teardown must not wait for the 30s sleep
    assert!(started.elapsed() < Duration::from_secs(10));

    let events = drain(&mut rx);
    let worker_pid = events
        .iter()
        .find_map(|e| match e {
            SupervisorEvent::ServiceStarted { service, pid, .. } if service == "worker" => {
                Some(*pid)
            }
            _ => None,
        })
        .expect("worker never started");

    assert_process_gone(worker_pid).await;
}

#[tokio::test]
async fn test_failing_background_is_restarted_with_backoff() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("attempts.log");

    let mut worker = sh(
        "worker",
        ServiceKind::Background,
        &format!("echo run >> {}; exit 1", marker.display()),
    );
    worker.restart = RestartConfig {
        policy: RestartPolicy::OnFailure,
        max_restarts: 2,
        backoff_seconds: 0,
        max_backoff_seconds: 0,
    };

    let services = vec![worker, sh("admin", ServiceKind::Foreground, "sleep 1")];
    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options(5));

    assert_eq!(supervisor.run().await.unwrap(), 0);

    // Initial launch plus two restarts
    let attempts = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(attempts.lines().count(), 3);
}

#[tokio::test]
async fn test_shutdown_handle_gracefully_stops_the_stack() {
    let services = vec![
        sh("worker", ServiceKind::Background, "sleep 30"),
        sh("admin", ServiceKind::Foreground, "sleep 30"),
    ];
    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options(5));
    let shutdown = supervisor.shutdown_handle();

    let started = Instant::now();
    let run = tokio::spawn(supervisor.run());
    sleep(Duration::from_millis(200)).await;
    shutdown.shutdown(ShutdownReason::Signal);

    // SIGTERM kills a plain sleep, so this is 128 + 15
    assert_eq!(run.await.unwrap().unwrap(), 143);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_sigterm_ignoring_foreground_is_killed_after_grace() {
    let services = vec![sh(
        "admin",
        ServiceKind::Foreground,
        "trap '' TERM; while :; do sleep 0.2; done",
    )];
    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options(1));
    let shutdown = supervisor.shutdown_handle();

    let started = Instant::now();
    let run = tokio::spawn(supervisor.run());
    sleep(Duration::from_millis(200)).await;
    shutdown.shutdown(ShutdownReason::Signal);

    // Grace period expires, SIGKILL lands: 128 + 9
    assert_eq!(run.await.unwrap().unwrap(), 137);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_critical_background_failure_tears_the_stack_down() {
    let mut bot = sh("bot", ServiceKind::Background, "exit 1");
    bot.critical = true;

    let services = vec![bot, sh("admin", ServiceKind::Foreground, "sleep 30")];
    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options(5));

    let started = Instant::now();
    let result = supervisor.run().await;
    match result {
        Err(LauncherError::ServiceFailedError { service }) => assert_eq!(service, "bot"),
        other => panic!("expected ServiceFailedError, got {:?}", other),
    }
    // The 30s foreground must have been torn down, not waited out
    assert!(started.elapsed() < Duration::from_secs(10));
}
