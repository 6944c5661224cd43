#![cfg(unix)]

use httpmock::prelude::*;
use small_launcher::core::readiness;
use small_launcher::{
    LauncherError, ReadinessProbe, RestartConfig, ServiceKind, ServiceSpec, Supervisor,
    SupervisorEvent, SupervisorOptions, TokioProcessRunner,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn tcp_probe(port: u16, timeout_seconds: u64) -> ReadinessProbe {
    ReadinessProbe::Tcp {
        host: "127.0.0.1".to_string(),
        port,
        timeout_seconds,
        interval_ms: 50,
    }
}

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

async fn unused_port() -> u16 {
    // Bind and drop: the port is free immediately afterwards
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_tcp_probe_succeeds_for_listening_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let result = readiness::wait_until_ready("admin", &tcp_probe(port, 5)).await;
    assert!(result.is_ok());

    drop(listener);
}

#[tokio::test]
async fn test_tcp_probe_times_out_for_closed_port() {
    let port = unused_port().await;

    let started = Instant::now();
    let result = readiness::wait_until_ready("admin", &tcp_probe(port, 1)).await;

    match result {
        Err(LauncherError::ReadinessTimeoutError { service, seconds }) => {
            assert_eq!(service, "admin");
            assert_eq!(seconds, 1);
        }
        other => panic!("expected ReadinessTimeoutError, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_http_probe_succeeds_on_2xx() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/admin");
        then.status(200).body("ok");
    });

    let probe = ReadinessProbe::Http {
        url: server.url("/admin"),
        timeout_seconds: 5,
        interval_ms: 50,
    };

    assert!(readiness::wait_until_ready("admin", &probe).await.is_ok());
    health.assert();
}

#[tokio::test]
async fn test_http_probe_times_out_on_persistent_5xx() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/admin");
        then.status(503);
    });

    let probe = ReadinessProbe::Http {
        url: server.url("/admin"),
        timeout_seconds: 1,
        interval_ms: 50,
    };

    assert!(matches!(
        readiness::wait_until_ready("admin", &probe).await,
        Err(LauncherError::ReadinessTimeoutError { .. })
    ));
}

#[tokio::test]
async fn test_supervisor_emits_ready_once_the_port_answers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut admin = sh("admin", ServiceKind::Foreground, "sleep 0.5");
    admin.readiness = Some(tcp_probe(port, 5));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(
        TokioProcessRunner::new(),
        vec![admin],
        SupervisorOptions::default(),
    )
    .with_events(tx);

    assert_eq!(supervisor.run().await.unwrap(), 0);

    let mut saw_ready = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SupervisorEvent::ServiceReady { ref service, .. } if service == "admin")
        {
            saw_ready = true;
        }
    }
    assert!(saw_ready);

    drop(listener);
}

#[tokio::test]
async fn test_supervisor_fails_fast_when_foreground_never_opens_its_port() {
    let port = unused_port().await;

    let mut admin = sh("admin", ServiceKind::Foreground, "sleep 30");
    admin.readiness = Some(tcp_probe(port, 1));

    let supervisor = Supervisor::new(
        TokioProcessRunner::new(),
        vec![admin],
        SupervisorOptions {
            grace_period: Duration::from_secs(5),
        },
    );

    let started = Instant::now();
    let result = supervisor.run().await;

    assert!(matches!(
        result,
        Err(LauncherError::ReadinessTimeoutError { .. })
    ));
    // The probe failure must tear the foreground down, not wait out its sleep
    assert!(started.elapsed() < Duration::from_secs(10));
}
