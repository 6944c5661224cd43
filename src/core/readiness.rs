use crate::domain::model::ReadinessProbe;
use crate::utils::error::{LauncherError, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(50);

/// 等到服務可達為止, 超過 probe 的 timeout 就回 ReadinessTimeoutError
pub async fn wait_until_ready(service: &str, probe: &ReadinessProbe) -> Result<()> {
    match probe {
        ReadinessProbe::Tcp {
            host,
            port,
            timeout_seconds,
            interval_ms,
        } => {
            wait_for_tcp(
                service,
                host,
                *port,
                Duration::from_secs(*timeout_seconds),
                Duration::from_millis(*interval_ms),
            )
            .await
        }
        ReadinessProbe::Http {
            url,
            timeout_seconds,
            interval_ms,
        } => {
            wait_for_http(
                service,
                url,
                Duration::from_secs(*timeout_seconds),
                Duration::from_millis(*interval_ms),
            )
            .await
        }
    }
}

async fn wait_for_tcp(
    service: &str,
    host: &str,
    port: u16,
    deadline: Duration,
    interval: Duration,
) -> Result<()> {
    let started = Instant::now();
    let addr = format!("{}:{}", host, port);

    tracing::debug!("Probing tcp://{} for service '{}'", addr, service);

    loop {
        let connect_timeout = interval.max(MIN_CONNECT_TIMEOUT);
        if let Ok(Ok(_stream)) = timeout(connect_timeout, TcpStream::connect(addr.as_str())).await {
            tracing::debug!("tcp://{} accepted a connection", addr);
            return Ok(());
        }

        if started.elapsed() >= deadline {
            return Err(LauncherError::ReadinessTimeoutError {
                service: service.to_string(),
                seconds: deadline.as_secs(),
            });
        }

        sleep(interval).await;
    }
}

async fn wait_for_http(
    service: &str,
    url: &str,
    deadline: Duration,
    interval: Duration,
) -> Result<()> {
    let started = Instant::now();
    let client = reqwest::Client::builder()
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()?;

    tracing::debug!("Probing {} for service '{}'", url, service);

    loop {
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("{} answered {}", url, response.status());
                return Ok(());
            }
            Ok(response) => {
                tracing::debug!("{} answered {}, not ready yet", url, response.status());
            }
            Err(e) => {
                tracing::debug!("{} not reachable yet: {}", url, e);
            }
        }

        if started.elapsed() >= deadline {
            return Err(LauncherError::ReadinessTimeoutError {
                service: service.to_string(),
                seconds: deadline.as_secs(),
            });
        }

        sleep(interval).await;
    }
}
