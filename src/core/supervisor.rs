use crate::core::backoff::Backoff;
use crate::core::readiness;
use crate::core::status::StatusBoard;
use crate::domain::model::{
    ExitOutcome, ReadinessProbe, ServiceSpec, ServiceState, ShutdownReason, SupervisorEvent,
};
use crate::domain::ports::{ProcessHandle, ProcessRunner};
use crate::utils::error::{LauncherError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};

/// 子行程活過這段時間就把 backoff 歸零
const STABLE_UPTIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// SIGTERM 之後等多久才升級成 SIGKILL
    pub grace_period: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
        }
    }
}

/// 讓外部 (OS signal handler, 測試) 觸發優雅關閉.
/// 第一個進來的 reason 贏, 之後的呼叫是 no-op.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self, reason: ShutdownReason) {
        let was_set = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });

        if was_set {
            tracing::info!("🛑 Shutdown started ({:?})", reason);
            if let Some(events) = &self.events {
                let _ = events.send(SupervisorEvent::ShutdownStarted {
                    reason,
                    at: Utc::now(),
                });
            }
        }
    }
}

/// 監管一組服務: 背景服務先起, foreground 最後;
/// foreground 結束 (或收到關閉要求) 就拆掉整組, exit code 跟著 foreground 走.
pub struct Supervisor<R: ProcessRunner + 'static> {
    runner: Arc<R>,
    services: Vec<ServiceSpec>,
    options: SupervisorOptions,
    status: StatusBoard,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
    shutdown_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl<R: ProcessRunner + 'static> Supervisor<R> {
    pub fn new(runner: R, services: Vec<ServiceSpec>, options: SupervisorOptions) -> Self {
        let (shutdown_tx, _) = watch::channel(None);
        Self {
            runner: Arc::new(runner),
            services,
            options,
            status: StatusBoard::new(),
            events: None,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// 把生命週期事件丟進這個 channel (觀察者/測試用)
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            events: self.events.clone(),
        }
    }

    /// 跑到 foreground 結束為止, 回傳 container 的 exit code.
    pub async fn run(self) -> Result<i32> {
        let foreground_count = self.services.iter().filter(|s| s.is_foreground()).count();
        if foreground_count != 1 {
            return Err(LauncherError::ConfigValidationError {
                field: "service.kind".to_string(),
                message: format!(
                    "Exactly one foreground service is required, found {}",
                    foreground_count
                ),
            });
        }
        let Some(foreground) = self.services.iter().find(|s| s.is_foreground()).cloned() else {
            return Err(LauncherError::MissingConfigError {
                field: "service.kind".to_string(),
            });
        };

        for spec in &self.services {
            self.status.register(&spec.name);
        }

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut probes: Vec<tokio::task::JoinHandle<Result<()>>> = Vec::new();

        // 背景服務先起, 依 manifest 順序
        let background: Vec<ServiceSpec> = self
            .services
            .iter()
            .filter(|s| !s.is_foreground())
            .cloned()
            .collect();

        for spec in background {
            let handle = match self.spawn_service(&spec).await {
                Ok(handle) => handle,
                Err(e) => {
                    self.abort_startup(&mut tasks).await;
                    return Err(e);
                }
            };
            if let Some(probe) = spec.readiness.clone() {
                probes.push(self.spawn_probe(&spec.name, probe));
            }
            tasks.spawn(supervise_background(self.context(), spec, handle));
        }

        let fg_handle = match self.spawn_service(&foreground).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_startup(&mut tasks).await;
                return Err(e);
            }
        };
        if let Some(probe) = foreground.readiness.clone() {
            probes.push(self.spawn_probe(&foreground.name, probe));
        }

        // foreground 的生命週期就是 launcher 的生命週期
        let fg_outcome = supervise_foreground(self.context(), foreground.clone(), fg_handle).await;

        self.shutdown_handle().shutdown(ShutdownReason::ForegroundExited);
        while tasks.join_next().await.is_some() {}

        // readiness 失敗優先於 exit code 回報
        for probe_task in probes {
            match probe_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }

        let reason = *self.shutdown_tx.borrow();
        if matches!(reason, Some(ShutdownReason::CriticalServiceFailed)) {
            let failed = self
                .services
                .iter()
                .find(|s| {
                    matches!(
                        self.status.get(&s.name),
                        Some(status) if status.state == ServiceState::Failed
                    )
                })
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(LauncherError::ServiceFailedError { service: failed });
        }

        match fg_outcome {
            Some(outcome) => {
                tracing::info!(
                    "Foreground service '{}' finished with {}",
                    foreground.name,
                    outcome
                );
                Ok(outcome.container_code())
            }
            None => {
                tracing::warn!(
                    "Foreground service '{}' finished with unknown status",
                    foreground.name
                );
                Ok(1)
            }
        }
    }

    async fn spawn_service(&self, spec: &ServiceSpec) -> Result<Box<dyn ProcessHandle>> {
        tracing::info!("🚀 Starting {} service '{}'", spec.kind, spec.name);
        let handle = self.runner.spawn(spec).await?;
        if let Some(pid) = handle.pid() {
            self.status.mark_started(&spec.name, pid);
            self.emit(SupervisorEvent::ServiceStarted {
                service: spec.name.clone(),
                pid,
                at: Utc::now(),
            });
        }
        Ok(handle)
    }

    fn spawn_probe(
        &self,
        name: &str,
        probe: ReadinessProbe,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let name = name.to_string();
        let status = self.status.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown_handle();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                result = readiness::wait_until_ready(&name, &probe) => match result {
                    Ok(()) => {
                        status.mark_ready(&name);
                        if let Some(tx) = &events {
                            let _ = tx.send(SupervisorEvent::ServiceReady {
                                service: name.clone(),
                                at: Utc::now(),
                            });
                        }
                        tracing::info!("✅ Service '{}' is ready", name);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!("❌ Service '{}' failed its readiness probe: {}", name, e);
                        shutdown.shutdown(ShutdownReason::ReadinessFailed);
                        Err(e)
                    }
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => Ok(()),
            }
        })
    }

    async fn abort_startup(&self, tasks: &mut JoinSet<()>) {
        self.shutdown_handle().shutdown(ShutdownReason::Requested);
        while tasks.join_next().await.is_some() {}
    }

    fn context(&self) -> ServiceContext<R> {
        ServiceContext {
            runner: self.runner.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown_handle(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            grace: self.options.grace_period,
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

struct ServiceContext<R: ProcessRunner + 'static> {
    runner: Arc<R>,
    status: StatusBoard,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
    shutdown: ShutdownHandle,
    shutdown_rx: watch::Receiver<Option<ShutdownReason>>,
    grace: Duration,
}

impl<R: ProcessRunner + 'static> ServiceContext<R> {
    fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn record_started(&self, name: &str, pid: Option<u32>) {
        if let Some(pid) = pid {
            self.status.mark_started(name, pid);
            self.emit(SupervisorEvent::ServiceStarted {
                service: name.to_string(),
                pid,
                at: Utc::now(),
            });
        }
    }

    fn record_exit(&self, name: &str, outcome: ExitOutcome) {
        self.status.mark_exited(name, outcome);
        self.emit(SupervisorEvent::ServiceExited {
            service: name.to_string(),
            outcome,
            at: Utc::now(),
        });
        tracing::info!("Service '{}' exited with {}", name, outcome);
    }
}

async fn supervise_background<R: ProcessRunner + 'static>(
    mut ctx: ServiceContext<R>,
    spec: ServiceSpec,
    mut handle: Box<dyn ProcessHandle>,
) {
    let mut backoff = Backoff::from_config(&spec.restart);

    loop {
        let started = Instant::now();

        tokio::select! {
            result = handle.wait() => {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("❌ Waiting on service '{}' failed: {}", spec.name, e);
                        ExitOutcome { code: None, signal: None }
                    }
                };
                ctx.record_exit(&spec.name, outcome);

                if started.elapsed() >= STABLE_UPTIME {
                    backoff.reset();
                }

                if !spec.restart.policy.should_restart(&outcome) {
                    if !outcome.success() {
                        give_up(&ctx, &spec);
                    }
                    return;
                }

                if backoff.attempt() >= spec.restart.max_restarts {
                    tracing::error!(
                        "❌ Service '{}' exhausted its {} restarts",
                        spec.name,
                        spec.restart.max_restarts
                    );
                    give_up(&ctx, &spec);
                    return;
                }

                let delay = backoff.next_delay();
                ctx.status.mark_backing_off(&spec.name, backoff.attempt());
                ctx.emit(SupervisorEvent::ServiceRestarting {
                    service: spec.name.clone(),
                    attempt: backoff.attempt(),
                    delay_ms: delay.as_millis() as u64,
                    at: Utc::now(),
                });
                tracing::warn!(
                    "🔄 Restarting service '{}' in {:?} (attempt {})",
                    spec.name,
                    delay,
                    backoff.attempt()
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = wait_for_shutdown(&mut ctx.shutdown_rx) => {
                        ctx.status.mark_stopped(&spec.name);
                        return;
                    }
                }

                match ctx.runner.spawn(&spec).await {
                    Ok(new_handle) => {
                        handle = new_handle;
                        ctx.record_started(&spec.name, handle.pid());
                    }
                    Err(e) => {
                        tracing::error!("❌ Respawning service '{}' failed: {}", spec.name, e);
                        give_up(&ctx, &spec);
                        return;
                    }
                }
            }
            _ = wait_for_shutdown(&mut ctx.shutdown_rx) => {
                let outcome = shutdown_child(&spec.name, handle.as_mut(), ctx.grace).await;
                if let Some(outcome) = outcome {
                    ctx.emit(SupervisorEvent::ServiceExited {
                        service: spec.name.clone(),
                        outcome,
                        at: Utc::now(),
                    });
                }
                ctx.status.mark_stopped(&spec.name);
                return;
            }
        }
    }
}

async fn supervise_foreground<R: ProcessRunner + 'static>(
    mut ctx: ServiceContext<R>,
    spec: ServiceSpec,
    mut handle: Box<dyn ProcessHandle>,
) -> Option<ExitOutcome> {
    tokio::select! {
        result = handle.wait() => match result {
            Ok(outcome) => {
                ctx.record_exit(&spec.name, outcome);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("❌ Waiting on foreground service '{}' failed: {}", spec.name, e);
                None
            }
        },
        _ = wait_for_shutdown(&mut ctx.shutdown_rx) => {
            tracing::info!("Stopping foreground service '{}'", spec.name);
            let outcome = shutdown_child(&spec.name, handle.as_mut(), ctx.grace).await;
            match outcome {
                Some(outcome) => ctx.record_exit(&spec.name, outcome),
                None => ctx.status.mark_stopped(&spec.name),
            }
            outcome
        }
    }
}

fn give_up<R: ProcessRunner + 'static>(ctx: &ServiceContext<R>, spec: &ServiceSpec) {
    ctx.status.mark_failed(&spec.name);
    ctx.emit(SupervisorEvent::ServiceGaveUp {
        service: spec.name.clone(),
        at: Utc::now(),
    });
    if spec.critical {
        tracing::error!(
            "❌ Critical service '{}' is down, shutting the container down",
            spec.name
        );
        ctx.shutdown.shutdown(ShutdownReason::CriticalServiceFailed);
    }
}

/// SIGTERM → 等 grace period → SIGKILL → 收屍
async fn shutdown_child(
    name: &str,
    handle: &mut dyn ProcessHandle,
    grace: Duration,
) -> Option<ExitOutcome> {
    if let Err(e) = handle.terminate() {
        tracing::warn!("⚠️ Could not deliver SIGTERM to service '{}': {}", name, e);
    }

    match timeout(grace, handle.wait()).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            tracing::warn!("⚠️ Waiting on service '{}' during shutdown failed: {}", name, e);
            None
        }
        Err(_) => {
            tracing::warn!(
                "⚠️ Service '{}' ignored SIGTERM for {:?}, killing it",
                name,
                grace
            );
            if let Err(e) = handle.kill().await {
                tracing::warn!("⚠️ Could not kill service '{}': {}", name, e);
                return None;
            }
            handle.wait().await.ok()
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<Option<ShutdownReason>>) -> ShutdownReason {
    loop {
        if let Some(reason) = *rx.borrow() {
            return reason;
        }
        if rx.changed().await.is_err() {
            return ShutdownReason::Requested;
        }
    }
}
