use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 服務類型: foreground 的生命週期就是 launcher 的生命週期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Background,
    Foreground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Never,
    #[default]
    OnFailure,
    Always,
}

impl RestartPolicy {
    pub fn should_restart(&self, outcome: &ExitOutcome) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => !outcome.success(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartConfig {
    pub policy: RestartPolicy,
    pub max_restarts: u32,
    pub backoff_seconds: u64,
    pub max_backoff_seconds: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::OnFailure,
            max_restarts: 5,
            backoff_seconds: 1,
            max_backoff_seconds: 60,
        }
    }
}

impl RestartConfig {
    pub fn never() -> Self {
        Self {
            policy: RestartPolicy::Never,
            ..Self::default()
        }
    }
}

/// Readiness probe, 已展開成絕對值 (host/port/timeout 都補完預設)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadinessProbe {
    Tcp {
        host: String,
        port: u16,
        timeout_seconds: u64,
        interval_ms: u64,
    },
    Http {
        url: String,
        timeout_seconds: u64,
        interval_ms: u64,
    },
}

impl ReadinessProbe {
    pub fn timeout_seconds(&self) -> u64 {
        match self {
            ReadinessProbe::Tcp {
                timeout_seconds, ..
            } => *timeout_seconds,
            ReadinessProbe::Http {
                timeout_seconds, ..
            } => *timeout_seconds,
        }
    }
}

/// 一個要被監管的子行程的完整描述
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    pub kind: ServiceKind,
    pub critical: bool,
    pub restart: RestartConfig,
    pub readiness: Option<ReadinessProbe>,
}

impl ServiceSpec {
    pub fn is_foreground(&self) -> bool {
        self.kind == ServiceKind::Foreground
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Background => write!(f, "background"),
            ServiceKind::Foreground => write!(f, "foreground"),
        }
    }
}

/// 子行程結束的方式: 正常 exit code 或被 signal 終止
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// 對應到 container 的 exit code 慣例 (signal 終止 = 128 + signo)
    pub fn container_code(&self) -> i32 {
        if let Some(code) = self.code {
            code
        } else if let Some(signal) = self.signal {
            128 + signal
        } else {
            1
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Starting,
    Running,
    Ready,
    BackingOff,
    Exited,
    Stopped,
    Failed,
}

/// StatusBoard 裡每個服務的即時狀態
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub pid: Option<u32>,
    pub state: ServiceState,
    pub restarts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit: Option<ExitOutcome>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            pid: None,
            state: ServiceState::Starting,
            restarts: 0,
            started_at: None,
            last_exit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownReason {
    ForegroundExited,
    Signal,
    ReadinessFailed,
    CriticalServiceFailed,
    Requested,
}

/// 生命週期事件, 透過 channel 丟給觀察者 (測試也靠這個驗證順序)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SupervisorEvent {
    ServiceStarted {
        service: String,
        pid: u32,
        at: DateTime<Utc>,
    },
    ServiceReady {
        service: String,
        at: DateTime<Utc>,
    },
    ServiceExited {
        service: String,
        outcome: ExitOutcome,
        at: DateTime<Utc>,
    },
    ServiceRestarting {
        service: String,
        attempt: u32,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    ServiceGaveUp {
        service: String,
        at: DateTime<Utc>,
    },
    ShutdownStarted {
        reason: ShutdownReason,
        at: DateTime<Utc>,
    },
}
