use crate::domain::model::{
    ReadinessProbe, RestartConfig, RestartPolicy, ServiceKind, ServiceSpec,
};
use crate::utils::error::{LauncherError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_GRACE_SECONDS: u64 = 10;
const DEFAULT_STARTUP_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_PROBE_HOST: &str = "127.0.0.1";
const DEFAULT_PROBE_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub launcher: LauncherSection,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherSection {
    pub name: String,
    pub grace_period_seconds: Option<u64>,
    pub startup_timeout_seconds: Option<u64>,
    pub monitoring: Option<MonitoringSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSection {
    pub enabled: bool,
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    #[serde(default)]
    pub kind: ServiceKind,
    #[serde(default)]
    pub critical: bool,
    pub restart: Option<RestartSection>,
    pub readiness: Option<ReadinessSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartSection {
    pub policy: Option<RestartPolicy>,
    pub max_restarts: Option<u32>,
    pub backoff_seconds: Option<u64>,
    pub max_backoff_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadinessSection {
    Tcp {
        host: Option<String>,
        port: Option<u16>,
        timeout_seconds: Option<u64>,
        interval_ms: Option<u64>,
    },
    Http {
        url: String,
        timeout_seconds: Option<u64>,
        interval_ms: Option<u64>,
    },
    /// 明確關掉 foreground 的預設 TCP 檢查
    None,
}

impl LauncherConfig {
    /// 從 TOML 檔案載入 manifest
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LauncherError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析 manifest
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| LauncherError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${BOT_TOKEN})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        // 使用正規表達式匹配 ${VAR_NAME} 格式
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證 manifest 的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("launcher.name", &self.launcher.name)?;

        if let Some(grace) = self.launcher.grace_period_seconds {
            validation::validate_positive_number("launcher.grace_period_seconds", grace, 1)?;
        }
        if let Some(timeout) = self.launcher.startup_timeout_seconds {
            validation::validate_positive_number("launcher.startup_timeout_seconds", timeout, 1)?;
        }
        if let Some(monitoring) = &self.launcher.monitoring {
            if let Some(interval) = monitoring.interval_seconds {
                validation::validate_positive_number(
                    "launcher.monitoring.interval_seconds",
                    interval,
                    1,
                )?;
            }
        }

        if self.services.is_empty() {
            return Err(LauncherError::MissingConfigError {
                field: "service".to_string(),
            });
        }

        let names: Vec<String> = self.services.iter().map(|s| s.name.clone()).collect();
        validation::validate_unique_names("service.name", &names)?;

        for svc in &self.services {
            validation::validate_non_empty_string("service.name", &svc.name)?;
            validation::validate_path("service.command", &svc.command)?;
            if let Some(dir) = &svc.working_dir {
                validation::validate_path("service.working_dir", dir)?;
            }
        }

        let foreground_count = self.services.iter().filter(|s| s.kind == ServiceKind::Foreground).count();
        if foreground_count != 1 {
            return Err(LauncherError::ConfigValidationError {
                field: "service.kind".to_string(),
                message: format!(
                    "Exactly one foreground service is required, found {}",
                    foreground_count
                ),
            });
        }

        Ok(())
    }

    /// 把 manifest 展開成 supervisor 可以直接跑的 launch plan.
    /// {host}/{port} 佔位符在這裡換成 CLI 給的值.
    pub fn resolve(&self, host: &str, port: u16) -> Result<Vec<ServiceSpec>> {
        let mut specs = Vec::with_capacity(self.services.len());

        for svc in &self.services {
            let restart = self.resolve_restart(svc)?;
            let readiness = self.resolve_readiness(svc, host, port)?;

            let args = svc
                .args
                .iter()
                .map(|a| expand_placeholders(a, host, port))
                .collect();
            let env = svc
                .env
                .iter()
                .map(|(k, v)| (k.clone(), expand_placeholders(v, host, port)))
                .collect();

            specs.push(ServiceSpec {
                name: svc.name.clone(),
                command: svc.command.clone(),
                args,
                env,
                working_dir: svc.working_dir.clone(),
                kind: svc.kind,
                critical: svc.critical,
                restart,
                readiness,
            });
        }

        Ok(specs)
    }

    fn resolve_restart(&self, svc: &ServiceSection) -> Result<RestartConfig> {
        let defaults = RestartConfig::default();
        let section = svc.restart.clone().unwrap_or_default();

        if svc.kind == ServiceKind::Foreground {
            // foreground 掛了就是 container 結束, 不存在重啟
            if let Some(policy) = section.policy {
                if policy != RestartPolicy::Never {
                    return Err(LauncherError::InvalidConfigValueError {
                        field: "service.restart.policy".to_string(),
                        value: format!("{:?}", policy),
                        reason: "The foreground service cannot be restarted; its exit ends the container"
                            .to_string(),
                    });
                }
            }
            return Ok(RestartConfig::never());
        }

        let backoff = section.backoff_seconds.unwrap_or(defaults.backoff_seconds);
        let max_backoff = section
            .max_backoff_seconds
            .unwrap_or_else(|| backoff.max(defaults.max_backoff_seconds));
        if max_backoff < backoff {
            return Err(LauncherError::InvalidConfigValueError {
                field: "service.restart.max_backoff_seconds".to_string(),
                value: max_backoff.to_string(),
                reason: format!("Must be at least backoff_seconds ({})", backoff),
            });
        }

        Ok(RestartConfig {
            policy: section.policy.unwrap_or(defaults.policy),
            max_restarts: section.max_restarts.unwrap_or(defaults.max_restarts),
            backoff_seconds: backoff,
            max_backoff_seconds: max_backoff,
        })
    }

    fn resolve_readiness(
        &self,
        svc: &ServiceSection,
        host: &str,
        port: u16,
    ) -> Result<Option<ReadinessProbe>> {
        let default_timeout = self.startup_timeout().as_secs();

        match &svc.readiness {
            Some(ReadinessSection::None) => Ok(None),
            Some(ReadinessSection::Tcp {
                host: probe_host,
                port: probe_port,
                timeout_seconds,
                interval_ms,
            }) => {
                let interval = interval_ms.unwrap_or(DEFAULT_PROBE_INTERVAL_MS);
                validation::validate_range("service.readiness.interval_ms", interval, 10, 60_000)?;
                let probe_port = probe_port.unwrap_or(port);
                validation::validate_port("service.readiness.port", probe_port)?;

                Ok(Some(ReadinessProbe::Tcp {
                    host: probe_host
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PROBE_HOST.to_string()),
                    port: probe_port,
                    timeout_seconds: timeout_seconds.unwrap_or(default_timeout),
                    interval_ms: interval,
                }))
            }
            Some(ReadinessSection::Http {
                url,
                timeout_seconds,
                interval_ms,
            }) => {
                let url = expand_placeholders(url, host, port);
                validation::validate_url("service.readiness.url", &url)?;
                let interval = interval_ms.unwrap_or(DEFAULT_PROBE_INTERVAL_MS);
                validation::validate_range("service.readiness.interval_ms", interval, 10, 60_000)?;

                Ok(Some(ReadinessProbe::Http {
                    url,
                    timeout_seconds: timeout_seconds.unwrap_or(default_timeout),
                    interval_ms: interval,
                }))
            }
            None => {
                if svc.kind == ServiceKind::Foreground {
                    // foreground 預設做 TCP 檢查: container 起來後對外 port 一定要通
                    Ok(Some(ReadinessProbe::Tcp {
                        host: DEFAULT_PROBE_HOST.to_string(),
                        port,
                        timeout_seconds: default_timeout,
                        interval_ms: DEFAULT_PROBE_INTERVAL_MS,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(
            self.launcher
                .grace_period_seconds
                .unwrap_or(DEFAULT_GRACE_SECONDS),
        )
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(
            self.launcher
                .startup_timeout_seconds
                .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECONDS),
        )
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.launcher
            .monitoring
            .as_ref()
            .map(|m| m.enabled)
            .unwrap_or(false)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(
            self.launcher
                .monitoring
                .as_ref()
                .and_then(|m| m.interval_seconds)
                .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECONDS),
        )
    }
}

impl Validate for LauncherConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

fn expand_placeholders(value: &str, host: &str, port: u16) -> String {
    value
        .replace("{host}", host)
        .replace("{port}", &port.to_string())
}

/// 把展開後的 launch plan 輸出成 JSON (給 --check 用)
pub fn render_launch_plan(services: &[ServiceSpec]) -> Result<String> {
    Ok(serde_json::to_string_pretty(services)?)
}
