use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Readiness probe request failed: {0}")]
    ProbeError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to spawn service '{service}': {source}")]
    SpawnError {
        service: String,
        source: std::io::Error,
    },

    #[error("Failed to signal service '{service}': {message}")]
    SignalError { service: String, message: String },

    #[error("Service '{service}' did not become ready within {seconds}s")]
    ReadinessTimeoutError { service: String, seconds: u64 },

    #[error("Critical service '{service}' failed permanently")]
    ServiceFailedError { service: String },
}

pub type Result<T> = std::result::Result<T, LauncherError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Process,
    Network,
    System,
}

impl LauncherError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LauncherError::ConfigValidationError { .. }
            | LauncherError::InvalidConfigValueError { .. }
            | LauncherError::MissingConfigError { .. } => ErrorCategory::Config,
            LauncherError::SpawnError { .. }
            | LauncherError::SignalError { .. }
            | LauncherError::ServiceFailedError { .. } => ErrorCategory::Process,
            LauncherError::ProbeError(_) | LauncherError::ReadinessTimeoutError { .. } => {
                ErrorCategory::Network
            }
            LauncherError::IoError(_) | LauncherError::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LauncherError::ProbeError(_) => ErrorSeverity::Medium,
            LauncherError::ConfigValidationError { .. }
            | LauncherError::InvalidConfigValueError { .. }
            | LauncherError::MissingConfigError { .. }
            | LauncherError::SignalError { .. }
            | LauncherError::ReadinessTimeoutError { .. }
            | LauncherError::ServiceFailedError { .. }
            | LauncherError::SerializationError(_) => ErrorSeverity::High,
            LauncherError::IoError(_) | LauncherError::SpawnError { .. } => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            LauncherError::ConfigValidationError { field, .. }
            | LauncherError::InvalidConfigValueError { field, .. }
            | LauncherError::MissingConfigError { field } => {
                format!("Check the '{}' section of your launcher.toml", field)
            }
            LauncherError::SpawnError { service, .. } => format!(
                "Verify that the command for service '{}' exists and is executable inside the container",
                service
            ),
            LauncherError::SignalError { service, .. } => format!(
                "Service '{}' may have already exited; check its logs",
                service
            ),
            LauncherError::ReadinessTimeoutError { service, .. } => format!(
                "Service '{}' never opened its port; increase startup_timeout_seconds or check the service logs",
                service
            ),
            LauncherError::ServiceFailedError { service } => format!(
                "Service '{}' kept crashing; inspect its logs and raise max_restarts if the failure is transient",
                service
            ),
            LauncherError::ProbeError(_) => {
                "Check that the readiness probe URL is reachable from inside the container".to_string()
            }
            LauncherError::IoError(_) => {
                "Check file permissions and that the manifest path exists".to_string()
            }
            LauncherError::SerializationError(_) => {
                "This is likely a bug in the launch plan rendering; re-run with --verbose".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LauncherError::ConfigValidationError { .. }
            | LauncherError::InvalidConfigValueError { .. }
            | LauncherError::MissingConfigError { .. } => {
                format!("Manifest problem: {}", self)
            }
            LauncherError::SpawnError { service, .. } => {
                format!("Could not start service '{}'", service)
            }
            LauncherError::ReadinessTimeoutError { service, seconds } => {
                format!("Service '{}' was not reachable after {}s", service, seconds)
            }
            LauncherError::ServiceFailedError { service } => {
                format!("Service '{}' failed and exhausted its restart budget", service)
            }
            _ => self.to_string(),
        }
    }
}
