pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;
pub use config::toml_config::LauncherConfig;

pub use adapters::TokioProcessRunner;
pub use crate::core::status::StatusBoard;
pub use crate::core::supervisor::{ShutdownHandle, Supervisor, SupervisorOptions};
pub use domain::model::{
    ExitOutcome, ReadinessProbe, RestartConfig, RestartPolicy, ServiceKind, ServiceSpec,
    ShutdownReason, SupervisorEvent,
};
pub use utils::error::{LauncherError, Result};
