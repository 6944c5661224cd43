use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "small-launcher")]
#[command(about = "A small process supervisor for multi-service containers")]
pub struct CliConfig {
    #[arg(long, default_value = "launcher.toml")]
    pub config: String,

    /// 注入到 foreground 服務 {host} 佔位符的綁定位址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// 注入到 foreground 服務 {port} 佔位符的埠號
    #[arg(long, default_value = "8080")]
    pub port: u16,

    #[arg(long, help = "Seconds to wait after SIGTERM before SIGKILL")]
    pub grace_period: Option<u64>,

    #[arg(long, help = "Seconds to wait for the foreground readiness probe")]
    pub startup_timeout: Option<u64>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(long, help = "Periodically log child process stats")]
    pub monitor: bool,

    #[arg(long, help = "Validate the manifest, print the resolved launch plan, and exit")]
    pub check: bool,
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("config", &self.config)?;
        validation::validate_non_empty_string("host", &self.host)?;
        validation::validate_port("port", self.port)?;

        if let Some(grace) = self.grace_period {
            validation::validate_positive_number("grace_period", grace, 1)?;
        }
        if let Some(timeout) = self.startup_timeout {
            validation::validate_positive_number("startup_timeout", timeout, 1)?;
        }

        Ok(())
    }
}
