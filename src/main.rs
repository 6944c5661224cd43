use clap::Parser;
use small_launcher::config::toml_config;
use small_launcher::utils::error::ErrorSeverity;
use small_launcher::utils::monitor::ProcessTableMonitor;
use small_launcher::utils::{logger, validation::Validate};
use small_launcher::{
    CliConfig, LauncherConfig, ShutdownReason, Supervisor, SupervisorOptions, TokioProcessRunner,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting small-launcher");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證 CLI 參數
    if let Err(e) = cli.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 載入 manifest, CLI 的 timeout/grace 蓋過 manifest 的值
    let mut config = match LauncherConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => return fail(e),
    };
    if let Some(timeout) = cli.startup_timeout {
        config.launcher.startup_timeout_seconds = Some(timeout);
    }
    if let Some(grace) = cli.grace_period {
        config.launcher.grace_period_seconds = Some(grace);
    }

    if let Err(e) = config.validate() {
        return fail(e);
    }
    let services = match config.resolve(&cli.host, cli.port) {
        Ok(services) => services,
        Err(e) => return fail(e),
    };

    if cli.check {
        // 驗證模式: 印出展開後的 launch plan 就結束
        println!("{}", toml_config::render_launch_plan(&services)?);
        return Ok(());
    }

    let options = SupervisorOptions {
        grace_period: config.grace_period(),
    };
    let monitor_enabled = cli.monitor || config.monitoring_enabled();

    let supervisor = Supervisor::new(TokioProcessRunner::new(), services, options);
    let status = supervisor.status();
    let shutdown = supervisor.shutdown_handle();

    // container stop signal → 優雅關閉所有子行程
    tokio::spawn(async move {
        wait_for_stop_signal().await;
        shutdown.shutdown(ShutdownReason::Signal);
    });

    if monitor_enabled {
        tracing::info!("🔍 Process-table monitoring enabled");
        let monitor = ProcessTableMonitor::new(true);
        let status = status.clone();
        let interval = config.monitoring_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // 第一個 tick 是立即的, 跳過
            loop {
                ticker.tick().await;
                monitor.log_stats(&status.running_pids());
            }
        });
    }

    match supervisor.run().await {
        Ok(code) => {
            tracing::info!("✅ Launcher finished, exit code {}", code);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => return fail(e),
    }

    Ok(())
}

fn fail(e: small_launcher::LauncherError) -> Result<(), Box<dyn std::error::Error>> {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Launcher failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試錯誤
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!("⚠️ Could not install SIGTERM handler ({}), Ctrl-C only", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
