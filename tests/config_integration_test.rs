use anyhow::Result;
use small_launcher::config::toml_config;
use small_launcher::utils::validation::Validate;
use small_launcher::{LauncherConfig, LauncherError, ReadinessProbe, RestartPolicy, ServiceKind};
use std::io::Write;
use tempfile::NamedTempFile;

const MANIFEST: &str = r#"
[launcher]
name = "payment-stack"
grace_period_seconds = 5
startup_timeout_seconds = 15

[launcher.monitoring]
enabled = true
interval_seconds = 10

[[service]]
name = "bot"
command = "${LAUNCHER_TEST_PYTHON}"
args = ["bot.py"]
kind = "background"
critical = true

[service.restart]
policy = "on-failure"
max_restarts = 5

[[service]]
name = "monitor"
command = "python3"
args = ["monitor.py"]
kind = "background"

[[service]]
name = "admin"
command = "uvicorn"
args = ["admin:app", "--host", "{host}", "--port", "{port}"]
kind = "foreground"

[service.env]
ADMIN_BASE_URL = "http://{host}:{port}"
"#;

#[test]
fn test_manifest_file_to_launch_plan() -> Result<()> {
    std::env::set_var("LAUNCHER_TEST_PYTHON", "python3");

    let mut file = NamedTempFile::new()?;
    file.write_all(MANIFEST.as_bytes())?;

    let config = LauncherConfig::from_file(file.path())?;
    config.validate()?;

    let services = config.resolve("0.0.0.0", 8080)?;
    assert_eq!(services.len(), 3);

    let bot = services.iter().find(|s| s.name == "bot").unwrap();
    assert_eq!(bot.command, "python3");
    assert_eq!(bot.kind, ServiceKind::Background);
    assert!(bot.critical);
    assert_eq!(bot.restart.policy, RestartPolicy::OnFailure);

    let admin = services.iter().find(|s| s.name == "admin").unwrap();
    assert_eq!(
        admin.args,
        vec!["admin:app", "--host", "0.0.0.0", "--port", "8080"]
    );
    assert_eq!(
        admin.env.get("ADMIN_BASE_URL").map(String::as_str),
        Some("http://0.0.0.0:8080")
    );

    // The foreground gets the default TCP probe against the launcher port
    match &admin.readiness {
        Some(ReadinessProbe::Tcp {
            port,
            timeout_seconds,
            ..
        }) => {
            assert_eq!(*port, 8080);
            assert_eq!(*timeout_seconds, 15);
        }
        other => panic!("expected default tcp probe, got {:?}", other),
    }

    std::env::remove_var("LAUNCHER_TEST_PYTHON");
    Ok(())
}

#[test]
fn test_launch_plan_renders_as_json() -> Result<()> {
    // No env indirection here; substitution is covered above
    let manifest = MANIFEST.replace("${LAUNCHER_TEST_PYTHON}", "python3");

    let config = LauncherConfig::from_toml_str(&manifest)?;
    let services = config.resolve("0.0.0.0", 9000)?;
    let plan = toml_config::render_launch_plan(&services)?;

    assert!(plan.contains("\"admin\""));
    assert!(plan.contains("\"9000\""));

    Ok(())
}

#[test]
fn test_missing_manifest_file_is_an_io_error() {
    let result = LauncherConfig::from_file("/definitely/not/there/launcher.toml");
    assert!(matches!(result, Err(LauncherError::IoError(_))));
}

#[test]
fn test_broken_toml_reports_the_parse_failure() {
    let result = LauncherConfig::from_toml_str("[launcher\nname = oops");
    match result {
        Err(LauncherError::ConfigValidationError { field, .. }) => {
            assert_eq!(field, "toml_parsing");
        }
        other => panic!("expected ConfigValidationError, got {:?}", other),
    }
}
