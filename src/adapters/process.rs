use crate::domain::model::{ExitOutcome, ServiceSpec};
use crate::domain::ports::{ProcessHandle, ProcessRunner};
use crate::utils::error::{LauncherError, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};

/// 用 tokio::process 起真正的子行程.
/// 每個服務放進自己的 process group, 這樣 SIGTERM/SIGKILL 可以蓋到整棵子樹.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, spec: &ServiceSpec) -> Result<Box<dyn ProcessHandle>> {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args);
        command.envs(&spec.env);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        // launcher 死掉的話子行程不能變孤兒
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| LauncherError::SpawnError {
            service: spec.name.clone(),
            source: e,
        })?;

        tracing::debug!(
            "Spawned '{}' as pid {:?}: {} {:?}",
            spec.name,
            child.id(),
            spec.command,
            spec.args
        );

        Ok(Box::new(TokioChild {
            name: spec.name.clone(),
            child,
        }))
    }
}

struct TokioChild {
    name: String,
    child: Child,
}

#[async_trait]
impl ProcessHandle for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self.child.wait().await?;
        Ok(ExitOutcome::from_status(status))
    }

    fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            let Some(pid) = self.child.id() else {
                return Ok(());
            };
            // 負 pid = 對整個 process group 送 signal
            match send_signal(-(pid as i32), libc::SIGTERM) {
                Ok(()) => Ok(()),
                // 行程剛好自己結束了, 不算錯
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
                Err(e) => Err(LauncherError::SignalError {
                    service: self.name.clone(),
                    message: e.to_string(),
                }),
            }
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill().map_err(LauncherError::IoError)
        }
    }

    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let _ = send_signal(-(pid as i32), libc::SIGKILL);
        }
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: i32) -> std::io::Result<()> {
    // SAFETY: kill(2) 本身沒有記憶體安全問題, pid 來自我們自己 spawn 的 child
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
