#[cfg(feature = "cli")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ChildStats {
    pub name: String,
    pub pid: u32,
    pub alive: bool,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub elapsed_time: Duration,
}

/// 用 process table 驗證被監管的子行程還活著, 順便記錄 CPU/記憶體
#[cfg(feature = "cli")]
pub struct ProcessTableMonitor {
    system: Arc<Mutex<System>>,
    start_time: Instant,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl ProcessTableMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new_with_specifics(RefreshKind::everything());
        system.refresh_all();

        Self {
            system: Arc::new(Mutex::new(system)),
            start_time: Instant::now(),
            enabled,
        }
    }

    pub fn snapshot(&self, children: &[(String, u32)]) -> Option<Vec<ChildStats>> {
        if !self.enabled {
            return None;
        }

        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let elapsed = self.start_time.elapsed();
        let stats = children
            .iter()
            .map(|(name, pid)| match system.process(Pid::from_u32(*pid)) {
                Some(process) => ChildStats {
                    name: name.clone(),
                    pid: *pid,
                    alive: true,
                    cpu_usage: process.cpu_usage(),
                    memory_mb: process.memory() / 1024 / 1024,
                    elapsed_time: elapsed,
                },
                None => ChildStats {
                    name: name.clone(),
                    pid: *pid,
                    alive: false,
                    cpu_usage: 0.0,
                    memory_mb: 0,
                    elapsed_time: elapsed,
                },
            })
            .collect();

        Some(stats)
    }

    /// 回傳已經從 process table 消失的服務名
    pub fn missing(&self, children: &[(String, u32)]) -> Vec<String> {
        self.snapshot(children)
            .map(|stats| {
                stats
                    .into_iter()
                    .filter(|s| !s.alive)
                    .map(|s| s.name)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn log_stats(&self, children: &[(String, u32)]) {
        let Some(stats) = self.snapshot(children) else {
            return;
        };

        for stat in stats {
            if stat.alive {
                tracing::info!(
                    "📊 {} (pid {}) - CPU: {:.1}%, Memory: {}MB, Elapsed: {:?}",
                    stat.name,
                    stat.pid,
                    stat.cpu_usage,
                    stat.memory_mb,
                    stat.elapsed_time
                );
            } else {
                tracing::warn!(
                    "⚠️ {} (pid {}) is no longer in the process table",
                    stat.name,
                    stat.pid
                );
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// 為非CLI環境提供空實現
#[cfg(not(feature = "cli"))]
pub struct ProcessTableMonitor;

#[cfg(not(feature = "cli"))]
impl ProcessTableMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn missing(&self, _children: &[(String, u32)]) -> Vec<String> {
        Vec::new()
    }

    pub fn log_stats(&self, _children: &[(String, u32)]) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
