use crate::domain::model::{ExitOutcome, ServiceState, ServiceStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 所有服務的即時狀態, supervisor 寫, monitor/測試讀
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, ServiceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        let Ok(mut board) = self.inner.write() else {
            return;
        };
        board.insert(name.to_string(), ServiceStatus::default());
    }

    pub fn mark_started(&self, name: &str, pid: u32) {
        self.update(name, |status| {
            status.pid = Some(pid);
            status.state = ServiceState::Running;
            status.started_at = Some(Utc::now());
        });
    }

    pub fn mark_ready(&self, name: &str) {
        self.update(name, |status| {
            status.state = ServiceState::Ready;
        });
    }

    pub fn mark_exited(&self, name: &str, outcome: ExitOutcome) {
        self.update(name, |status| {
            status.pid = None;
            status.state = ServiceState::Exited;
            status.last_exit = Some(outcome);
        });
    }

    pub fn mark_backing_off(&self, name: &str, restarts: u32) {
        self.update(name, |status| {
            status.state = ServiceState::BackingOff;
            status.restarts = restarts;
        });
    }

    pub fn mark_stopped(&self, name: &str) {
        self.update(name, |status| {
            status.pid = None;
            status.state = ServiceState::Stopped;
        });
    }

    pub fn mark_failed(&self, name: &str) {
        self.update(name, |status| {
            status.pid = None;
            status.state = ServiceState::Failed;
        });
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        let Ok(board) = self.inner.read() else {
            return None;
        };
        board.get(name).cloned()
    }

    /// 還在跑的服務與其 pid (給 process-table monitor 用)
    pub fn running_pids(&self) -> Vec<(String, u32)> {
        let Ok(board) = self.inner.read() else {
            return Vec::new();
        };
        board
            .iter()
            .filter(|(_, status)| {
                matches!(status.state, ServiceState::Running | ServiceState::Ready)
            })
            .filter_map(|(name, status)| status.pid.map(|pid| (name.clone(), pid)))
            .collect()
    }

    pub fn snapshot(&self) -> HashMap<String, ServiceStatus> {
        self.inner.read().map(|board| board.clone()).unwrap_or_default()
    }

    fn update<F: FnOnce(&mut ServiceStatus)>(&self, name: &str, apply: F) {
        let Ok(mut board) = self.inner.write() else {
            return;
        };
        if let Some(status) = board.get_mut(name) {
            apply(status);
        }
    }
}
