use crate::domain::model::RestartConfig;
use std::time::Duration;

/// 指數退避: base, 2*base, 4*base, ... 封頂在 max
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn from_config(config: &RestartConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_seconds),
            Duration::from_secs(config.max_backoff_seconds),
        )
    }

    /// 目前已經用掉幾次重啟
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 記一次重啟並回傳這次要等多久
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        // 指數上限 clamp 住, 避免 shift overflow
        let exponent = (self.attempt - 1).min(16);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.max)
    }

    /// 服務穩定跑了一段時間後歸零
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
