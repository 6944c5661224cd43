use crate::domain::model::{ExitOutcome, ServiceSpec};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 一個活著的子行程. Supervisor 只透過這個介面跟 OS 行程互動,
/// 測試可以用 mock 實作驗證重啟/關閉邏輯.
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// 等待行程結束. 結束後重複呼叫要回傳同一個結果.
    async fn wait(&mut self) -> Result<ExitOutcome>;

    /// 溫和地要求行程結束 (unix 上是對整個 process group 送 SIGTERM)
    fn terminate(&mut self) -> Result<()>;

    /// 強制終止, 回傳前要把行程收屍完畢
    async fn kill(&mut self) -> Result<()>;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &ServiceSpec) -> Result<Box<dyn ProcessHandle>>;
}
