// Adapters layer: concrete implementations for external systems.
// 目前只有一個: 把 ProcessRunner 接到真正的 OS 行程 (tokio::process).

pub mod process;

pub use process::TokioProcessRunner;
