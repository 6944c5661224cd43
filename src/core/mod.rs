pub mod backoff;
pub mod readiness;
pub mod status;
pub mod supervisor;

pub use crate::domain::model::{ExitOutcome, ServiceSpec, SupervisorEvent};
pub use crate::domain::ports::{ProcessHandle, ProcessRunner};
pub use crate::utils::error::Result;
