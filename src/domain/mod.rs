// Domain layer: service model and ports (interfaces). No tokio/process details here.

pub mod model;
pub mod ports;
