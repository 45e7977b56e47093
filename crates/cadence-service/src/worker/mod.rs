//! Background work: discovery, batch execution, cleanup, metrics and the scheduler that
//! ties them together.

pub mod cleanup;
pub mod cron;
pub mod discovery;
pub mod engine;
pub mod metrics;
pub mod pipeline;
pub mod service;

pub use service::{BackgroundWorkerService, HealthReport, HealthStatus, ServiceStatus};
