//! Observability module
//!
//! - Structured lifecycle logging
//! - Lifecycle metrics via the `metrics` facade
//! - Subscriber setup for the binary

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::LifecycleMetrics;
pub use structured_logger::LifecycleLogger;
pub use telemetry_setup::init_logging;
