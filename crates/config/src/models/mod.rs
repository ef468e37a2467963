pub mod app_config;
pub mod engine;
pub mod logging;
pub mod orchestrator;

pub use app_config::*;
pub use engine::*;
pub use logging::*;
pub use orchestrator::*;
