pub mod entities;
pub mod launch;
pub mod ports;
pub mod repositories;

pub use dataflow_errors::{OrchestratorError, OrchestratorResult};
pub use entities::*;
pub use launch::*;
pub use ports::*;
pub use repositories::*;
