//! # Dataflow Testing Utils
//!
//! Shared testing utilities for the dataflow orchestrator workspace.
//!
//! - **Mock Repositories**: in-memory implementations of the metadata repository traits
//! - **Mock Collaborators**: counting artifact storage, recording engine client,
//!   fixed-directory staging allocator
//! - **Test Data Builders**: jobs, clusters, resources and run instances
//! - **Helpers**: polling and logging setup for async tests
//!
//! ```toml
//! [dev-dependencies]
//! dataflow-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
