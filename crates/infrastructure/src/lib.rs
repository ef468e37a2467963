pub mod catalog;
pub mod engine;
pub mod observability;
pub mod schedule_store;
pub mod storage;

pub use catalog::FileCatalog;
pub use engine::{FlinkCliLauncher, FlinkRestClient, FlinkRestClientFactory, SubmissionAdapter};
pub use observability::*;
pub use schedule_store::{InMemoryScheduleStore, SqliteScheduleStore};
pub use storage::{build_object_store, create_storage, ObjectStoreArtifactStorage};
