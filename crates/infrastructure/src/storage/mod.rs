//! 资源文件的远端存储
//!
//! 后端在启动时按 `StorageConfig` 选定一次，之后只通过 `ArtifactStorage` 访问。

pub mod factory;
pub mod object_store_ops;

use std::sync::Arc;

use dataflow_config::StorageConfig;
use dataflow_domain::ArtifactStorage;
use dataflow_errors::OrchestratorResult;

pub use factory::build_object_store;
pub use object_store_ops::ObjectStoreArtifactStorage;

pub fn create_storage(config: &StorageConfig) -> OrchestratorResult<Arc<dyn ArtifactStorage>> {
    Ok(Arc::new(ObjectStoreArtifactStorage::new(build_object_store(
        config,
    )?)))
}

/// 对象路径统一为不带前导斜杠的相对路径，拒绝 `..`
pub(crate) fn normalize_object_path(path: &str) -> OrchestratorResult<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|segment| segment == "..") {
        return Err(dataflow_errors::OrchestratorError::storage(
            path,
            "非法的对象路径",
        ));
    }
    Ok(trimmed.to_string())
}
