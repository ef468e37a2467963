use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dataflow_config::StorageConfig;
use dataflow_domain::{ArtifactStorage, ByteStream};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use super::{build_object_store, normalize_object_path};

/// 基于 `object_store` 的制品存储，本地目录和 S3 共用这一个实现
#[derive(Clone)]
pub struct ObjectStoreArtifactStorage {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreArtifactStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// 以本地目录（或挂载的共享盘）充当远端存储
    pub fn local(root: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let config = StorageConfig::Local {
            root: root.as_ref().to_path_buf(),
        };
        Ok(Self::new(build_object_store(&config)?))
    }

    fn key(&self, path: &str) -> OrchestratorResult<ObjectPath> {
        let normalized = normalize_object_path(path)?;
        ObjectPath::parse(&normalized).map_err(|e| OrchestratorError::storage(path, e.to_string()))
    }
}

#[async_trait]
impl ArtifactStorage for ObjectStoreArtifactStorage {
    async fn exists(&self, path: &str) -> OrchestratorResult<bool> {
        let key = self.key(path)?;
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(OrchestratorError::storage(path, e.to_string())),
        }
    }

    async fn size(&self, path: &str) -> OrchestratorResult<u64> {
        let key = self.key(path)?;
        let meta = self
            .store
            .head(&key)
            .await
            .map_err(|e| OrchestratorError::storage(path, e.to_string()))?;
        Ok(meta.size as u64)
    }

    async fn get(&self, path: &str) -> OrchestratorResult<ByteStream> {
        let key = self.key(path)?;
        let result = self
            .store
            .get(&key)
            .await
            .map_err(|e| OrchestratorError::storage(path, e.to_string()))?;
        debug!("打开对象 {}，大小 {}", key, result.meta.size);

        let object_path = path.to_string();
        Ok(result
            .into_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(move |e| OrchestratorError::storage(object_path.clone(), e.to_string()))
            .boxed())
    }
}
