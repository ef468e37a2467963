//! 按配置构建 `ObjectStore`
//!
//! 本地目录和 S3 兼容存储都统一成 `Arc<dyn ObjectStore>`，上层只看到同一套接口。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dataflow_config::StorageConfig;
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::prefix::PrefixStore;
use object_store::{ClientOptions, ObjectStore};

pub fn build_object_store(config: &StorageConfig) -> OrchestratorResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Local { root } => build_local(root),
        StorageConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
            allow_http,
            request_timeout_seconds,
        } => {
            // 先读取 AWS_* 环境变量，配置文件里显式给出的值优先
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_region(region)
                .with_allow_http(*allow_http)
                .with_client_options(
                    ClientOptions::new()
                        .with_timeout(Duration::from_secs(*request_timeout_seconds)),
                );
            if let Some(endpoint) = endpoint {
                // MinIO 之类的自建存储只支持 path-style
                builder = builder
                    .with_endpoint(endpoint)
                    .with_virtual_hosted_style_request(false);
            }
            if let Some(key) = access_key_id {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }

            let store = builder
                .build()
                .map_err(|e| OrchestratorError::config_error(format!("S3 存储: {e}")))?;
            Ok(wrap_with_prefix(store, prefix.as_deref()))
        }
    }
}

/// 本地目录不存在时先创建，`LocalFileSystem` 要求绝对路径
fn build_local(root: &Path) -> OrchestratorResult<Arc<dyn ObjectStore>> {
    if !root.exists() {
        std::fs::create_dir_all(root).map_err(|e| {
            OrchestratorError::config_error(format!(
                "创建存储目录失败 {}: {e}",
                root.display()
            ))
        })?;
    }
    let absolute = root.canonicalize().map_err(|e| {
        OrchestratorError::config_error(format!("解析存储目录失败 {}: {e}", root.display()))
    })?;

    LocalFileSystem::new_with_prefix(absolute)
        .map(|fs| Arc::new(fs) as Arc<dyn ObjectStore>)
        .map_err(|e| OrchestratorError::config_error(format!("本地存储: {e}")))
}

fn wrap_with_prefix<T: ObjectStore>(store: T, prefix: Option<&str>) -> Arc<dyn ObjectStore> {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => Arc::new(PrefixStore::new(store, prefix)),
        None => Arc::new(store),
    }
}
