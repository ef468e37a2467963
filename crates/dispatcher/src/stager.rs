//! 制品暂存
//!
//! 每次提交独占一个暂存目录：`<临时目录>/<随机名>/<项目 id>`。运行时 jar 直接引用
//! 安装目录中的文件，资源文件按文件名和大小判断是否已经在暂存目录中，
//! 否则从远端存储下载覆盖。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dataflow_domain::{ArtifactStorage, ResourceArtifact, StagingAllocator, StagingArea};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use dataflow_infrastructure::{LifecycleLogger, LifecycleMetrics};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// 暂存目录权限：属主和属组可读写执行，其他用户无权限
pub const STAGING_DIR_MODE: u32 = 0o770;

/// 在系统临时目录（或配置的根目录）下分配暂存目录
#[derive(Debug, Clone, Default)]
pub struct TempDirAllocator {
    root: Option<PathBuf>,
}

impl TempDirAllocator {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl StagingAllocator for TempDirAllocator {
    async fn allocate(&self, project_id: i64) -> OrchestratorResult<StagingArea> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> OrchestratorResult<StagingArea> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("dataflow-");
            let temp_dir = match &root {
                Some(parent) => {
                    std::fs::create_dir_all(parent)?;
                    builder.tempdir_in(parent)?
                }
                None => builder.tempdir()?,
            };
            // 目录的生命周期由 StagingArea::release 管理
            let base = temp_dir.keep();
            let dir = base.join(project_id.to_string());
            std::fs::create_dir_all(&dir)?;
            restrict_permissions(&base)?;
            restrict_permissions(&dir)?;
            Ok(StagingArea::new(base, dir))
        })
        .await
        .map_err(|e| OrchestratorError::Internal(format!("分配暂存目录失败: {e}")))?
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(STAGING_DIR_MODE))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// 一次提交需要的全部制品，按 URI 排序去重，总是包含运行时 jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    runtime_uri: String,
    uris: BTreeSet<String>,
}

impl ArtifactSet {
    pub fn new(runtime_uri: String) -> Self {
        let mut uris = BTreeSet::new();
        uris.insert(runtime_uri.clone());
        Self { runtime_uri, uris }
    }

    pub fn insert(&mut self, uri: String) -> bool {
        self.uris.insert(uri)
    }

    pub fn runtime_uri(&self) -> &str {
        &self.runtime_uri
    }

    pub fn uris(&self) -> Vec<String> {
        self.uris.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

pub fn file_uri(path: &Path) -> OrchestratorResult<String> {
    url::Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| OrchestratorError::Internal(format!("无法转换为文件 URI: {}", path.display())))
}

pub struct ArtifactStager {
    storage: Arc<dyn ArtifactStorage>,
    engine_home: PathBuf,
    runtime_artifact: String,
    metrics: LifecycleMetrics,
}

impl ArtifactStager {
    pub fn new(
        storage: Arc<dyn ArtifactStorage>,
        engine_home: impl Into<PathBuf>,
        runtime_artifact: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            engine_home: engine_home.into(),
            runtime_artifact: runtime_artifact.into(),
            metrics: LifecycleMetrics::new(),
        }
    }

    pub fn runtime_artifact_path(&self) -> PathBuf {
        self.engine_home.join(&self.runtime_artifact)
    }

    /// 解析运行时 jar 并把绑定的资源放进暂存目录
    #[instrument(skip_all, fields(staging.dir = %area.path().display(), resources = resources.len()))]
    pub async fn stage(
        &self,
        area: &StagingArea,
        resources: &[ResourceArtifact],
    ) -> OrchestratorResult<ArtifactSet> {
        let runtime = self.runtime_artifact_path();
        if !tokio::fs::try_exists(&runtime).await? {
            return Err(OrchestratorError::MissingArtifact {
                path: runtime.display().to_string(),
            });
        }

        let mut artifacts = ArtifactSet::new(file_uri(&runtime)?);
        for resource in resources {
            let local = self.resolve_resource(area, resource).await?;
            artifacts.insert(file_uri(&local)?);
        }

        debug!("暂存完成，共 {} 个制品", artifacts.len());
        Ok(artifacts)
    }

    async fn resolve_resource(
        &self,
        area: &StagingArea,
        resource: &ResourceArtifact,
    ) -> OrchestratorResult<PathBuf> {
        let local = area.file(&resource.file_name)?;
        let object_path = resource.object_path();
        let remote_size = self.storage.size(&object_path).await?;

        // 只比较大小：同名同大小但内容不同的文件会被当作已缓存
        if let Ok(metadata) = tokio::fs::metadata(&local).await {
            if metadata.is_file() && metadata.len() == remote_size {
                LifecycleLogger::log_artifact_cached(&resource.file_name, remote_size);
                self.metrics.record_artifact(true);
                return Ok(local);
            }
        }

        let started = Instant::now();
        self.download(&object_path, &local).await?;
        LifecycleLogger::log_artifact_downloaded(
            &resource.file_name,
            remote_size,
            started.elapsed().as_millis() as u64,
        );
        self.metrics.record_artifact(false);
        Ok(local)
    }

    async fn download(&self, object_path: &str, local: &Path) -> OrchestratorResult<()> {
        let mut stream = self.storage.get(object_path).await?;
        let mut file = tokio::fs::File::create(local).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
