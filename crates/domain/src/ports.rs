//! 编排核心依赖的外部能力
//!
//! 每个外部协作方都是一个能力接口，具体实现（本地磁盘/HTTP 对象存储、
//! 各计算引擎的 REST 适配器、调度存储）在启动时按配置选定。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use futures::stream::BoxStream;

use crate::entities::{InstanceState, JobDefinition, ScheduleEntry, ScheduleKey};
use crate::launch::{ControlPlaneEndpoint, JarSubmission, LaunchConfiguration};

/// 远端对象的字节流，任何读取失败都以 `StorageError` 出现在流中
pub type ByteStream = BoxStream<'static, OrchestratorResult<Vec<u8>>>;

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn exists(&self, path: &str) -> OrchestratorResult<bool>;
    async fn size(&self, path: &str) -> OrchestratorResult<u64>;
    async fn get(&self, path: &str) -> OrchestratorResult<ByteStream>;
}

/// 单个集群控制面上的提交与控制调用，均阻塞到远端确认为止，不做重试
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn submit_jar(
        &self,
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<String>;
    async fn query_status(&self, run_id: &str) -> OrchestratorResult<InstanceState>;
    async fn terminate(&self, run_id: &str, reason: &str) -> OrchestratorResult<()>;
    async fn stop_with_checkpoint(
        &self,
        run_id: &str,
        checkpoint_path: &str,
        drain: bool,
    ) -> OrchestratorResult<()>;
}

pub trait EngineClientFactory: Send + Sync {
    fn connect(
        &self,
        endpoint: &ControlPlaneEndpoint,
    ) -> OrchestratorResult<std::sync::Arc<dyn EngineClient>>;
}

/// 外部持久化调度器的键值面
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn exists(&self, key: &ScheduleKey) -> OrchestratorResult<bool>;
    async fn get(&self, key: &ScheduleKey) -> OrchestratorResult<Option<ScheduleEntry>>;
    async fn insert(&self, entry: &ScheduleEntry) -> OrchestratorResult<()>;
    /// 返回是否真的删除了条目
    async fn delete(&self, key: &ScheduleKey) -> OrchestratorResult<bool>;
    async fn list(&self, group: &str) -> OrchestratorResult<Vec<ScheduleEntry>>;
}

/// 由作业步骤和连线生成作业处理描述
pub trait JobSpecGenerator: Send + Sync {
    fn generate(&self, job: &JobDefinition) -> OrchestratorResult<serde_json::Value>;
}

/// 一次提交独占的暂存目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
    dir: PathBuf,
}

impl StagingArea {
    /// `root` 是释放时整体删除的目录，`dir` 是实际存放文件的目录
    pub fn new(root: PathBuf, dir: PathBuf) -> Self {
        Self { root, dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 暂存目录下的文件，`name` 必须是单个普通路径段
    ///
    /// 绝对路径、`..` 或带分隔符的名字都会让 `join` 跳出暂存目录，直接拒绝。
    pub fn file(&self, name: &str) -> OrchestratorResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(name)),
            _ => Err(OrchestratorError::validation(format!(
                "非法的暂存文件名: {name:?}"
            ))),
        }
    }

    pub async fn release(&self) -> OrchestratorResult<()> {
        tokio::fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

#[async_trait]
pub trait StagingAllocator: Send + Sync {
    async fn allocate(&self, project_id: i64) -> OrchestratorResult<StagingArea>;
}
