//! 作业元数据存储接口
//!
//! 元数据的持久化不属于编排核心，这里只定义核心需要的最小读写面：
//! - `JobRepository` - 作业定义（含属性、步骤、连线）的加载与更新
//! - `ProjectRepository` / `ClusterRepository` - 只读查询
//! - `ResourceRepository` - 作业与资源文件的绑定
//! - `RunInstanceRepository` - 运行实例日志及其状态

use async_trait::async_trait;
use dataflow_errors::OrchestratorResult;

use crate::entities::{
    ClusterTarget, InstanceState, JobDefinition, Project, ResourceArtifact, RunInstance,
};

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 加载完整的作业定义，包括属性、步骤和连线
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<JobDefinition>>;
    async fn update(&self, job: &JobDefinition) -> OrchestratorResult<()>;
    async fn bind_cluster(&self, job_id: i64, cluster_id: i64) -> OrchestratorResult<()>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Project>>;
}

#[async_trait]
pub trait ClusterRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ClusterTarget>>;
}

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// 以给定列表替换作业当前绑定的资源
    async fn bind_resources(&self, job_id: i64, resource_ids: &[i64]) -> OrchestratorResult<()>;
    async fn list_job_resources(&self, job_id: i64) -> OrchestratorResult<Vec<ResourceArtifact>>;
}

#[async_trait]
pub trait RunInstanceRepository: Send + Sync {
    async fn insert(&self, instance: &RunInstance) -> OrchestratorResult<()>;
    /// 按作业编码列出尚未结束的运行实例
    async fn list_running(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>>;
    async fn list_by_job_code(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>>;
    /// 记录控制面确认后的实例状态，实例不存在时返回 false
    async fn update_state(&self, run_id: &str, state: InstanceState) -> OrchestratorResult<bool>;
}
