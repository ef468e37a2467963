//! 计算引擎提交与控制
//!
//! `SubmissionAdapter` 给编排核心提供统一的调用面，具体引擎的协议在
//! `EngineClient` 实现里（目前是 Flink：本机客户端提交，REST 控制）。

pub mod flink_cli;
pub mod flink_rest;

use std::path::Path;
use std::sync::Arc;

use dataflow_domain::{EngineClient, InstanceState, JarSubmission, JobAttribute, LaunchConfiguration};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use tracing::{debug, error};

pub use flink_cli::FlinkCliLauncher;
pub use flink_rest::{FlinkRestClient, FlinkRestClientFactory};

/// 绑定到单个集群的提交适配器
#[derive(Clone)]
pub struct SubmissionAdapter {
    client: Arc<dyn EngineClient>,
    cluster_id: i64,
}

impl SubmissionAdapter {
    pub fn new(client: Arc<dyn EngineClient>, cluster_id: i64) -> Self {
        Self { client, cluster_id }
    }

    /// 提交运行时 jar，返回引擎分配的运行实例 id
    ///
    /// 引擎客户端在独立任务中执行，客户端内部的 panic 只会让这一次提交失败，
    /// 不会影响服务其他提交的进程。
    pub async fn submit_jar(
        &self,
        job_code: &str,
        launch: &LaunchConfiguration,
        jar_uri: &str,
        entry_class: &str,
        spec_file: &Path,
        attributes: &[JobAttribute],
    ) -> OrchestratorResult<String> {
        let submission = JarSubmission::new(jar_uri, entry_class, spec_file, attributes);
        debug!("提交参数: {:?}", submission.program_args);

        let client = Arc::clone(&self.client);
        let launch = launch.clone();
        let handle =
            tokio::spawn(async move { client.submit_jar(&launch, &submission).await });

        match handle.await {
            Ok(Ok(run_id)) => Ok(run_id),
            Ok(Err(err @ OrchestratorError::Submission { .. })) => Err(err),
            Ok(Err(err)) => Err(OrchestratorError::submission(job_code, err.to_string())),
            Err(join_err) => {
                error!("作业 {} 提交任务异常终止: {}", job_code, join_err);
                Err(OrchestratorError::submission(
                    job_code,
                    format!("引擎客户端异常终止: {join_err}"),
                ))
            }
        }
    }

    pub async fn terminate(&self, run_id: &str, reason: &str) -> OrchestratorResult<()> {
        self.client
            .terminate(run_id, reason)
            .await
            .map_err(|err| self.as_control_plane(run_id, err))
    }

    pub async fn stop_with_checkpoint(
        &self,
        run_id: &str,
        checkpoint_path: &str,
        drain: bool,
    ) -> OrchestratorResult<()> {
        self.client
            .stop_with_checkpoint(run_id, checkpoint_path, drain)
            .await
            .map_err(|err| self.as_control_plane(run_id, err))
    }

    pub async fn query_status(&self, run_id: &str) -> OrchestratorResult<InstanceState> {
        self.client
            .query_status(run_id)
            .await
            .map_err(|err| self.as_control_plane(run_id, err))
    }

    fn as_control_plane(&self, run_id: &str, err: OrchestratorError) -> OrchestratorError {
        match err {
            OrchestratorError::ControlPlane { .. } => err,
            other => OrchestratorError::control_plane(run_id, self.cluster_id, other.to_string()),
        }
    }
}
