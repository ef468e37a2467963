//! Flink 会话集群客户端
//!
//! 提交交给本机的 `FlinkCliLauncher`，作业连同暂存的 jar 由客户端发往集群。
//! 其余控制面调用走 REST：取消是 `PATCH /jobs/{id}?mode=cancel`，带保存点的停止是
//! `POST /jobs/{id}/stop` 并轮询保存点操作直到完成。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataflow_domain::{
    ControlPlaneEndpoint, EngineClient, EngineClientFactory, InstanceState, JarSubmission,
    LaunchConfiguration,
};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::flink_cli::FlinkCliLauncher;

const SAVEPOINT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest<'a> {
    target_directory: &'a str,
    drain: bool,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    #[serde(rename = "request-id")]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct JobDetails {
    state: String,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationStatus {
    status: QueueStatus,
    #[serde(default)]
    operation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    id: String,
}

/// 把引擎上报的作业状态映射到运行实例状态
pub fn map_job_status(state: &str) -> Option<InstanceState> {
    match state {
        "INITIALIZING" | "CREATED" | "RESTARTING" => Some(InstanceState::Initializing),
        "RUNNING" | "FAILING" | "CANCELLING" | "RECONCILING" | "SUSPENDED" => {
            Some(InstanceState::Running)
        }
        "CANCELED" => Some(InstanceState::Cancelled),
        "FAILED" => Some(InstanceState::Failed),
        "FINISHED" => Some(InstanceState::Finished),
        _ => None,
    }
}

pub struct FlinkRestClient {
    client: Client,
    endpoint: ControlPlaneEndpoint,
    launcher: Arc<FlinkCliLauncher>,
}

impl FlinkRestClient {
    pub fn new(
        client: Client,
        endpoint: ControlPlaneEndpoint,
        launcher: Arc<FlinkCliLauncher>,
    ) -> Self {
        Self {
            client,
            endpoint,
            launcher,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.base_url(), path)
    }

    fn control_plane_error(&self, run_id: &str, message: impl Into<String>) -> OrchestratorError {
        OrchestratorError::control_plane(run_id, self.endpoint.cluster_id, message)
    }

    async fn wait_for_savepoint(&self, run_id: &str, request_id: &str) -> OrchestratorResult<()> {
        let url = self.url(&format!("/jobs/{run_id}/savepoints/{request_id}"));
        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.control_plane_error(run_id, e.to_string()))?;
            let status: AsyncOperationStatus = read_json(response)
                .await
                .map_err(|message| self.control_plane_error(run_id, message))?;

            if status.status.id == "COMPLETED" {
                if let Some(cause) = status
                    .operation
                    .as_ref()
                    .and_then(|op| op.get("failure-cause"))
                {
                    return Err(self.control_plane_error(
                        run_id,
                        format!("保存点失败: {cause}"),
                    ));
                }
                return Ok(());
            }

            debug!("保存点 {} 尚未完成，继续等待", request_id);
            tokio::time::sleep(SAVEPOINT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl EngineClient for FlinkRestClient {
    #[instrument(skip_all, fields(run.name = %launch.run_name, cluster.id = self.endpoint.cluster_id))]
    async fn submit_jar(
        &self,
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<String> {
        self.launcher.submit(launch, submission).await
    }

    async fn query_status(&self, run_id: &str) -> OrchestratorResult<InstanceState> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{run_id}")))
            .send()
            .await
            .map_err(|e| self.control_plane_error(run_id, e.to_string()))?;
        let details: JobDetails = read_json(response)
            .await
            .map_err(|message| self.control_plane_error(run_id, message))?;

        map_job_status(&details.state).ok_or_else(|| {
            self.control_plane_error(run_id, format!("未知的作业状态: {}", details.state))
        })
    }

    #[instrument(skip(self), fields(cluster.id = self.endpoint.cluster_id))]
    async fn terminate(&self, run_id: &str, reason: &str) -> OrchestratorResult<()> {
        let response = self
            .client
            .patch(self.url(&format!("/jobs/{run_id}?mode=cancel")))
            .send()
            .await
            .map_err(|e| self.control_plane_error(run_id, e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.control_plane_error(run_id, format!("{status}: {body}")));
        }
        info!("运行实例 {} 已取消，原因: {}", run_id, reason);
        Ok(())
    }

    #[instrument(skip(self), fields(cluster.id = self.endpoint.cluster_id))]
    async fn stop_with_checkpoint(
        &self,
        run_id: &str,
        checkpoint_path: &str,
        drain: bool,
    ) -> OrchestratorResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{run_id}/stop")))
            .json(&StopRequest {
                target_directory: checkpoint_path,
                drain,
            })
            .send()
            .await
            .map_err(|e| self.control_plane_error(run_id, e.to_string()))?;
        let trigger: TriggerResponse = read_json(response)
            .await
            .map_err(|message| self.control_plane_error(run_id, message))?;

        self.wait_for_savepoint(run_id, &trigger.request_id).await?;
        info!("运行实例 {} 已停止，保存点: {}", run_id, checkpoint_path);
        Ok(())
    }
}

/// 按集群创建客户端，共享同一个连接池和本机提交客户端
pub struct FlinkRestClientFactory {
    client: Client,
    launcher: Arc<FlinkCliLauncher>,
}

impl FlinkRestClientFactory {
    pub fn new(request_timeout: Duration, launcher: FlinkCliLauncher) -> OrchestratorResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OrchestratorError::config_error(format!("创建引擎客户端失败: {e}")))?;
        Ok(Self {
            client,
            launcher: Arc::new(launcher),
        })
    }
}

impl EngineClientFactory for FlinkRestClientFactory {
    fn connect(&self, endpoint: &ControlPlaneEndpoint) -> OrchestratorResult<Arc<dyn EngineClient>> {
        Ok(Arc::new(FlinkRestClient::new(
            self.client.clone(),
            endpoint.clone(),
            Arc::clone(&self.launcher),
        )))
    }
}

/// 非 2xx 响应把状态码和响应体拼进错误信息
async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("{status}: {body}"));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| format!("响应解析失败: {e}"))
}
