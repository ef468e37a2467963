use std::fmt;

use thiserror::Error;

/// 取消某个运行实例失败时的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFailure {
    pub run_id: String,
    pub cluster_id: i64,
    pub message: String,
}

impl fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "实例 {} (集群 {}): {}",
            self.run_id, self.cluster_id, self.message
        )
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("项目未找到: {id}")]
    ProjectNotFound { id: i64 },
    #[error("集群未找到: {id}")]
    ClusterNotFound { id: i64 },
    #[error("资源文件未找到: {id}")]
    ResourceNotFound { id: i64 },
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("运行时制品不存在: {path}")]
    MissingArtifact { path: String },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("存储错误: {path} - {message}")]
    Storage { path: String, message: String },
    #[error("作业提交失败: {job_code} - {message}")]
    Submission { job_code: String, message: String },
    #[error("控制面调用失败: 实例 {run_id} (集群 {cluster_id}) - {message}")]
    ControlPlane {
        run_id: String,
        cluster_id: i64,
        message: String,
    },
    #[error("作业 {job_code} 有 {count} 个运行实例取消失败: {summary}",
        count = .failures.len(),
        summary = join_failures(.failures))]
    CancelIncomplete {
        job_code: String,
        failures: Vec<InstanceFailure>,
    },
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

fn join_failures(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrchestratorError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn storage<P: Into<String>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::Storage {
            path: path.into(),
            message: msg.into(),
        }
    }
    pub fn submission<C: Into<String>, S: Into<String>>(job_code: C, msg: S) -> Self {
        Self::Submission {
            job_code: job_code.into(),
            message: msg.into(),
        }
    }
    pub fn control_plane<R: Into<String>, S: Into<String>>(
        run_id: R,
        cluster_id: i64,
        msg: S,
    ) -> Self {
        Self::ControlPlane {
            run_id: run_id.into(),
            cluster_id,
            message: msg.into(),
        }
    }

    /// 请求本身有误（对象不存在或参数非法），调用方修正后才能重试
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::JobNotFound { .. }
                | OrchestratorError::ProjectNotFound { .. }
                | OrchestratorError::ClusterNotFound { .. }
                | OrchestratorError::ResourceNotFound { .. }
                | OrchestratorError::Validation(_)
                | OrchestratorError::InvalidCron { .. }
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            OrchestratorError::JobNotFound { .. } => "请求的作业不存在",
            OrchestratorError::ProjectNotFound { .. } => "作业所属项目不存在",
            OrchestratorError::ClusterNotFound { .. } => "目标集群不存在",
            OrchestratorError::ResourceNotFound { .. } => "绑定的资源文件不存在",
            OrchestratorError::MissingArtifact { .. } => "引擎运行时制品缺失，请检查安装目录",
            OrchestratorError::Configuration(_) => "集群配置不完整或格式有误",
            OrchestratorError::InvalidCron { .. } => "调度表达式无效",
            OrchestratorError::Submission { .. } => "作业提交被引擎拒绝",
            OrchestratorError::ControlPlane { .. }
            | OrchestratorError::CancelIncomplete { .. } => "停止作业失败，请检查集群状态",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
