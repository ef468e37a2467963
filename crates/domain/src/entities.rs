use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobKind {
    #[serde(rename = "BATCH")]
    Batch,
    #[serde(rename = "STREAM")]
    Stream,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobRuntimeState {
    #[serde(rename = "DEFINED")]
    Defined,
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "STOPPED")]
    Stopped,
}

/// 作业属性的用途
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobAttrKind {
    /// 作业变量，以 `--variable key=value` 形式传给运行时
    #[serde(rename = "JOB_ATTR")]
    JobAttr,
    /// 作业属性，写入生成的作业描述的 `env` 段
    #[serde(rename = "JOB_PROP")]
    JobProp,
    /// 引擎参数，写入启动配置
    #[serde(rename = "ENGINE_PROP")]
    EngineProp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobAttribute {
    pub kind: JobAttrKind,
    pub key: String,
    pub value: String,
}

impl JobAttribute {
    pub fn new(kind: JobAttrKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StepType {
    #[serde(rename = "source")]
    Source,
    #[serde(rename = "transform")]
    Transform,
    #[serde(rename = "sink")]
    Sink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStep {
    pub code: String,
    pub title: String,
    pub step_type: StepType,
    pub plugin_name: String,
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobLink {
    pub from_step: String,
    pub to_step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDefinition {
    pub id: i64,
    pub code: String,
    pub project_id: i64,
    pub kind: JobKind,
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub attributes: Vec<JobAttribute>,
    #[serde(default)]
    pub steps: Vec<JobStep>,
    #[serde(default)]
    pub links: Vec<JobLink>,
    pub cluster_id: Option<i64>,
    pub runtime_state: JobRuntimeState,
}

impl JobDefinition {
    /// 仅当作业为批作业且配置了非空的 CRON 表达式时走定时调度
    pub fn is_scheduled_batch(&self) -> bool {
        self.kind == JobKind::Batch
            && self
                .cron_expression
                .as_deref()
                .is_some_and(|expr| !expr.trim().is_empty())
    }

    pub fn attributes_of(&self, kind: JobAttrKind) -> impl Iterator<Item = &JobAttribute> {
        self.attributes.iter().filter(move |attr| attr.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterTarget {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceArtifact {
    pub id: i64,
    pub file_name: String,
    pub remote_path: String,
    pub size: u64,
}

impl ResourceArtifact {
    /// 远端存储中的完整对象路径
    pub fn object_path(&self) -> String {
        let dir = self.remote_path.trim_end_matches('/');
        if dir.is_empty() {
            self.file_name.clone()
        } else {
            format!("{dir}/{}", self.file_name)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InstanceState {
    #[serde(rename = "INITIALIZING")]
    Initializing,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "FINISHED")]
    Finished,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Cancelled | InstanceState::Failed | InstanceState::Finished
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInstance {
    pub run_id: String,
    pub job_id: i64,
    pub project_id: i64,
    pub job_code: String,
    pub cluster_id: i64,
    pub web_url: String,
    pub state: InstanceState,
    pub started_at: DateTime<Utc>,
}

impl RunInstance {
    pub fn is_running(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// 内部调度分组，和用户可见的调度分组隔离
pub const INTERNAL_GROUP: &str = "INTERNAL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub group: String,
    pub name: String,
}

impl ScheduleKey {
    /// 由项目编码和作业编码确定性地生成调度键
    pub fn for_job(project_code: &str, job_code: &str) -> Self {
        Self {
            group: INTERNAL_GROUP.to_string(),
            name: format!("BATCH_JOB_{project_code}_{job_code}"),
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub key: ScheduleKey,
    pub cron_expression: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 定时触发时交给回调的上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulePayload {
    pub job: JobDefinition,
    pub project: Project,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: i64,
    pub cluster_id: i64,
    #[serde(default)]
    pub resource_ids: Vec<i64>,
}
