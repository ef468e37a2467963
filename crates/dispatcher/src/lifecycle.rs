//! 作业生命周期编排
//!
//! 对外的 `run`/`submit`/`schedule`/`stop`/`cancel`/`unschedule` 都是请求驱动的，
//! 在调用方的任务里顺序执行并等待远端确认。同一作业的并发调用由调用方串行化。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dataflow_config::{AppConfig, CancelFailurePolicy};
use dataflow_domain::{
    ClusterRepository, ClusterTarget, EngineClientFactory, InstanceState, JobDefinition,
    JobRepository, JobRuntimeState, JobSpecGenerator, LaunchConfiguration, Project,
    ProjectRepository, ResourceRepository, RunInstance, RunInstanceRepository, RunRequest,
    ScheduleKey, SchedulePayload, StagingAllocator, StagingArea,
};
use dataflow_errors::{InstanceFailure, OrchestratorError, OrchestratorResult};
use dataflow_infrastructure::{LifecycleLogger, LifecycleMetrics, SubmissionAdapter};
use tracing::{debug, info, instrument, warn};

use crate::launch_config::{control_plane_endpoint, write_job_spec, LaunchConfigBuilder};
use crate::registrar::ScheduleRegistrar;
use crate::stager::ArtifactStager;

/// 取消实例时传给引擎的原因
pub const CANCEL_REASON: &str = "cancel";

/// 编排核心依赖的元数据存储
#[derive(Clone)]
pub struct OrchestratorRepositories {
    pub jobs: Arc<dyn JobRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub clusters: Arc<dyn ClusterRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub run_instances: Arc<dyn RunInstanceRepository>,
}

impl OrchestratorRepositories {
    /// 同一个目录对象实现了全部存储接口时使用
    pub fn from_catalog<C>(catalog: Arc<C>) -> Self
    where
        C: JobRepository
            + ProjectRepository
            + ClusterRepository
            + ResourceRepository
            + RunInstanceRepository
            + 'static,
    {
        Self {
            jobs: catalog.clone(),
            projects: catalog.clone(),
            clusters: catalog.clone(),
            resources: catalog.clone(),
            run_instances: catalog,
        }
    }
}

/// 停止运行实例的方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSettings {
    checkpoint_dir: Option<String>,
    drain: bool,
    policy: CancelFailurePolicy,
}

impl CancelSettings {
    /// 检查点目录去掉首尾空白和一个结尾斜杠，空值视为未配置
    pub fn new(checkpoint_dir: Option<&str>, drain: bool, policy: CancelFailurePolicy) -> Self {
        let checkpoint_dir = checkpoint_dir
            .map(str::trim)
            .map(|dir| dir.strip_suffix('/').unwrap_or(dir))
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);
        Self {
            checkpoint_dir,
            drain,
            policy,
        }
    }

    /// 不带保存点，直接取消
    pub fn abrupt() -> Self {
        Self::new(None, true, CancelFailurePolicy::AbortOnFirst)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.checkpoint_dir(),
            config.checkpoint.drain,
            config.orchestrator.cancel_failure_policy,
        )
    }

    pub fn with_policy(mut self, policy: CancelFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn checkpoint_dir(&self) -> Option<&str> {
        self.checkpoint_dir.as_deref()
    }

    pub fn policy(&self) -> CancelFailurePolicy {
        self.policy
    }

    /// `<检查点目录>/<集群名>/<运行实例 id>`，未配置检查点目录时为 None
    pub fn savepoint_path(&self, cluster_name: &str, run_id: &str) -> Option<String> {
        self.checkpoint_dir
            .as_ref()
            .map(|dir| format!("{dir}/{cluster_name}/{run_id}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub entry_class: String,
    pub preflight_scheduled_jobs: bool,
    pub cleanup_on_failure: bool,
    pub cancel: CancelSettings,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            entry_class: config.engine.entry_class.clone(),
            preflight_scheduled_jobs: config.orchestrator.preflight_scheduled_jobs,
            cleanup_on_failure: config.staging.cleanup_on_failure,
            cancel: CancelSettings::from_config(config),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 注册了定时调度；开启预检时附带预检得到的启动配置
    Scheduled {
        key: ScheduleKey,
        preflight: Option<LaunchConfiguration>,
    },
    /// 立即提交，返回新建的运行实例
    Submitted(RunInstance),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// 已确认停止的运行实例 id，按处理顺序
    pub stopped: Vec<String>,
}

struct PreparedSubmission {
    launch: LaunchConfiguration,
    runtime_uri: String,
    spec_file: PathBuf,
}

pub struct JobLifecycleService {
    repos: OrchestratorRepositories,
    stager: ArtifactStager,
    allocator: Arc<dyn StagingAllocator>,
    spec_generator: Arc<dyn JobSpecGenerator>,
    engines: Arc<dyn EngineClientFactory>,
    registrar: ScheduleRegistrar,
    settings: LifecycleSettings,
    metrics: LifecycleMetrics,
}

impl JobLifecycleService {
    pub fn new(
        repos: OrchestratorRepositories,
        stager: ArtifactStager,
        allocator: Arc<dyn StagingAllocator>,
        spec_generator: Arc<dyn JobSpecGenerator>,
        engines: Arc<dyn EngineClientFactory>,
        registrar: ScheduleRegistrar,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            repos,
            stager,
            allocator,
            spec_generator,
            engines,
            registrar,
            settings,
            metrics: LifecycleMetrics::new(),
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// 绑定集群和资源后，按作业类型决定定时调度还是立即提交
    #[instrument(skip(self), fields(job.id = request.job_id, cluster.id = request.cluster_id))]
    pub async fn run(&self, request: &RunRequest) -> OrchestratorResult<RunOutcome> {
        self.load_job(request.job_id).await?;
        self.load_cluster(request.cluster_id).await?;

        self.repos
            .jobs
            .bind_cluster(request.job_id, request.cluster_id)
            .await?;
        self.repos
            .resources
            .bind_resources(request.job_id, &request.resource_ids)
            .await?;
        let job = self.load_job(request.job_id).await?;

        if job.is_scheduled_batch() {
            let preflight = if self.settings.preflight_scheduled_jobs {
                Some(self.preflight(&job).await?)
            } else {
                None
            };
            let key = self.schedule(&job).await?;
            Ok(RunOutcome::Scheduled { key, preflight })
        } else {
            let instance = self.submit(&job).await?;
            Ok(RunOutcome::Submitted(instance))
        }
    }

    /// 暂存、配置、提交，成功后记录运行实例并把作业置为 RUNNING
    ///
    /// 任何一步失败都不会修改作业状态。
    #[instrument(skip(self, job), fields(job.id = job.id, job.code = %job.code))]
    pub async fn submit(&self, job: &JobDefinition) -> OrchestratorResult<RunInstance> {
        let started = Instant::now();
        let cluster_id = job.cluster_id.ok_or_else(|| {
            OrchestratorError::validation(format!("作业 {} 未绑定集群", job.code))
        })?;
        let cluster = self.load_cluster(cluster_id).await?;

        let area = self.allocator.allocate(job.project_id).await?;
        let result = self.submit_in(&area, job, &cluster).await;
        match result {
            Ok(instance) => {
                self.metrics
                    .record_submission(started.elapsed().as_secs_f64());
                LifecycleLogger::log_job_submitted(
                    &job.code,
                    cluster.id,
                    &instance.run_id,
                    &instance.web_url,
                );
                Ok(instance)
            }
            Err(err) => {
                self.metrics.record_submission_failure();
                LifecycleLogger::log_submission_failed(&job.code, cluster.id, &err.to_string());
                if self.settings.cleanup_on_failure {
                    self.release(&area).await;
                }
                Err(err)
            }
        }
    }

    async fn submit_in(
        &self,
        area: &StagingArea,
        job: &JobDefinition,
        cluster: &ClusterTarget,
    ) -> OrchestratorResult<RunInstance> {
        let prepared = self.prepare(area, job, cluster).await?;
        let endpoint = control_plane_endpoint(cluster)?;
        let adapter = SubmissionAdapter::new(self.engines.connect(&endpoint)?, cluster.id);

        let run_id = adapter
            .submit_jar(
                &job.code,
                &prepared.launch,
                &prepared.runtime_uri,
                &self.settings.entry_class,
                &prepared.spec_file,
                &job.attributes,
            )
            .await?;

        let instance = RunInstance {
            web_url: endpoint.job_overview_url(&run_id),
            run_id,
            job_id: job.id,
            project_id: job.project_id,
            job_code: job.code.clone(),
            cluster_id: cluster.id,
            state: InstanceState::Initializing,
            started_at: Utc::now(),
        };
        self.repos.run_instances.insert(&instance).await?;

        let mut updated = job.clone();
        updated.runtime_state = JobRuntimeState::Running;
        self.repos.jobs.update(&updated).await?;
        Ok(instance)
    }

    /// 暂存制品、构建启动配置并写出作业描述
    async fn prepare(
        &self,
        area: &StagingArea,
        job: &JobDefinition,
        cluster: &ClusterTarget,
    ) -> OrchestratorResult<PreparedSubmission> {
        let resources = self.repos.resources.list_job_resources(job.id).await?;
        let artifacts = self.stager.stage(area, &resources).await?;
        let launch = LaunchConfigBuilder::build(job, cluster, &artifacts)?;
        let spec = self.spec_generator.generate(job)?;
        let spec_file = write_job_spec(area, &job.code, &spec).await?;
        debug!("作业描述已写入 {}", spec_file.display());

        Ok(PreparedSubmission {
            launch,
            runtime_uri: artifacts.runtime_uri().to_string(),
            spec_file,
        })
    }

    /// 注册调度前先走一遍暂存和配置，让集群配置或制品问题在 `run` 时暴露
    async fn preflight(&self, job: &JobDefinition) -> OrchestratorResult<LaunchConfiguration> {
        let cluster_id = job.cluster_id.ok_or_else(|| {
            OrchestratorError::validation(format!("作业 {} 未绑定集群", job.code))
        })?;
        let cluster = self.load_cluster(cluster_id).await?;

        let area = self.allocator.allocate(job.project_id).await?;
        let prepared = self.prepare(&area, job, &cluster).await;
        self.release(&area).await;
        Ok(prepared?.launch)
    }

    /// 以项目编码和作业编码为键注册 CRON 调度，已有条目被替换
    #[instrument(skip(self, job), fields(job.id = job.id, job.code = %job.code))]
    pub async fn schedule(&self, job: &JobDefinition) -> OrchestratorResult<ScheduleKey> {
        let cron = job
            .cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
            .ok_or_else(|| {
                OrchestratorError::validation(format!("作业 {} 没有配置调度表达式", job.code))
            })?;
        let project = self.load_project(job.project_id).await?;
        let key = ScheduleKey::for_job(&project.code, &job.code);

        let mut scheduled = job.clone();
        scheduled.runtime_state = JobRuntimeState::Scheduled;
        let payload = serde_json::to_value(SchedulePayload {
            job: scheduled.clone(),
            project,
        })?;

        self.registrar.upsert(&key, cron, payload).await?;
        self.repos.jobs.update(&scheduled).await?;

        self.metrics.record_schedule();
        LifecycleLogger::log_job_scheduled(&job.code, &key.to_string(), cron);
        Ok(key)
    }

    /// 删除作业的调度条目，不存在时什么也不做
    #[instrument(skip(self, job), fields(job.id = job.id, job.code = %job.code))]
    pub async fn unschedule(&self, job: &JobDefinition) -> OrchestratorResult<bool> {
        let project = self.load_project(job.project_id).await?;
        let key = ScheduleKey::for_job(&project.code, &job.code);

        let removed = self.registrar.remove(&key).await?;
        if removed {
            self.metrics.record_unschedule();
        }
        LifecycleLogger::log_job_unscheduled(&job.code, &key.to_string(), removed);
        Ok(removed)
    }

    /// 先撤销调度再停止所有运行实例，全部成功后作业置为 STOPPED
    #[instrument(skip(self), fields(job.id = job_id))]
    pub async fn stop(&self, job_id: i64) -> OrchestratorResult<CancelReport> {
        let job = self.load_job(job_id).await?;
        self.unschedule(&job).await?;
        let report = self.cancel(&job, &self.settings.cancel).await?;

        let mut stopped = self.load_job(job_id).await?;
        stopped.runtime_state = JobRuntimeState::Stopped;
        self.repos.jobs.update(&stopped).await?;

        LifecycleLogger::log_job_stopped(job.id, &job.code);
        Ok(report)
    }

    /// 逐个停止作业尚未结束的运行实例
    ///
    /// 配置了检查点目录时带保存点停止，否则直接取消。失败处理由
    /// `CancelFailurePolicy` 决定：遇错即停，或尝试全部后汇总报告。
    #[instrument(skip(self, job, settings), fields(job.code = %job.code))]
    pub async fn cancel(
        &self,
        job: &JobDefinition,
        settings: &CancelSettings,
    ) -> OrchestratorResult<CancelReport> {
        let instances = self.repos.run_instances.list_running(&job.code).await?;
        info!("作业 {} 有 {} 个运行实例需要停止", job.code, instances.len());

        let mut report = CancelReport::default();
        let mut failures = Vec::new();
        for instance in &instances {
            match self.cancel_instance(instance, settings).await {
                Ok(()) => {
                    self.metrics.record_instance_stopped();
                    report.stopped.push(instance.run_id.clone());
                }
                Err(err) => {
                    self.metrics.record_instance_stop_failure();
                    LifecycleLogger::log_instance_stop_failed(
                        &instance.run_id,
                        instance.cluster_id,
                        &err.to_string(),
                    );
                    match settings.policy() {
                        CancelFailurePolicy::AbortOnFirst => return Err(err),
                        CancelFailurePolicy::CollectAll => failures.push(InstanceFailure {
                            run_id: instance.run_id.clone(),
                            cluster_id: instance.cluster_id,
                            message: err.to_string(),
                        }),
                    }
                }
            }
        }

        if !failures.is_empty() {
            return Err(OrchestratorError::CancelIncomplete {
                job_code: job.code.clone(),
                failures,
            });
        }
        Ok(report)
    }

    async fn cancel_instance(
        &self,
        instance: &RunInstance,
        settings: &CancelSettings,
    ) -> OrchestratorResult<()> {
        let cluster = self.load_cluster(instance.cluster_id).await?;
        let endpoint = control_plane_endpoint(&cluster)?;
        let adapter = SubmissionAdapter::new(self.engines.connect(&endpoint)?, cluster.id);

        let savepoint = settings.savepoint_path(&cluster.name, &instance.run_id);
        let final_state = match &savepoint {
            Some(path) => {
                adapter
                    .stop_with_checkpoint(&instance.run_id, path, settings.drain)
                    .await?;
                InstanceState::Finished
            }
            None => {
                adapter.terminate(&instance.run_id, CANCEL_REASON).await?;
                InstanceState::Cancelled
            }
        };

        self.repos
            .run_instances
            .update_state(&instance.run_id, final_state)
            .await?;
        LifecycleLogger::log_instance_stopped(&instance.run_id, cluster.id, savepoint.as_deref());
        Ok(())
    }

    /// 向控制面查询作业所有未结束实例的状态并写回
    #[instrument(skip(self), fields(job.id = job_id))]
    pub async fn refresh_status(&self, job_id: i64) -> OrchestratorResult<Vec<RunInstance>> {
        let job = self.load_job(job_id).await?;
        let mut instances = self.repos.run_instances.list_running(&job.code).await?;

        for instance in &mut instances {
            let cluster = self.load_cluster(instance.cluster_id).await?;
            let endpoint = control_plane_endpoint(&cluster)?;
            let adapter = SubmissionAdapter::new(self.engines.connect(&endpoint)?, cluster.id);

            let state = adapter.query_status(&instance.run_id).await?;
            if state != instance.state {
                debug!(
                    "运行实例 {} 状态变化: {:?} -> {:?}",
                    instance.run_id, instance.state, state
                );
                self.repos
                    .run_instances
                    .update_state(&instance.run_id, state)
                    .await?;
                instance.state = state;
            }
        }
        Ok(instances)
    }

    async fn release(&self, area: &StagingArea) {
        if let Err(err) = area.release().await {
            warn!("清理暂存目录 {} 失败: {}", area.root().display(), err);
        }
    }

    async fn load_job(&self, job_id: i64) -> OrchestratorResult<JobDefinition> {
        self.repos
            .jobs
            .get_by_id(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })
    }

    async fn load_cluster(&self, cluster_id: i64) -> OrchestratorResult<ClusterTarget> {
        self.repos
            .clusters
            .get_by_id(cluster_id)
            .await?
            .ok_or(OrchestratorError::ClusterNotFound { id: cluster_id })
    }

    async fn load_project(&self, project_id: i64) -> OrchestratorResult<Project> {
        self.repos
            .projects
            .get_by_id(project_id)
            .await?
            .ok_or(OrchestratorError::ProjectNotFound { id: project_id })
    }
}
