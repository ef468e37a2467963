use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dataflow_config::AppConfig;
use dataflow_dispatcher::{
    ArtifactStager, CancelReport, JobLifecycleService, LifecycleSettings,
    OrchestratorRepositories, RunOutcome, ScheduleRegistrar, ScheduleTrigger,
    StepListSpecGenerator, TempDirAllocator,
};
use dataflow_domain::{
    ArtifactStorage, EngineClientFactory, JobRepository, RunInstance, RunRequest, ScheduleStore,
};
use dataflow_errors::OrchestratorError;
use dataflow_infrastructure::{
    create_storage, FileCatalog, FlinkCliLauncher, FlinkRestClientFactory, SqliteScheduleStore,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 主应用程序：按配置装配编排服务，对外提供各个命令的入口
pub struct Application {
    config: AppConfig,
    catalog: Arc<FileCatalog>,
    store: Arc<dyn ScheduleStore>,
    service: Arc<JobLifecycleService>,
}

impl Application {
    /// 创建新的应用实例，连接目录文件、制品存储、调度存储和引擎客户端
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，目录文件: {}", config.catalog.path.display());

        let catalog = Arc::new(
            FileCatalog::load(&config.catalog.path)
                .await
                .with_context(|| format!("加载目录文件失败: {}", config.catalog.path.display()))?,
        );
        let storage = create_storage(&config.storage).context("创建制品存储失败")?;
        let engines = Arc::new(
            FlinkRestClientFactory::new(
                Duration::from_secs(config.engine.request_timeout_seconds),
                FlinkCliLauncher::new(
                    config.engine.launcher.clone(),
                    Duration::from_secs(config.engine.submit_timeout_seconds),
                ),
            )
            .context("创建引擎客户端失败")?,
        );
        let store = Arc::new(
            SqliteScheduleStore::connect(&config.scheduler.database_url)
                .await
                .with_context(|| {
                    format!("连接调度存储失败: {}", config.scheduler.database_url)
                })?,
        );

        Ok(Self::from_parts(config, catalog, storage, engines, store))
    }

    /// 用已经构建好的协作方装配应用
    pub fn from_parts(
        config: AppConfig,
        catalog: Arc<FileCatalog>,
        storage: Arc<dyn ArtifactStorage>,
        engines: Arc<dyn EngineClientFactory>,
        store: Arc<dyn ScheduleStore>,
    ) -> Self {
        let stager = ArtifactStager::new(
            storage,
            config.engine.home.clone(),
            config.engine.runtime_artifact.clone(),
        );
        let service = JobLifecycleService::new(
            OrchestratorRepositories::from_catalog(catalog.clone()),
            stager,
            Arc::new(TempDirAllocator::new(config.staging.root.clone())),
            Arc::new(StepListSpecGenerator),
            engines,
            ScheduleRegistrar::new(store.clone()),
            LifecycleSettings::from_config(&config),
        );

        Self {
            config,
            catalog,
            store,
            service: Arc::new(service),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<JobLifecycleService> {
        &self.service
    }

    pub async fn run_job(&self, request: &RunRequest) -> Result<RunOutcome> {
        self.service
            .run(request)
            .await
            .with_context(|| format!("运行作业 {} 失败", request.job_id))
    }

    /// 停止作业，整体受 `orchestrator.stop_timeout_seconds` 限制
    pub async fn stop_job(&self, job_id: i64) -> Result<CancelReport> {
        let limit = Duration::from_secs(self.config.orchestrator.stop_timeout_seconds);
        match tokio::time::timeout(limit, self.service.stop(job_id)).await {
            Ok(result) => result.with_context(|| format!("停止作业 {job_id} 失败")),
            Err(_) => {
                warn!("停止作业 {} 超时 ({:?})", job_id, limit);
                Err(anyhow::anyhow!("停止作业 {job_id} 超时 ({limit:?})"))
            }
        }
    }

    pub async fn unschedule_job(&self, job_id: i64) -> Result<bool> {
        let job = JobRepository::get_by_id(self.catalog.as_ref(), job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })?;
        self.service
            .unschedule(&job)
            .await
            .with_context(|| format!("撤销作业 {job_id} 的调度失败"))
    }

    pub async fn job_status(&self, job_id: i64) -> Result<Vec<RunInstance>> {
        self.service
            .refresh_status(job_id)
            .await
            .with_context(|| format!("查询作业 {job_id} 的运行状态失败"))
    }

    /// 常驻运行调度触发循环，直到收到关闭信号
    pub async fn serve(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let poll_interval = Duration::from_secs(self.config.scheduler.poll_interval_seconds);
        let trigger = ScheduleTrigger::new(self.store.clone(), self.service.clone(), poll_interval);
        trigger.run(shutdown_rx).await;
        info!("调度服务已停止");
        Ok(())
    }
}
