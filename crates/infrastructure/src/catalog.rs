//! JSON 文件形式的作业元数据目录
//!
//! 元数据的完整持久化不属于编排核心。命令行二进制用一个 JSON 文件承载
//! 项目、集群、资源、作业和运行实例。
//!
//! 常驻的 `serve` 进程和一次性的命令行调用共用同一个文件：读取总是从文件重新加载，
//! 写入在 `<文件>.lock` 的排他锁内完成 "读取最新内容、修改、整体回写"，
//! 不会用本进程的旧副本覆盖其他进程的修改。

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dataflow_domain::{
    ClusterRepository, ClusterTarget, InstanceState, JobDefinition, JobRepository, Project,
    ProjectRepository, ResourceArtifact, ResourceRepository, RunInstance, RunInstanceRepository,
};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogData {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub clusters: Vec<ClusterTarget>,
    #[serde(default)]
    pub resources: Vec<ResourceArtifact>,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
    /// 作业 id -> 绑定的资源 id
    #[serde(default)]
    pub job_resources: BTreeMap<i64, Vec<i64>>,
    #[serde(default)]
    pub run_instances: Vec<RunInstance>,
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: Option<PathBuf>,
    /// 落盘目录里只是最近一次加载的副本，同时串行化本进程内的访问
    data: Arc<RwLock<CatalogData>>,
}

impl FileCatalog {
    /// 读取目录文件；文件不存在时从空目录开始
    pub async fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !tokio::fs::try_exists(&path).await? {
            info!("目录文件 {} 不存在，使用空目录", path.display());
        }
        let data = read_catalog_file(&path).await?;
        Ok(Self {
            path: Some(path),
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// 不落盘的目录
    pub fn in_memory(data: CatalogData) -> Self {
        Self {
            path: None,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub async fn snapshot(&self) -> OrchestratorResult<CatalogData> {
        self.read(CatalogData::clone).await
    }

    async fn read<T>(&self, f: impl FnOnce(&CatalogData) -> T) -> OrchestratorResult<T> {
        let Some(path) = &self.path else {
            return Ok(f(&*self.data.read().await));
        };
        let mut cached = self.data.write().await;
        *cached = read_catalog_file(path).await?;
        Ok(f(&*cached))
    }

    /// 修改失败时不回写
    async fn mutate<T, F>(&self, f: F) -> OrchestratorResult<T>
    where
        F: FnOnce(&mut CatalogData) -> OrchestratorResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut cached = self.data.write().await;
        let Some(path) = self.path.clone() else {
            return f(&mut *cached);
        };

        // 文件锁是阻塞调用，放到阻塞线程池里执行
        let (result, latest) = tokio::task::spawn_blocking(move || locked_update(&path, f))
            .await
            .map_err(|e| OrchestratorError::Internal(format!("目录写入任务异常终止: {e}")))??;
        *cached = latest;
        Ok(result)
    }
}

async fn read_catalog_file(path: &Path) -> OrchestratorResult<CatalogData> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CatalogData::default()),
        Err(e) => Err(e.into()),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// 持有排他锁读取最新内容、应用修改，再先写临时文件后改名
fn locked_update<T>(
    path: &Path,
    f: impl FnOnce(&mut CatalogData) -> OrchestratorResult<T>,
) -> OrchestratorResult<(T, CatalogData)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    lock.lock()?;

    let mut data = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogData::default(),
        Err(e) => return Err(e.into()),
    };
    let result = f(&mut data)?;

    let rendered = serde_json::to_string_pretty(&data)?;
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, path)?;
    debug!("目录已写回 {}", path.display());

    // 锁随文件句柄关闭释放
    drop(lock);
    Ok((result, data))
}

#[async_trait]
impl JobRepository for FileCatalog {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<JobDefinition>> {
        self.read(|data| data.jobs.iter().find(|job| job.id == id).cloned())
            .await
    }

    async fn update(&self, job: &JobDefinition) -> OrchestratorResult<()> {
        let job = job.clone();
        self.mutate(move |data| {
            let slot = data
                .jobs
                .iter_mut()
                .find(|existing| existing.id == job.id)
                .ok_or(OrchestratorError::JobNotFound { id: job.id })?;
            *slot = job;
            Ok(())
        })
        .await
    }

    async fn bind_cluster(&self, job_id: i64, cluster_id: i64) -> OrchestratorResult<()> {
        self.mutate(move |data| {
            let job = data
                .jobs
                .iter_mut()
                .find(|job| job.id == job_id)
                .ok_or(OrchestratorError::JobNotFound { id: job_id })?;
            job.cluster_id = Some(cluster_id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ProjectRepository for FileCatalog {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Project>> {
        self.read(|data| data.projects.iter().find(|project| project.id == id).cloned())
            .await
    }
}

#[async_trait]
impl ClusterRepository for FileCatalog {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ClusterTarget>> {
        self.read(|data| data.clusters.iter().find(|cluster| cluster.id == id).cloned())
            .await
    }
}

#[async_trait]
impl ResourceRepository for FileCatalog {
    async fn bind_resources(&self, job_id: i64, resource_ids: &[i64]) -> OrchestratorResult<()> {
        let resource_ids = resource_ids.to_vec();
        self.mutate(move |data| {
            if !data.jobs.iter().any(|job| job.id == job_id) {
                return Err(OrchestratorError::JobNotFound { id: job_id });
            }
            if let Some(missing) = resource_ids
                .iter()
                .find(|id| !data.resources.iter().any(|resource| resource.id == **id))
            {
                return Err(OrchestratorError::ResourceNotFound { id: *missing });
            }
            data.job_resources.insert(job_id, resource_ids);
            Ok(())
        })
        .await
    }

    async fn list_job_resources(&self, job_id: i64) -> OrchestratorResult<Vec<ResourceArtifact>> {
        self.read(|data| {
            let Some(ids) = data.job_resources.get(&job_id) else {
                return Ok(Vec::new());
            };
            ids.iter()
                .map(|id| {
                    data.resources
                        .iter()
                        .find(|resource| resource.id == *id)
                        .cloned()
                        .ok_or(OrchestratorError::ResourceNotFound { id: *id })
                })
                .collect()
        })
        .await?
    }
}

#[async_trait]
impl RunInstanceRepository for FileCatalog {
    async fn insert(&self, instance: &RunInstance) -> OrchestratorResult<()> {
        let instance = instance.clone();
        self.mutate(move |data| {
            data.run_instances.push(instance);
            Ok(())
        })
        .await
    }

    async fn list_running(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>> {
        self.read(|data| {
            data.run_instances
                .iter()
                .filter(|instance| instance.job_code == job_code && instance.is_running())
                .cloned()
                .collect()
        })
        .await
    }

    async fn list_by_job_code(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>> {
        self.read(|data| {
            data.run_instances
                .iter()
                .filter(|instance| instance.job_code == job_code)
                .cloned()
                .collect()
        })
        .await
    }

    async fn update_state(&self, run_id: &str, state: InstanceState) -> OrchestratorResult<bool> {
        let run_id = run_id.to_string();
        self.mutate(move |data| {
            let Some(instance) = data
                .run_instances
                .iter_mut()
                .find(|instance| instance.run_id == run_id)
            else {
                return Ok(false);
            };
            instance.state = state;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dataflow_domain::{JobKind, JobRuntimeState};

    fn sample() -> CatalogData {
        CatalogData {
            projects: vec![Project {
                id: 1,
                code: "p1".to_string(),
                name: "Project".to_string(),
            }],
            resources: vec![ResourceArtifact {
                id: 10,
                file_name: "lib.jar".to_string(),
                remote_path: "jars".to_string(),
                size: 1024,
            }],
            jobs: vec![JobDefinition {
                id: 100,
                code: "j1".to_string(),
                project_id: 1,
                kind: JobKind::Stream,
                cron_expression: None,
                attributes: vec![],
                steps: vec![],
                links: vec![],
                cluster_id: None,
                runtime_state: JobRuntimeState::Defined,
            }],
            ..Default::default()
        }
    }

    fn instance(run_id: &str, state: InstanceState) -> RunInstance {
        RunInstance {
            run_id: run_id.to_string(),
            job_id: 100,
            project_id: 1,
            job_code: "j1".to_string(),
            cluster_id: 1,
            web_url: String::new(),
            state,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bind_resources_validates_ids() {
        let catalog = FileCatalog::in_memory(sample());

        catalog.bind_resources(100, &[10]).await.unwrap();
        let bound = catalog.list_job_resources(100).await.unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].file_name, "lib.jar");

        assert!(matches!(
            catalog.bind_resources(100, &[10, 11]).await,
            Err(OrchestratorError::ResourceNotFound { id: 11 })
        ));
        assert!(matches!(
            catalog.bind_resources(7, &[]).await,
            Err(OrchestratorError::JobNotFound { id: 7 })
        ));
    }

    #[tokio::test]
    async fn test_list_running_skips_terminal() {
        let catalog = FileCatalog::in_memory(sample());
        catalog
            .insert(&instance("a", InstanceState::Running))
            .await
            .unwrap();
        catalog
            .insert(&instance("b", InstanceState::Finished))
            .await
            .unwrap();

        let running = catalog.list_running("j1").await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].run_id, "a");
        assert_eq!(catalog.list_by_job_code("j1").await.unwrap().len(), 2);

        assert!(catalog
            .update_state("a", InstanceState::Cancelled)
            .await
            .unwrap());
        assert!(catalog.list_running("j1").await.unwrap().is_empty());
        assert!(!catalog
            .update_state("zzz", InstanceState::Cancelled)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_catalog_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();

        let catalog = FileCatalog::load(&path).await.unwrap();
        catalog.bind_cluster(100, 5).await.unwrap();

        let reloaded = FileCatalog::load(&path).await.unwrap();
        let job = JobRepository::get_by_id(&reloaded, 100).await.unwrap().unwrap();
        assert_eq!(job.cluster_id, Some(5));
    }

    #[tokio::test]
    async fn test_example_catalog_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/catalog.example.json");
        let catalog = FileCatalog::load(&path).await.unwrap();
        let data = catalog.snapshot().await.unwrap();

        assert_eq!(data.jobs.len(), 2);
        assert!(data.jobs[0].is_scheduled_batch());
        assert!(!data.jobs[1].is_scheduled_batch());
        assert_eq!(data.clusters[0].config["rest.port"], "8081");
    }

    #[tokio::test]
    async fn test_missing_catalog_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::load(dir.path().join("absent.json")).await.unwrap();
        assert_eq!(catalog.snapshot().await.unwrap(), CatalogData::default());
    }

    #[tokio::test]
    async fn test_two_handles_on_one_file_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();

        // 常驻进程先加载，命令行调用随后加载同一个文件
        let serve = FileCatalog::load(&path).await.unwrap();
        let cli = FileCatalog::load(&path).await.unwrap();

        cli.insert(&instance("from-cli", InstanceState::Running))
            .await
            .unwrap();
        let mut job = JobRepository::get_by_id(&cli, 100).await.unwrap().unwrap();
        job.runtime_state = JobRuntimeState::Stopped;
        cli.update(&job).await.unwrap();

        // 常驻进程的写入不能抹掉命令行的修改
        serve
            .insert(&instance("from-serve", InstanceState::Running))
            .await
            .unwrap();

        let persisted: CatalogData =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(persisted.run_instances.len(), 2);
        assert_eq!(persisted.jobs[0].runtime_state, JobRuntimeState::Stopped);

        let seen = JobRepository::get_by_id(&serve, 100).await.unwrap().unwrap();
        assert_eq!(seen.runtime_state, JobRuntimeState::Stopped);
        assert_eq!(cli.list_running("j1").await.unwrap().len(), 2);

        // 加载之后才加入文件的集群也能查到
        let mut edited = persisted;
        edited.clusters.push(ClusterTarget {
            id: 9,
            name: "late".to_string(),
            config: Default::default(),
        });
        std::fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();
        assert!(ClusterRepository::get_by_id(&serve, 9)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let original = serde_json::to_string(&sample()).unwrap();
        std::fs::write(&path, &original).unwrap();

        let catalog = FileCatalog::load(&path).await.unwrap();
        assert!(matches!(
            catalog.bind_resources(100, &[404]).await,
            Err(OrchestratorError::ResourceNotFound { id: 404 })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }
}
