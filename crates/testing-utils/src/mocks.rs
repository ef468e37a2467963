//! Mock implementations for the repository and collaborator traits
//!
//! In-memory doubles that record every call so tests can assert on the
//! exact interaction with storage, the engine control plane and the
//! metadata store.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dataflow_domain::{
    ArtifactStorage, ByteStream, ClusterRepository, ClusterTarget, ControlPlaneEndpoint,
    EngineClient, EngineClientFactory, InstanceState, JarSubmission, JobDefinition,
    JobRepository, LaunchConfiguration, Project, ProjectRepository, ResourceArtifact,
    ResourceRepository, RunInstance, RunInstanceRepository, StagingAllocator, StagingArea,
};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use futures::StreamExt;

/// Mock implementation of JobRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, JobDefinition>>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<JobDefinition>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.jobs.lock().unwrap();
            for job in jobs {
                map.insert(job.id, job);
            }
        }
        repo
    }

    pub fn get(&self, id: i64) -> Option<JobDefinition> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<JobDefinition>> {
        Ok(self.get(id))
    }

    async fn update(&self, job: &JobDefinition) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(OrchestratorError::JobNotFound { id: job.id });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn bind_cluster(&self, job_id: i64, cluster_id: i64) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(OrchestratorError::JobNotFound { id: job_id })?;
        job.cluster_id = Some(cluster_id);
        Ok(())
    }
}

/// Mock implementation of ProjectRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockProjectRepository {
    projects: Arc<Mutex<HashMap<i64, Project>>>,
}

impl MockProjectRepository {
    pub fn with_projects(projects: Vec<Project>) -> Self {
        let repo = Self::default();
        repo.projects
            .lock()
            .unwrap()
            .extend(projects.into_iter().map(|p| (p.id, p)));
        repo
    }
}

#[async_trait]
impl ProjectRepository for MockProjectRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Project>> {
        Ok(self.projects.lock().unwrap().get(&id).cloned())
    }
}

/// Mock implementation of ClusterRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockClusterRepository {
    clusters: Arc<Mutex<HashMap<i64, ClusterTarget>>>,
}

impl MockClusterRepository {
    pub fn with_clusters(clusters: Vec<ClusterTarget>) -> Self {
        let repo = Self::default();
        repo.clusters
            .lock()
            .unwrap()
            .extend(clusters.into_iter().map(|c| (c.id, c)));
        repo
    }
}

#[async_trait]
impl ClusterRepository for MockClusterRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ClusterTarget>> {
        Ok(self.clusters.lock().unwrap().get(&id).cloned())
    }
}

/// Mock implementation of ResourceRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockResourceRepository {
    resources: Arc<Mutex<HashMap<i64, ResourceArtifact>>>,
    bindings: Arc<Mutex<HashMap<i64, Vec<i64>>>>,
}

impl MockResourceRepository {
    pub fn with_resources(resources: Vec<ResourceArtifact>) -> Self {
        let repo = Self::default();
        repo.resources
            .lock()
            .unwrap()
            .extend(resources.into_iter().map(|r| (r.id, r)));
        repo
    }

    pub fn bound_ids(&self, job_id: i64) -> Vec<i64> {
        self.bindings
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceRepository for MockResourceRepository {
    async fn bind_resources(&self, job_id: i64, resource_ids: &[i64]) -> OrchestratorResult<()> {
        let resources = self.resources.lock().unwrap();
        if let Some(missing) = resource_ids.iter().find(|id| !resources.contains_key(id)) {
            return Err(OrchestratorError::ResourceNotFound { id: *missing });
        }
        self.bindings
            .lock()
            .unwrap()
            .insert(job_id, resource_ids.to_vec());
        Ok(())
    }

    async fn list_job_resources(&self, job_id: i64) -> OrchestratorResult<Vec<ResourceArtifact>> {
        let resources = self.resources.lock().unwrap();
        Ok(self
            .bound_ids(job_id)
            .iter()
            .filter_map(|id| resources.get(id).cloned())
            .collect())
    }
}

/// Mock implementation of RunInstanceRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockRunInstanceRepository {
    instances: Arc<Mutex<Vec<RunInstance>>>,
}

impl MockRunInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(instances: Vec<RunInstance>) -> Self {
        Self {
            instances: Arc::new(Mutex::new(instances)),
        }
    }

    pub fn all(&self) -> Vec<RunInstance> {
        self.instances.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

#[async_trait]
impl RunInstanceRepository for MockRunInstanceRepository {
    async fn insert(&self, instance: &RunInstance) -> OrchestratorResult<()> {
        self.instances.lock().unwrap().push(instance.clone());
        Ok(())
    }

    async fn list_running(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|i| i.job_code == job_code && i.is_running())
            .collect())
    }

    async fn list_by_job_code(&self, job_code: &str) -> OrchestratorResult<Vec<RunInstance>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|i| i.job_code == job_code)
            .collect())
    }

    async fn update_state(&self, run_id: &str, state: InstanceState) -> OrchestratorResult<bool> {
        let mut instances = self.instances.lock().unwrap();
        match instances.iter_mut().find(|i| i.run_id == run_id) {
            Some(instance) => {
                instance.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory object store that counts fetches
#[derive(Debug, Clone, Default)]
pub struct CountingArtifactStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    get_calls: Arc<AtomicUsize>,
    fail_reads: Arc<Mutex<bool>>,
}

impl CountingArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, path: &str, bytes: Vec<u8>) -> Self {
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        self
    }

    /// Number of `get` calls, i.e. remote downloads
    pub fn fetch_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent `get` fail with a storage error
    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }

    fn object(&self, path: &str) -> OrchestratorResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| OrchestratorError::storage(path, "object not found"))
    }
}

#[async_trait]
impl ArtifactStorage for CountingArtifactStorage {
    async fn exists(&self, path: &str) -> OrchestratorResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn size(&self, path: &str) -> OrchestratorResult<u64> {
        Ok(self.object(path)?.len() as u64)
    }

    async fn get(&self, path: &str) -> OrchestratorResult<ByteStream> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_reads.lock().unwrap() {
            return Err(OrchestratorError::storage(path, "connection reset"));
        }
        let bytes = self.object(path)?;
        let chunks: Vec<OrchestratorResult<Vec<u8>>> =
            bytes.chunks(256).map(|chunk| Ok(chunk.to_vec())).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStop {
    pub run_id: String,
    pub checkpoint_path: String,
    pub drain: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    submissions: Vec<(LaunchConfiguration, JarSubmission)>,
    terminations: Vec<(String, String)>,
    stops: Vec<RecordedStop>,
    statuses: HashMap<String, InstanceState>,
    failing_runs: HashSet<String>,
    submit_failure: Option<String>,
    panic_on_submit: bool,
    next_run: usize,
}

/// Engine client that records every call and returns `run-<n>` ids
#[derive(Debug, Clone, Default)]
pub struct RecordingEngineClient {
    state: Arc<Mutex<EngineState>>,
}

impl RecordingEngineClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submissions(&self, message: &str) {
        self.state.lock().unwrap().submit_failure = Some(message.to_string());
    }

    pub fn panic_on_submit(&self) {
        self.state.lock().unwrap().panic_on_submit = true;
    }

    /// Make terminate and stop fail for this run id
    pub fn fail_control_for(&self, run_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_runs
            .insert(run_id.to_string());
    }

    pub fn set_status(&self, run_id: &str, state: InstanceState) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(run_id.to_string(), state);
    }

    pub fn submissions(&self) -> Vec<(LaunchConfiguration, JarSubmission)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn terminations(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().terminations.clone()
    }

    pub fn stops(&self) -> Vec<RecordedStop> {
        self.state.lock().unwrap().stops.clone()
    }

    fn check_control(&self, run_id: &str) -> OrchestratorResult<()> {
        if self.state.lock().unwrap().failing_runs.contains(run_id) {
            return Err(OrchestratorError::Internal(format!(
                "control plane rejected {run_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for RecordingEngineClient {
    async fn submit_jar(
        &self,
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<String> {
        let panic_requested = self.state.lock().unwrap().panic_on_submit;
        if panic_requested {
            panic!("engine client aborted during submission");
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.submit_failure {
            return Err(OrchestratorError::submission(&launch.run_name, message.clone()));
        }
        state.next_run += 1;
        let run_id = format!("run-{}", state.next_run);
        state
            .submissions
            .push((launch.clone(), submission.clone()));
        state
            .statuses
            .insert(run_id.clone(), InstanceState::Initializing);
        Ok(run_id)
    }

    async fn query_status(&self, run_id: &str) -> OrchestratorResult<InstanceState> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(run_id)
            .copied()
            .ok_or_else(|| OrchestratorError::control_plane(run_id, 0, "unknown run"))
    }

    async fn terminate(&self, run_id: &str, reason: &str) -> OrchestratorResult<()> {
        self.check_control(run_id)?;
        let mut state = self.state.lock().unwrap();
        state
            .terminations
            .push((run_id.to_string(), reason.to_string()));
        state
            .statuses
            .insert(run_id.to_string(), InstanceState::Cancelled);
        Ok(())
    }

    async fn stop_with_checkpoint(
        &self,
        run_id: &str,
        checkpoint_path: &str,
        drain: bool,
    ) -> OrchestratorResult<()> {
        self.check_control(run_id)?;
        let mut state = self.state.lock().unwrap();
        state.stops.push(RecordedStop {
            run_id: run_id.to_string(),
            checkpoint_path: checkpoint_path.to_string(),
            drain,
        });
        state
            .statuses
            .insert(run_id.to_string(), InstanceState::Finished);
        Ok(())
    }
}

/// Hands out the same recording client for every cluster
#[derive(Debug, Clone, Default)]
pub struct RecordingEngineFactory {
    client: RecordingEngineClient,
    endpoints: Arc<Mutex<Vec<ControlPlaneEndpoint>>>,
}

impl RecordingEngineFactory {
    pub fn new(client: RecordingEngineClient) -> Self {
        Self {
            client,
            endpoints: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn client(&self) -> &RecordingEngineClient {
        &self.client
    }

    pub fn endpoints(&self) -> Vec<ControlPlaneEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

impl EngineClientFactory for RecordingEngineFactory {
    fn connect(&self, endpoint: &ControlPlaneEndpoint) -> OrchestratorResult<Arc<dyn EngineClient>> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(Arc::new(self.client.clone()))
    }
}

/// Always allocates `<dir>/<project id>` so tests can pre-populate the staging area
#[derive(Debug, Clone)]
pub struct FixedDirAllocator {
    dir: PathBuf,
    allocations: Arc<AtomicUsize>,
}

impl FixedDirAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            allocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn project_dir(&self, project_id: i64) -> PathBuf {
        self.dir.join(project_id.to_string())
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StagingAllocator for FixedDirAllocator {
    async fn allocate(&self, project_id: i64) -> OrchestratorResult<StagingArea> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(StagingArea::new(self.dir.clone(), dir))
    }
}
