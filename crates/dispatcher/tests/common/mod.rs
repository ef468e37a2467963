#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use dataflow_dispatcher::{
    ArtifactStager, JobLifecycleService, LifecycleSettings, OrchestratorRepositories,
    ScheduleRegistrar, StepListSpecGenerator,
};
use dataflow_domain::{ClusterTarget, JobDefinition, Project, ResourceArtifact, RunInstance};
use dataflow_infrastructure::InMemoryScheduleStore;
use dataflow_testing_utils::*;
use tempfile::TempDir;

pub const RUNTIME_ARTIFACT: &str = "lib/seatunnel-core-flink.jar";

pub struct Harness {
    pub service: Arc<JobLifecycleService>,
    pub jobs: MockJobRepository,
    pub resources: MockResourceRepository,
    pub runs: MockRunInstanceRepository,
    pub storage: CountingArtifactStorage,
    pub engine: RecordingEngineClient,
    pub factory: RecordingEngineFactory,
    pub store: Arc<InMemoryScheduleStore>,
    pub allocator: FixedDirAllocator,
    pub engine_home: TempDir,
    pub staging: TempDir,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn job(&self, id: i64) -> JobDefinition {
        self.jobs.get(id).expect("job exists")
    }

    pub fn staging_dir(&self, project_id: i64) -> PathBuf {
        self.allocator.project_dir(project_id)
    }
}

pub struct HarnessBuilder {
    jobs: Vec<JobDefinition>,
    projects: Vec<Project>,
    clusters: Vec<ClusterTarget>,
    resources: Vec<(ResourceArtifact, Vec<u8>)>,
    instances: Vec<RunInstance>,
    settings: LifecycleSettings,
    with_runtime: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            jobs: vec![],
            projects: vec![project(1, "p1")],
            clusters: vec![ClusterBuilder::new().build()],
            resources: vec![],
            instances: vec![],
            settings: LifecycleSettings::default(),
            with_runtime: true,
        }
    }
}

impl HarnessBuilder {
    pub fn job(mut self, job: JobDefinition) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn cluster(mut self, cluster: ClusterTarget) -> Self {
        self.clusters.retain(|c| c.id != cluster.id);
        self.clusters.push(cluster);
        self
    }

    /// Register a resource whose remote object holds `bytes`
    pub fn resource(mut self, resource: ResourceArtifact, bytes: Vec<u8>) -> Self {
        self.resources.push((resource, bytes));
        self
    }

    pub fn instance(mut self, instance: RunInstance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn without_runtime(mut self) -> Self {
        self.with_runtime = false;
        self
    }

    pub fn build(self) -> Harness {
        let engine_home = tempfile::tempdir().unwrap();
        if self.with_runtime {
            TestEnv::write_file(&engine_home.path().join(RUNTIME_ARTIFACT), 64, 0xCA);
        }
        let staging = tempfile::tempdir().unwrap();

        let jobs = MockJobRepository::with_jobs(self.jobs);
        let resources = MockResourceRepository::with_resources(
            self.resources.iter().map(|(r, _)| r.clone()).collect(),
        );
        let runs = MockRunInstanceRepository::with_instances(self.instances);
        let mut storage = CountingArtifactStorage::new();
        for (resource, bytes) in &self.resources {
            storage = storage.with_object(&resource.object_path(), bytes.clone());
        }

        let engine = RecordingEngineClient::new();
        let factory = RecordingEngineFactory::new(engine.clone());
        let store = Arc::new(InMemoryScheduleStore::new());
        let allocator = FixedDirAllocator::new(staging.path().join("area"));

        let repos = OrchestratorRepositories {
            jobs: Arc::new(jobs.clone()),
            projects: Arc::new(MockProjectRepository::with_projects(self.projects)),
            clusters: Arc::new(MockClusterRepository::with_clusters(self.clusters)),
            resources: Arc::new(resources.clone()),
            run_instances: Arc::new(runs.clone()),
        };
        let stager = ArtifactStager::new(
            Arc::new(storage.clone()),
            engine_home.path(),
            RUNTIME_ARTIFACT,
        );

        let service = JobLifecycleService::new(
            repos,
            stager,
            Arc::new(allocator.clone()),
            Arc::new(StepListSpecGenerator),
            Arc::new(factory.clone()),
            ScheduleRegistrar::new(store.clone()),
            self.settings,
        );

        Harness {
            service: Arc::new(service),
            jobs,
            resources,
            runs,
            storage,
            engine,
            factory,
            store,
            allocator,
            engine_home,
            staging,
        }
    }
}
