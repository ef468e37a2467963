use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use dataflow::app::Application;
use dataflow_config::{AppConfig, StorageConfig};
use dataflow_dispatcher::RunOutcome;
use dataflow_domain::{InstanceState, JobRuntimeState, RunRequest, ScheduleStore, INTERNAL_GROUP};
use dataflow_infrastructure::{
    catalog::CatalogData, FileCatalog, ObjectStoreArtifactStorage, SqliteScheduleStore,
};
use dataflow_testing_utils::*;
use tempfile::TempDir;

struct Deployment {
    app: Application,
    engine: RecordingEngineClient,
    store: Arc<SqliteScheduleStore>,
    catalog_path: PathBuf,
    _dirs: Vec<TempDir>,
}

/// 在临时目录里搭一套完整部署：目录文件、本地制品存储、SQLite 调度存储
async fn deploy(catalog: CatalogData, objects: &[(&str, usize)]) -> Result<Deployment> {
    let home = tempfile::tempdir()?;
    let resources = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let state = tempfile::tempdir()?;

    let mut config = AppConfig::default();
    config.engine.home = home.path().to_path_buf();
    config.storage = StorageConfig::Local {
        root: resources.path().to_path_buf(),
    };
    config.staging.root = Some(staging.path().to_path_buf());
    config.catalog.path = state.path().join("catalog.json");

    TestEnv::write_file(&home.path().join(&config.engine.runtime_artifact), 128, 0x11);
    for (object, size) in objects {
        TestEnv::write_file(&resources.path().join(object), *size, 0x22);
    }
    write_catalog(&config.catalog.path, &catalog)?;

    let catalog = Arc::new(FileCatalog::load(&config.catalog.path).await?);
    let storage = Arc::new(ObjectStoreArtifactStorage::local(resources.path())?);
    let engine = RecordingEngineClient::new();
    let store = Arc::new(SqliteScheduleStore::connect("sqlite::memory:").await?);
    let catalog_path = config.catalog.path.clone();

    let app = Application::from_parts(
        config,
        catalog,
        storage,
        Arc::new(RecordingEngineFactory::new(engine.clone())),
        store.clone(),
    );

    Ok(Deployment {
        app,
        engine,
        store,
        catalog_path,
        _dirs: vec![home, resources, staging, state],
    })
}

fn write_catalog(path: &Path, catalog: &CatalogData) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(catalog)?)?;
    Ok(())
}

fn read_catalog(path: &Path) -> Result<CatalogData> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn base_catalog() -> CatalogData {
    CatalogData {
        projects: vec![project(1, "p1")],
        clusters: vec![ClusterBuilder::new().build()],
        resources: vec![resource(5, "udf.jar", 300)],
        ..CatalogData::default()
    }
}

#[tokio::test]
async fn test_stream_job_submission_is_persisted() -> Result<()> {
    let mut catalog = base_catalog();
    catalog
        .jobs
        .push(JobBuilder::new().with_id(1).with_code("orders_sync").stream().build());
    let d = deploy(catalog, &[("resources/udf.jar", 300)]).await?;

    let outcome = d
        .app
        .run_job(&RunRequest {
            job_id: 1,
            cluster_id: 1,
            resource_ids: vec![5],
        })
        .await?;
    assert!(matches!(outcome, RunOutcome::Submitted(_)));

    let (launch, submission) = d.engine.submissions().remove(0);
    assert_eq!(launch.classpath.len(), 2);
    assert!(launch.classpath.iter().any(|uri| uri.ends_with("/udf.jar")));
    assert!(submission.spec_file.exists());

    let persisted = read_catalog(&d.catalog_path)?;
    assert_eq!(persisted.jobs[0].runtime_state, JobRuntimeState::Running);
    assert_eq!(persisted.jobs[0].cluster_id, Some(1));
    assert_eq!(persisted.job_resources.get(&1), Some(&vec![5]));
    assert_eq!(persisted.run_instances.len(), 1);
    assert_eq!(persisted.run_instances[0].state, InstanceState::Initializing);
    Ok(())
}

#[tokio::test]
async fn test_scheduled_job_lands_in_sqlite_store() -> Result<()> {
    let mut catalog = base_catalog();
    catalog.jobs.push(
        JobBuilder::new()
            .with_id(2)
            .with_code("daily_report")
            .batch()
            .with_cron("0 0 2 * * ?")
            .build(),
    );
    let d = deploy(catalog, &[]).await?;

    let request = RunRequest {
        job_id: 2,
        cluster_id: 1,
        resource_ids: vec![],
    };
    d.app.run_job(&request).await?;
    d.app.run_job(&request).await?;

    let entries = d.store.list(INTERNAL_GROUP).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key.name, "BATCH_JOB_p1_daily_report");
    assert!(d.engine.submissions().is_empty());

    assert!(d.app.unschedule_job(2).await?);
    assert!(!d.app.unschedule_job(2).await?);
    assert!(d.store.list(INTERNAL_GROUP).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stop_and_status() -> Result<()> {
    let mut catalog = base_catalog();
    let job = JobBuilder::new()
        .with_id(3)
        .with_code("cdc")
        .stream()
        .with_cluster(1)
        .build();
    catalog
        .run_instances
        .push(RunInstanceBuilder::new("run-x").for_job(&job).build());
    catalog.jobs.push(job);
    let d = deploy(catalog, &[]).await?;

    d.engine.set_status("run-x", InstanceState::Running);
    let instances = d.app.job_status(3).await?;
    assert_eq!(instances.len(), 1);

    let report = d.app.stop_job(3).await?;
    assert_eq!(report.stopped, vec!["run-x"]);
    assert_eq!(
        d.engine.terminations(),
        vec![("run-x".to_string(), "cancel".to_string())]
    );

    let persisted = read_catalog(&d.catalog_path)?;
    assert_eq!(persisted.jobs[0].runtime_state, JobRuntimeState::Stopped);
    assert_eq!(persisted.run_instances[0].state, InstanceState::Cancelled);
    assert!(d.app.job_status(3).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_job_is_reported() -> Result<()> {
    let d = deploy(base_catalog(), &[]).await?;
    let err = d.app.unschedule_job(404).await.unwrap_err();
    assert!(format!("{err:#}").contains("404"));
    Ok(())
}
