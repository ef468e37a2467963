use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    engine::{CheckpointConfig, EngineConfig, StagingConfig, StorageConfig},
    logging::ObservabilityConfig,
    orchestrator::{CatalogConfig, OrchestratorConfig, SchedulerConfig},
};
use crate::validation::ConfigValidator;
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 依次叠加：内置默认值、配置文件、`DATAFLOW__` 前缀的环境变量
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("engine.home", "/opt/seatunnel")?
            .set_default("engine.runtime_artifact", super::engine::DEFAULT_RUNTIME_ARTIFACT)?
            .set_default("engine.entry_class", super::engine::DEFAULT_ENTRY_CLASS)?
            .set_default("engine.launcher", super::engine::DEFAULT_LAUNCHER)?
            .set_default("engine.submit_timeout_seconds", 300)?
            .set_default("engine.request_timeout_seconds", 30)?
            .set_default("storage.backend", "local")?
            .set_default("storage.root", "data/resources")?
            .set_default("staging.cleanup_on_failure", false)?
            .set_default("checkpoint.drain", true)?
            .set_default("orchestrator.cancel_failure_policy", "abort_on_first")?
            .set_default("orchestrator.preflight_scheduled_jobs", true)?
            .set_default("orchestrator.stop_timeout_seconds", 300)?
            .set_default("scheduler.database_url", "sqlite://dataflow-schedules.db?mode=rwc")?
            .set_default("scheduler.poll_interval_seconds", 10)?
            .set_default("catalog.path", "config/catalog.json")?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "pretty")?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(ConfigError::File(format!("配置文件不存在: {path}")));
            }
        } else {
            let default_paths = ["config/dataflow.toml", "dataflow.toml", "/etc/dataflow/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DATAFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 去掉空白后为空的检查点目录视为未配置
    pub fn checkpoint_dir(&self) -> Option<&str> {
        self.checkpoint
            .dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.storage.validate()?;
        self.staging.validate()?;
        self.checkpoint.validate()?;
        self.orchestrator.validate()?;
        self.scheduler.validate()?;
        self.catalog.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelFailurePolicy, LogLevel, OutputFormat};
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.engine.request_timeout_seconds, 30);
        assert_eq!(config.orchestrator.stop_timeout_seconds, 300);
        assert!(config.orchestrator.preflight_scheduled_jobs);
        assert_eq!(config.checkpoint_dir(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[engine]
home = "/srv/seatunnel"
request_timeout_seconds = 10

[storage]
backend = "s3"
bucket = "dataflow"
endpoint = "http://minio:9000"
allow_http = true

[staging]
cleanup_on_failure = true

[checkpoint]
dir = "hdfs:///savepoints/"

[orchestrator]
cancel_failure_policy = "collect_all"
stop_timeout_seconds = 60

[observability]
log_level = "debug"
log_format = "json"
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.engine.home, std::path::PathBuf::from("/srv/seatunnel"));
        assert_eq!(config.engine.runtime_artifact, "lib/seatunnel-core-flink.jar");
        assert!(matches!(config.storage, StorageConfig::S3 { .. }));
        assert!(config.staging.cleanup_on_failure);
        assert_eq!(config.checkpoint_dir(), Some("hdfs:///savepoints/"));
        assert_eq!(
            config.orchestrator.cancel_failure_policy,
            CancelFailurePolicy::CollectAll
        );
        assert!(config.orchestrator.preflight_scheduled_jobs);
        assert_eq!(config.observability.log_level, LogLevel::Debug);
        assert_eq!(config.observability.log_format, OutputFormat::Json);
    }

    #[test]
    fn test_blank_checkpoint_dir_is_unset() {
        let config = AppConfig::from_toml("[checkpoint]\ndir = \"  \"\n").unwrap();
        assert_eq!(config.checkpoint_dir(), None);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[engine]\nhome = \"/data/seatunnel\"").unwrap();
        writeln!(file, "[catalog]\npath = \"/data/catalog.json\"").unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.engine.home, std::path::PathBuf::from("/data/seatunnel"));
        assert_eq!(
            config.catalog.path,
            std::path::PathBuf::from("/data/catalog.json")
        );
        assert_eq!(config.scheduler.poll_interval_seconds, 10);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::File(_))));
    }
}
