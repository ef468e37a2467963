use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

pub const DEFAULT_RUNTIME_ARTIFACT: &str = "lib/seatunnel-core-flink.jar";
pub const DEFAULT_ENTRY_CLASS: &str = "org.apache.seatunnel.core.flink.SeatunnelFlink";
pub const DEFAULT_LAUNCHER: &str = "/opt/flink/bin/flink";

/// Local engine runtime installation and control-plane client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Installation directory of the runtime package.
    pub home: PathBuf,
    /// Runtime jar, relative to `home`.
    pub runtime_artifact: String,
    pub entry_class: String,
    /// Engine client executable; submissions are built on this host and shipped to the cluster.
    pub launcher: PathBuf,
    /// Upper bound for one client-side submission, including artifact upload.
    pub submit_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("/opt/seatunnel"),
            runtime_artifact: DEFAULT_RUNTIME_ARTIFACT.to_string(),
            entry_class: DEFAULT_ENTRY_CLASS.to_string(),
            launcher: PathBuf::from(DEFAULT_LAUNCHER),
            submit_timeout_seconds: 300,
            request_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for EngineConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.home.to_string_lossy(), "engine.home")?;
        ValidationUtils::validate_relative_path(&self.runtime_artifact, "engine.runtime_artifact")?;
        ValidationUtils::validate_not_empty(&self.entry_class, "engine.entry_class")?;
        ValidationUtils::validate_not_empty(&self.launcher.to_string_lossy(), "engine.launcher")?;
        ValidationUtils::validate_timeout_seconds(
            self.submit_timeout_seconds,
            "engine.submit_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "engine.request_timeout_seconds",
        )?;
        Ok(())
    }
}

/// Remote artifact storage backend, selected once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        root: PathBuf,
    },
    /// S3 or an S3-compatible store (MinIO, OSS gateway). Credentials fall back to the
    /// standard `AWS_*` environment variables when not set here.
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
        #[serde(default)]
        allow_http: bool,
        #[serde(default = "default_storage_timeout")]
        request_timeout_seconds: u64,
    },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_timeout() -> u64 {
    60
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("data/resources"),
        }
    }
}

impl ConfigValidator for StorageConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        match self {
            StorageConfig::Local { root } => {
                ValidationUtils::validate_not_empty(&root.to_string_lossy(), "storage.root")
            }
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                request_timeout_seconds,
                ..
            } => {
                ValidationUtils::validate_not_empty(bucket, "storage.bucket")?;
                ValidationUtils::validate_not_empty(region, "storage.region")?;
                if let Some(endpoint) = endpoint {
                    ValidationUtils::validate_url(endpoint, "storage.endpoint")?;
                }
                ValidationUtils::validate_timeout_seconds(
                    *request_timeout_seconds,
                    "storage.request_timeout_seconds",
                )
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StagingConfig {
    /// Parent of the per-submission directories; the system temp dir when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Remove the staging directory when a submission fails.
    #[serde(default)]
    pub cleanup_on_failure: bool,
}

impl ConfigValidator for StagingConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(root) = &self.root {
            ValidationUtils::validate_not_empty(&root.to_string_lossy(), "staging.root")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointConfig {
    /// Savepoint directory; abrupt cancellation is used when unset or empty.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_drain")]
    pub drain: bool,
}

fn default_drain() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: None,
            drain: true,
        }
    }
}

impl ConfigValidator for CheckpointConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        Ok(())
    }
}
