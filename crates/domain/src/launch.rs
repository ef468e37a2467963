//! 引擎启动配置与提交描述
//!
//! 这里只定义值对象和少量纯函数，构建逻辑在 dispatcher 的配置构建器里。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entities::{JobAttrKind, JobAttribute};

pub const PIPELINE_NAME: &str = "pipeline.name";
pub const PIPELINE_JARS: &str = "pipeline.jars";
pub const JOBMANAGER_ADDRESS: &str = "jobmanager.rpc.address";
pub const JOBMANAGER_PORT: &str = "jobmanager.rpc.port";
pub const REST_PORT: &str = "rest.port";
pub const DEPLOYMENT_TARGET: &str = "execution.target";

/// 挂载到已存在的会话集群，编排器从不创建新集群
pub const REMOTE_TARGET: &str = "remote";

/// 控制面地址，来自集群配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneEndpoint {
    pub cluster_id: i64,
    pub cluster_name: String,
    pub address: String,
    pub rest_port: u16,
}

impl ControlPlaneEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.rest_port)
    }

    pub fn job_overview_url(&self, run_id: &str) -> String {
        format!("{}/#/job/{run_id}/overview", self.base_url())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfiguration {
    pub run_name: String,
    pub address: String,
    pub port: u16,
    pub rest_port: u16,
    pub classpath: Vec<String>,
    pub deployment_target: String,
    /// 额外的引擎参数，不会覆盖上面的固定项
    #[serde(default)]
    pub engine_options: BTreeMap<String, String>,
}

impl LaunchConfiguration {
    /// 展开成引擎识别的扁平键值
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut flat = self.engine_options.clone();
        flat.insert(PIPELINE_NAME.to_string(), self.run_name.clone());
        flat.insert(JOBMANAGER_ADDRESS.to_string(), self.address.clone());
        flat.insert(JOBMANAGER_PORT.to_string(), self.port.to_string());
        flat.insert(REST_PORT.to_string(), self.rest_port.to_string());
        flat.insert(PIPELINE_JARS.to_string(), self.classpath.join(";"));
        flat.insert(
            DEPLOYMENT_TARGET.to_string(),
            self.deployment_target.clone(),
        );
        flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavepointRestore {
    /// 全新提交，不从任何检查点恢复
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarSubmission {
    pub jar_uri: String,
    pub entry_class: String,
    pub spec_file: PathBuf,
    pub program_args: Vec<String>,
    pub savepoint_restore: SavepointRestore,
}

impl JarSubmission {
    pub fn new(
        jar_uri: impl Into<String>,
        entry_class: impl Into<String>,
        spec_file: &Path,
        attributes: &[JobAttribute],
    ) -> Self {
        Self {
            jar_uri: jar_uri.into(),
            entry_class: entry_class.into(),
            spec_file: spec_file.to_path_buf(),
            program_args: build_program_args(spec_file, attributes),
            savepoint_restore: SavepointRestore::None,
        }
    }
}

/// `--config <file>` 后接每个 JOB_ATTR 属性的 `--variable key=value`，保持输入顺序
pub fn build_program_args(spec_file: &Path, attributes: &[JobAttribute]) -> Vec<String> {
    let mut args = vec!["--config".to_string(), spec_file.display().to_string()];
    for attr in attributes.iter().filter(|a| a.kind == JobAttrKind::JobAttr) {
        args.push("--variable".to_string());
        args.push(format!("{}={}", attr.key, attr.value));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_args_keep_order_and_skip_other_kinds() {
        let attrs = vec![
            JobAttribute::new(JobAttrKind::JobAttr, "b", "2"),
            JobAttribute::new(JobAttrKind::EngineProp, "parallelism.default", "4"),
            JobAttribute::new(JobAttrKind::JobAttr, "a", "1"),
            JobAttribute::new(JobAttrKind::JobProp, "job.mode", "BATCH"),
        ];

        let args = build_program_args(Path::new("/tmp/stage/j1-x.json"), &attrs);
        assert_eq!(
            args,
            vec![
                "--config",
                "/tmp/stage/j1-x.json",
                "--variable",
                "b=2",
                "--variable",
                "a=1",
            ]
        );
    }

    #[test]
    fn test_submission_never_restores() {
        let submission = JarSubmission::new(
            "file:///opt/seatunnel/lib/seatunnel-core-flink.jar",
            "org.apache.seatunnel.core.flink.SeatunnelFlink",
            Path::new("/tmp/j.json"),
            &[],
        );
        assert_eq!(submission.savepoint_restore, SavepointRestore::None);
        assert_eq!(submission.program_args, vec!["--config", "/tmp/j.json"]);
    }

    #[test]
    fn test_flat_map_fixed_keys_win() {
        let mut engine_options = BTreeMap::new();
        engine_options.insert(REST_PORT.to_string(), "1".to_string());
        engine_options.insert("parallelism.default".to_string(), "2".to_string());

        let launch = LaunchConfiguration {
            run_name: "j1".to_string(),
            address: "10.0.0.5".to_string(),
            port: 6123,
            rest_port: 8081,
            classpath: vec!["file:///a.jar".to_string(), "file:///b.jar".to_string()],
            deployment_target: REMOTE_TARGET.to_string(),
            engine_options,
        };

        let flat = launch.to_flat_map();
        assert_eq!(flat[REST_PORT], "8081");
        assert_eq!(flat[PIPELINE_JARS], "file:///a.jar;file:///b.jar");
        assert_eq!(flat["parallelism.default"], "2");
        assert_eq!(flat[DEPLOYMENT_TARGET], "remote");
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoint = ControlPlaneEndpoint {
            cluster_id: 1,
            cluster_name: "c1".to_string(),
            address: "10.0.0.5".to_string(),
            rest_port: 8081,
        };
        assert_eq!(endpoint.base_url(), "http://10.0.0.5:8081");
        assert_eq!(
            endpoint.job_overview_url("abc"),
            "http://10.0.0.5:8081/#/job/abc/overview"
        );
    }
}
