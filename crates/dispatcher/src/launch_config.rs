//! 启动配置构建与作业描述生成

use std::collections::BTreeMap;
use std::path::PathBuf;

use dataflow_domain::{
    ClusterTarget, ControlPlaneEndpoint, JobAttrKind, JobDefinition, JobSpecGenerator,
    LaunchConfiguration, StagingArea, StepType, JOBMANAGER_ADDRESS, JOBMANAGER_PORT,
    REMOTE_TARGET, REST_PORT,
};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use serde_json::{Map, Value};
use tracing::debug;

use crate::stager::ArtifactSet;

fn required<'a>(cluster: &'a ClusterTarget, key: &str) -> OrchestratorResult<&'a str> {
    cluster
        .config
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            OrchestratorError::config_error(format!("集群 {} 缺少配置项 {key}", cluster.name))
        })
}

fn port(cluster: &ClusterTarget, key: &str) -> OrchestratorResult<u16> {
    let raw = required(cluster, key)?;
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(OrchestratorError::config_error(format!(
            "集群 {} 的配置项 {key} 不是有效端口: {raw}",
            cluster.name
        ))),
    }
}

/// 从集群配置解析控制面地址
pub fn control_plane_endpoint(cluster: &ClusterTarget) -> OrchestratorResult<ControlPlaneEndpoint> {
    Ok(ControlPlaneEndpoint {
        cluster_id: cluster.id,
        cluster_name: cluster.name.clone(),
        address: required(cluster, JOBMANAGER_ADDRESS)?.to_string(),
        rest_port: port(cluster, REST_PORT)?,
    })
}

pub struct LaunchConfigBuilder;

impl LaunchConfigBuilder {
    /// 作业编码作为运行名，集群地址和端口来自集群配置，始终挂载到已有集群
    pub fn build(
        job: &JobDefinition,
        cluster: &ClusterTarget,
        artifacts: &ArtifactSet,
    ) -> OrchestratorResult<LaunchConfiguration> {
        let engine_options: BTreeMap<String, String> = job
            .attributes_of(JobAttrKind::EngineProp)
            .map(|attr| (attr.key.clone(), attr.value.clone()))
            .collect();

        let launch = LaunchConfiguration {
            run_name: job.code.clone(),
            address: required(cluster, JOBMANAGER_ADDRESS)?.to_string(),
            port: port(cluster, JOBMANAGER_PORT)?,
            rest_port: port(cluster, REST_PORT)?,
            classpath: artifacts.uris(),
            deployment_target: REMOTE_TARGET.to_string(),
            engine_options,
        };
        debug!(
            "作业 {} 的启动配置: {}:{} (rest {})",
            job.code, launch.address, launch.port, launch.rest_port
        );
        Ok(launch)
    }
}

/// 把作业描述写入暂存目录，文件名为 `<作业编码>-<uuid>.json`
pub async fn write_job_spec(
    area: &StagingArea,
    job_code: &str,
    spec: &Value,
) -> OrchestratorResult<PathBuf> {
    let path = area.file(&format!("{job_code}-{}.json", uuid::Uuid::new_v4()))?;
    let rendered = serde_json::to_vec_pretty(spec)?;
    tokio::fs::write(&path, rendered).await?;
    Ok(path)
}

/// 按步骤类型生成 `env`/`source`/`transform`/`sink` 四段的作业描述
///
/// 上游步骤的编码作为表名串联：产出数据的步骤写 `result_table_name`，
/// 消费数据的步骤写 `source_table_name`。步骤自带的同名属性优先。
#[derive(Debug, Clone, Copy, Default)]
pub struct StepListSpecGenerator;

impl JobSpecGenerator for StepListSpecGenerator {
    fn generate(&self, job: &JobDefinition) -> OrchestratorResult<Value> {
        for link in &job.links {
            for code in [&link.from_step, &link.to_step] {
                if !job.steps.iter().any(|step| &step.code == code) {
                    return Err(OrchestratorError::validation(format!(
                        "作业 {} 的连线引用了不存在的步骤 {code}",
                        job.code
                    )));
                }
            }
        }

        let env: Map<String, Value> = job
            .attributes_of(JobAttrKind::JobProp)
            .map(|attr| (attr.key.clone(), Value::String(attr.value.clone())))
            .collect();

        let mut sections: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for step in &job.steps {
            let mut plugin = Map::new();
            plugin.insert(
                "plugin_name".to_string(),
                Value::String(step.plugin_name.clone()),
            );
            for (key, value) in &step.attrs {
                plugin.insert(key.clone(), value.clone());
            }

            if step.step_type != StepType::Sink {
                plugin
                    .entry("result_table_name")
                    .or_insert_with(|| Value::String(step.code.clone()));
            }
            let upstream: Vec<Value> = job
                .links
                .iter()
                .filter(|link| link.to_step == step.code)
                .map(|link| Value::String(link.from_step.clone()))
                .collect();
            if step.step_type != StepType::Source && !upstream.is_empty() {
                let source_table = if upstream.len() == 1 {
                    upstream[0].clone()
                } else {
                    Value::Array(upstream)
                };
                plugin
                    .entry("source_table_name")
                    .or_insert(source_table);
            }

            let section = match step.step_type {
                StepType::Source => "source",
                StepType::Transform => "transform",
                StepType::Sink => "sink",
            };
            sections.entry(section).or_default().push(Value::Object(plugin));
        }

        let mut spec = Map::new();
        spec.insert("env".to_string(), Value::Object(env));
        for section in ["source", "transform", "sink"] {
            spec.insert(
                section.to_string(),
                Value::Array(sections.remove(section).unwrap_or_default()),
            );
        }
        Ok(Value::Object(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_domain::{
        JobAttribute, JobKind, JobLink, JobRuntimeState, JobStep, DEPLOYMENT_TARGET, PIPELINE_JARS,
        PIPELINE_NAME,
    };
    use std::collections::HashMap;

    fn cluster(entries: &[(&str, &str)]) -> ClusterTarget {
        ClusterTarget {
            id: 1,
            name: "c1".to_string(),
            config: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn full_cluster() -> ClusterTarget {
        cluster(&[
            (JOBMANAGER_ADDRESS, "10.0.0.5"),
            (JOBMANAGER_PORT, "6123"),
            (REST_PORT, "8081"),
        ])
    }

    fn step(code: &str, step_type: StepType, plugin: &str) -> JobStep {
        JobStep {
            code: code.to_string(),
            title: code.to_string(),
            step_type,
            plugin_name: plugin.to_string(),
            attrs: Map::new(),
        }
    }

    fn job() -> JobDefinition {
        JobDefinition {
            id: 1,
            code: "j1".to_string(),
            project_id: 1,
            kind: JobKind::Batch,
            cron_expression: None,
            attributes: vec![
                JobAttribute::new(JobAttrKind::EngineProp, "parallelism.default", "4"),
                JobAttribute::new(JobAttrKind::EngineProp, REST_PORT, "9999"),
                JobAttribute::new(JobAttrKind::JobProp, "job.mode", "BATCH"),
                JobAttribute::new(JobAttrKind::JobAttr, "dt", "2024-01-01"),
            ],
            steps: vec![],
            links: vec![],
            cluster_id: Some(1),
            runtime_state: JobRuntimeState::Defined,
        }
    }

    #[test]
    fn test_build_launch_configuration() {
        let mut artifacts = ArtifactSet::new("file:///opt/seatunnel/lib/core.jar".to_string());
        artifacts.insert("file:///tmp/s/1/lib.jar".to_string());

        let launch = LaunchConfigBuilder::build(&job(), &full_cluster(), &artifacts).unwrap();
        assert_eq!(launch.run_name, "j1");
        assert_eq!(launch.address, "10.0.0.5");
        assert_eq!(launch.port, 6123);
        assert_eq!(launch.rest_port, 8081);
        assert_eq!(launch.deployment_target, "remote");

        let flat = launch.to_flat_map();
        assert_eq!(flat[PIPELINE_NAME], "j1");
        assert_eq!(
            flat[PIPELINE_JARS],
            "file:///opt/seatunnel/lib/core.jar;file:///tmp/s/1/lib.jar"
        );
        assert_eq!(flat[DEPLOYMENT_TARGET], "remote");
        assert_eq!(flat["parallelism.default"], "4");
        assert_eq!(flat[REST_PORT], "8081");
        assert!(!flat.contains_key("job.mode"));
    }

    #[test]
    fn test_missing_or_invalid_cluster_keys() {
        let artifacts = ArtifactSet::new("file:///core.jar".to_string());

        let missing = cluster(&[(JOBMANAGER_ADDRESS, "10.0.0.5"), (REST_PORT, "8081")]);
        assert!(matches!(
            LaunchConfigBuilder::build(&job(), &missing, &artifacts),
            Err(OrchestratorError::Configuration(_))
        ));

        let bad_port = cluster(&[
            (JOBMANAGER_ADDRESS, "10.0.0.5"),
            (JOBMANAGER_PORT, "0"),
            (REST_PORT, "8081"),
        ]);
        assert!(matches!(
            LaunchConfigBuilder::build(&job(), &bad_port, &artifacts),
            Err(OrchestratorError::Configuration(_))
        ));

        let not_a_number = cluster(&[
            (JOBMANAGER_ADDRESS, "10.0.0.5"),
            (JOBMANAGER_PORT, "6123"),
            (REST_PORT, "http"),
        ]);
        assert!(control_plane_endpoint(&not_a_number).is_err());
    }

    #[test]
    fn test_control_plane_endpoint() {
        let endpoint = control_plane_endpoint(&full_cluster()).unwrap();
        assert_eq!(endpoint.cluster_name, "c1");
        assert_eq!(endpoint.base_url(), "http://10.0.0.5:8081");
    }

    #[test]
    fn test_step_list_spec() {
        let mut job = job();
        let mut sink = step("s3", StepType::Sink, "Console");
        sink.attrs
            .insert("limit".to_string(), Value::from(10));
        job.steps = vec![
            step("s1", StepType::Source, "Jdbc"),
            step("s2", StepType::Transform, "Sql"),
            sink,
        ];
        job.links = vec![
            JobLink {
                from_step: "s1".to_string(),
                to_step: "s2".to_string(),
            },
            JobLink {
                from_step: "s2".to_string(),
                to_step: "s3".to_string(),
            },
        ];

        let spec = StepListSpecGenerator.generate(&job).unwrap();
        assert_eq!(spec["env"]["job.mode"], "BATCH");
        assert!(spec["env"].get("dt").is_none());
        assert_eq!(spec["source"][0]["plugin_name"], "Jdbc");
        assert_eq!(spec["source"][0]["result_table_name"], "s1");
        assert_eq!(spec["transform"][0]["source_table_name"], "s1");
        assert_eq!(spec["transform"][0]["result_table_name"], "s2");
        assert_eq!(spec["sink"][0]["source_table_name"], "s2");
        assert_eq!(spec["sink"][0]["limit"], 10);
        assert!(spec["sink"][0].get("result_table_name").is_none());
    }

    #[test]
    fn test_spec_rejects_dangling_link() {
        let mut job = job();
        job.steps = vec![step("s1", StepType::Source, "Jdbc")];
        job.links = vec![JobLink {
            from_step: "s1".to_string(),
            to_step: "missing".to_string(),
        }];
        assert!(matches!(
            StepListSpecGenerator.generate(&job),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_write_job_spec_names_file_after_job() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path().to_path_buf(), dir.path().to_path_buf());

        let path = write_job_spec(&area, "j1", &serde_json::json!({ "env": {} }))
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("j1-"));
        assert!(name.ends_with(".json"));

        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, serde_json::json!({ "env": {} }));
    }

    #[tokio::test]
    async fn test_write_job_spec_rejects_code_with_separator() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("1");
        std::fs::create_dir_all(&staging).unwrap();
        let area = StagingArea::new(dir.path().to_path_buf(), staging);

        for code in ["../escape", "/tmp/escape", "a/b"] {
            let result = write_job_spec(&area, code, &serde_json::json!({})).await;
            assert!(matches!(result, Err(OrchestratorError::Validation(_))));
        }
        assert!(!dir.path().join("escape").exists());
    }
}
