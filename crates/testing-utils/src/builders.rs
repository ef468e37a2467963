//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults matching a small single-cluster
//! deployment: project `p1`, cluster `c1` at `10.0.0.5`.

use std::collections::HashMap;

use chrono::Utc;
use dataflow_domain::{
    ClusterTarget, InstanceState, JobAttrKind, JobAttribute, JobDefinition, JobKind, JobLink,
    JobRuntimeState, JobStep, Project, ResourceArtifact, RunInstance, StepType,
    JOBMANAGER_ADDRESS, JOBMANAGER_PORT, REST_PORT,
};

/// Builder for creating test JobDefinition entities
pub struct JobBuilder {
    job: JobDefinition,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: JobDefinition {
                id: 1,
                code: "test_job".to_string(),
                project_id: 1,
                kind: JobKind::Stream,
                cron_expression: None,
                attributes: vec![],
                steps: vec![],
                links: vec![],
                cluster_id: None,
                runtime_state: JobRuntimeState::Defined,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.job.code = code.to_string();
        self
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.job.project_id = project_id;
        self
    }

    pub fn batch(mut self) -> Self {
        self.job.kind = JobKind::Batch;
        self
    }

    pub fn stream(mut self) -> Self {
        self.job.kind = JobKind::Stream;
        self
    }

    pub fn with_cron(mut self, cron: &str) -> Self {
        self.job.cron_expression = Some(cron.to_string());
        self
    }

    pub fn with_attribute(mut self, kind: JobAttrKind, key: &str, value: &str) -> Self {
        self.job.attributes.push(JobAttribute::new(kind, key, value));
        self
    }

    pub fn with_step(mut self, code: &str, step_type: StepType, plugin_name: &str) -> Self {
        self.job.steps.push(JobStep {
            code: code.to_string(),
            title: code.to_string(),
            step_type,
            plugin_name: plugin_name.to_string(),
            attrs: serde_json::Map::new(),
        });
        self
    }

    pub fn with_link(mut self, from_step: &str, to_step: &str) -> Self {
        self.job.links.push(JobLink {
            from_step: from_step.to_string(),
            to_step: to_step.to_string(),
        });
        self
    }

    pub fn with_cluster(mut self, cluster_id: i64) -> Self {
        self.job.cluster_id = Some(cluster_id);
        self
    }

    pub fn with_state(mut self, state: JobRuntimeState) -> Self {
        self.job.runtime_state = state;
        self
    }

    pub fn build(self) -> JobDefinition {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test ClusterTarget entities
pub struct ClusterBuilder {
    cluster: ClusterTarget,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        let mut config = HashMap::new();
        config.insert(JOBMANAGER_ADDRESS.to_string(), "10.0.0.5".to_string());
        config.insert(JOBMANAGER_PORT.to_string(), "6123".to_string());
        config.insert(REST_PORT.to_string(), "8081".to_string());
        Self {
            cluster: ClusterTarget {
                id: 1,
                name: "c1".to_string(),
                config,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.cluster.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.cluster.name = name.to_string();
        self
    }

    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.cluster.config.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_config(mut self, key: &str) -> Self {
        self.cluster.config.remove(key);
        self
    }

    pub fn build(self) -> ClusterTarget {
        self.cluster
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test RunInstance entities
pub struct RunInstanceBuilder {
    instance: RunInstance,
}

impl RunInstanceBuilder {
    pub fn new(run_id: &str) -> Self {
        Self {
            instance: RunInstance {
                run_id: run_id.to_string(),
                job_id: 1,
                project_id: 1,
                job_code: "test_job".to_string(),
                cluster_id: 1,
                web_url: String::new(),
                state: InstanceState::Running,
                started_at: Utc::now(),
            },
        }
    }

    pub fn for_job(mut self, job: &JobDefinition) -> Self {
        self.instance.job_id = job.id;
        self.instance.project_id = job.project_id;
        self.instance.job_code = job.code.clone();
        self
    }

    pub fn on_cluster(mut self, cluster_id: i64) -> Self {
        self.instance.cluster_id = cluster_id;
        self
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.instance.state = state;
        self
    }

    pub fn build(self) -> RunInstance {
        self.instance
    }
}

pub fn project(id: i64, code: &str) -> Project {
    Project {
        id,
        code: code.to_string(),
        name: format!("project {code}"),
    }
}

pub fn resource(id: i64, file_name: &str, size: u64) -> ResourceArtifact {
    ResourceArtifact {
        id,
        file_name: file_name.to_string(),
        remote_path: "resources".to_string(),
        size,
    }
}
