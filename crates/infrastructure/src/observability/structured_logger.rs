//! Structured lifecycle logging
//!
//! Every job lifecycle transition is emitted as one event with a stable
//! `event` field so log pipelines can filter on it.

use tracing::{debug, error, info, warn};

pub struct LifecycleLogger;

impl LifecycleLogger {
    /// Log a submission accepted by the control plane
    pub fn log_job_submitted(job_code: &str, cluster_id: i64, run_id: &str, web_url: &str) {
        info!(
            event = "job_submitted",
            job.code = job_code,
            cluster.id = cluster_id,
            run.id = run_id,
            run.web_url = web_url,
            "Job submitted to cluster"
        );
    }

    pub fn log_submission_failed(job_code: &str, cluster_id: i64, error: &str) {
        error!(
            event = "job_submission_failed",
            job.code = job_code,
            cluster.id = cluster_id,
            job.error = error,
            "Job submission failed"
        );
    }

    /// Log a schedule registration (insert or replace)
    pub fn log_job_scheduled(job_code: &str, schedule_key: &str, cron_expression: &str) {
        info!(
            event = "job_scheduled",
            job.code = job_code,
            schedule.key = schedule_key,
            schedule.cron = cron_expression,
            "Job registered with scheduler"
        );
    }

    pub fn log_job_unscheduled(job_code: &str, schedule_key: &str, removed: bool) {
        info!(
            event = "job_unscheduled",
            job.code = job_code,
            schedule.key = schedule_key,
            schedule.removed = removed,
            "Job schedule removed"
        );
    }

    pub fn log_job_stopped(job_id: i64, job_code: &str) {
        info!(
            event = "job_stopped",
            job.id = job_id,
            job.code = job_code,
            "Job stopped"
        );
    }

    pub fn log_schedule_fired(schedule_key: &str, job_code: &str) {
        info!(
            event = "schedule_fired",
            schedule.key = schedule_key,
            job.code = job_code,
            "Scheduled job triggered"
        );
    }

    /// Log a single instance stop or cancel request
    pub fn log_instance_stopped(run_id: &str, cluster_id: i64, checkpoint_path: Option<&str>) {
        match checkpoint_path {
            Some(path) => info!(
                event = "instance_stopped",
                run.id = run_id,
                cluster.id = cluster_id,
                run.checkpoint_path = path,
                "Run instance stopped with savepoint"
            ),
            None => info!(
                event = "instance_cancelled",
                run.id = run_id,
                cluster.id = cluster_id,
                "Run instance cancelled"
            ),
        }
    }

    pub fn log_instance_stop_failed(run_id: &str, cluster_id: i64, error: &str) {
        warn!(
            event = "instance_stop_failed",
            run.id = run_id,
            cluster.id = cluster_id,
            run.error = error,
            "Failed to stop run instance"
        );
    }

    pub fn log_artifact_cached(file_name: &str, size: u64) {
        debug!(
            event = "artifact_cache_hit",
            artifact.name = file_name,
            artifact.size = size,
            "Artifact already staged, skipping download"
        );
    }

    pub fn log_artifact_downloaded(file_name: &str, size: u64, duration_ms: u64) {
        debug!(
            event = "artifact_downloaded",
            artifact.name = file_name,
            artifact.size = size,
            artifact.duration_ms = duration_ms,
            "Artifact downloaded into staging area"
        );
    }
}
