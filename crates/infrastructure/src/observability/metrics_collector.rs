//! Lifecycle metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{counter, histogram, Counter, Histogram};

#[derive(Clone)]
pub struct LifecycleMetrics {
    submissions_total: Counter,
    submission_failures_total: Counter,
    submission_duration: Histogram,
    schedules_total: Counter,
    unschedules_total: Counter,
    instances_stopped_total: Counter,
    instance_stop_failures_total: Counter,
    artifact_cache_hits_total: Counter,
    artifact_downloads_total: Counter,
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self {
            submissions_total: counter!("dataflow_submissions_total"),
            submission_failures_total: counter!("dataflow_submission_failures_total"),
            submission_duration: histogram!("dataflow_submission_duration_seconds"),
            schedules_total: counter!("dataflow_schedules_total"),
            unschedules_total: counter!("dataflow_unschedules_total"),
            instances_stopped_total: counter!("dataflow_instances_stopped_total"),
            instance_stop_failures_total: counter!("dataflow_instance_stop_failures_total"),
            artifact_cache_hits_total: counter!("dataflow_artifact_cache_hits_total"),
            artifact_downloads_total: counter!("dataflow_artifact_downloads_total"),
        }
    }

    pub fn record_submission(&self, duration_seconds: f64) {
        self.submissions_total.increment(1);
        self.submission_duration.record(duration_seconds);
    }

    pub fn record_submission_failure(&self) {
        self.submission_failures_total.increment(1);
    }

    pub fn record_schedule(&self) {
        self.schedules_total.increment(1);
    }

    pub fn record_unschedule(&self) {
        self.unschedules_total.increment(1);
    }

    pub fn record_instance_stopped(&self) {
        self.instances_stopped_total.increment(1);
    }

    pub fn record_instance_stop_failure(&self) {
        self.instance_stop_failures_total.increment(1);
    }

    pub fn record_artifact(&self, cache_hit: bool) {
        if cache_hit {
            self.artifact_cache_hits_total.increment(1);
        } else {
            self.artifact_downloads_total.increment(1);
        }
    }
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}
