mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::Harness;
use dataflow_dispatcher::ScheduleTrigger;
use dataflow_domain::{
    InstanceState, JobRuntimeState, ScheduleEntry, ScheduleKey, ScheduleStore, INTERNAL_GROUP,
};
use dataflow_testing_utils::*;
use serde_json::json;

fn hourly_job() -> dataflow_domain::JobDefinition {
    JobBuilder::new()
        .with_id(1)
        .with_code("j1")
        .batch()
        .with_cron("0 0 * * * ?")
        .with_cluster(1)
        .build()
}

#[tokio::test]
async fn test_tick_submits_due_entries_once() {
    let job = hourly_job();
    let h = Harness::builder().job(job.clone()).build();
    let key = h.service.schedule(&job).await.unwrap();

    let trigger = ScheduleTrigger::new(h.store.clone(), h.service.clone(), Duration::from_secs(1));
    let later = Utc::now() + chrono::Duration::hours(2);

    let fired = trigger.tick(later).await.unwrap();
    assert_eq!(fired, vec![key]);
    assert_eq!(h.engine.submissions().len(), 1);
    assert_eq!(h.runs.all()[0].state, InstanceState::Initializing);
    assert_eq!(h.job(1).runtime_state, JobRuntimeState::Running);

    // 同一时刻再次检查不会重复触发
    let again = trigger.tick(later).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.engine.submissions().len(), 1);
}

#[tokio::test]
async fn test_tick_waits_for_next_fire_time() {
    let job = hourly_job();
    let h = Harness::builder().job(job.clone()).build();
    h.service.schedule(&job).await.unwrap();

    let trigger = ScheduleTrigger::new(h.store.clone(), h.service.clone(), Duration::from_secs(1));
    let entry = h.store.list(INTERNAL_GROUP).await.unwrap().remove(0);

    let fired = trigger.tick(entry.created_at).await.unwrap();
    assert!(fired.is_empty());
    assert!(h.engine.submissions().is_empty());
}

#[tokio::test]
async fn test_tick_skips_broken_entries() {
    let h = Harness::builder().job(hourly_job()).build();
    let registered = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();

    h.store
        .insert(&ScheduleEntry {
            key: ScheduleKey::for_job("p1", "broken_payload"),
            cron_expression: "0 0 * * * ?".to_string(),
            payload: json!({"job": "not a job"}),
            created_at: registered,
        })
        .await
        .unwrap();
    h.store
        .insert(&ScheduleEntry {
            key: ScheduleKey::for_job("p1", "broken_cron"),
            cron_expression: "whenever".to_string(),
            payload: json!({}),
            created_at: registered,
        })
        .await
        .unwrap();

    let trigger = ScheduleTrigger::new(h.store.clone(), h.service.clone(), Duration::from_secs(1));
    let fired = trigger
        .tick(Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap())
        .await
        .unwrap();

    assert!(fired.is_empty());
    assert!(h.engine.submissions().is_empty());
    assert_eq!(h.store.len().await, 2);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let h = Harness::builder().build();
    let trigger = ScheduleTrigger::new(h.store.clone(), h.service.clone(), Duration::from_millis(10));
    let (tx, rx) = tokio::sync::broadcast::channel(1);

    let handle = tokio::spawn(trigger.run(rx));
    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("trigger loop exits")
        .unwrap();
}
