//! 调度注册
//!
//! 同一个调度键最多只有一个有效条目：更新采用先删后插，而不是合并。

use std::sync::Arc;

use chrono::Utc;
use dataflow_domain::{ScheduleEntry, ScheduleKey, ScheduleStore};
use dataflow_errors::OrchestratorResult;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::cron_utils::CronScheduler;

pub struct ScheduleRegistrar {
    store: Arc<dyn ScheduleStore>,
    // 让先删后插对并发调用者表现为一次原子替换
    guard: Mutex<()>,
}

impl ScheduleRegistrar {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    #[instrument(skip(self, payload), fields(schedule.key = %key))]
    pub async fn upsert(
        &self,
        key: &ScheduleKey,
        cron_expression: &str,
        payload: serde_json::Value,
    ) -> OrchestratorResult<ScheduleEntry> {
        CronScheduler::validate_cron_expression(cron_expression)?;

        let entry = ScheduleEntry {
            key: key.clone(),
            cron_expression: cron_expression.trim().to_string(),
            payload,
            created_at: Utc::now(),
        };

        let _lock = self.guard.lock().await;
        if self.store.exists(key).await? {
            debug!("替换已有调度条目 {}", key);
            self.store.delete(key).await?;
        }
        self.store.insert(&entry).await?;
        Ok(entry)
    }

    /// 条目不存在时什么也不做，返回是否删除了条目
    #[instrument(skip(self), fields(schedule.key = %key))]
    pub async fn remove(&self, key: &ScheduleKey) -> OrchestratorResult<bool> {
        let _lock = self.guard.lock().await;
        if !self.store.exists(key).await? {
            return Ok(false);
        }
        self.store.delete(key).await
    }
}
