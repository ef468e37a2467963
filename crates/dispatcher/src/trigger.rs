//! 调度触发循环
//!
//! 定期读取内部分组的调度条目，到点的条目解出作业快照后调用 `submit`。
//! 只在二进制的 `serve` 模式中运行，编排核心本身没有后台循环。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dataflow_domain::{ScheduleKey, SchedulePayload, ScheduleStore, INTERNAL_GROUP};
use dataflow_errors::OrchestratorResult;
use dataflow_infrastructure::LifecycleLogger;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::cron_utils::CronScheduler;
use crate::lifecycle::JobLifecycleService;

pub struct ScheduleTrigger {
    store: Arc<dyn ScheduleStore>,
    service: Arc<JobLifecycleService>,
    poll_interval: Duration,
    last_fired: Mutex<HashMap<ScheduleKey, DateTime<Utc>>>,
}

impl ScheduleTrigger {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        service: Arc<JobLifecycleService>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            service,
            poll_interval,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// 检查一轮调度条目，返回本轮提交成功的调度键
    ///
    /// 首次检查某个条目时从它的注册时间算起，因此进程重启期间错过的触发点
    /// 最多补发一次。
    pub async fn tick(&self, now: DateTime<Utc>) -> OrchestratorResult<Vec<ScheduleKey>> {
        let entries = self.store.list(INTERNAL_GROUP).await?;
        let mut last_fired = self.last_fired.lock().await;
        last_fired.retain(|key, _| entries.iter().any(|entry| &entry.key == key));

        let mut fired = Vec::new();
        for entry in entries {
            let scheduler = match CronScheduler::new(&entry.cron_expression) {
                Ok(scheduler) => scheduler,
                Err(err) => {
                    warn!("跳过无效的调度条目 {}: {}", entry.key, err);
                    continue;
                }
            };
            let last = last_fired.get(&entry.key).copied();
            if !scheduler.should_trigger(last, entry.created_at, now) {
                continue;
            }
            last_fired.insert(entry.key.clone(), now);

            let payload: SchedulePayload = match serde_json::from_value(entry.payload.clone()) {
                Ok(payload) => payload,
                Err(err) => {
                    error!("调度条目 {} 的负载无法解析: {}", entry.key, err);
                    continue;
                }
            };

            LifecycleLogger::log_schedule_fired(&entry.key.to_string(), &payload.job.code);
            match self.service.submit(&payload.job).await {
                Ok(instance) => {
                    debug!("调度 {} 提交成功，运行实例 {}", entry.key, instance.run_id);
                    fired.push(entry.key.clone());
                }
                Err(err) => error!("调度 {} 提交失败: {}", entry.key, err),
            }
        }
        Ok(fired)
    }

    /// 按轮询间隔运行，直到收到关闭信号
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("调度触发循环启动，轮询间隔 {:?}", self.poll_interval);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        error!("读取调度条目失败: {}", err);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，调度触发循环退出");
                    break;
                }
            }
        }
    }
}
