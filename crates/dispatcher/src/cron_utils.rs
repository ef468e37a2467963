use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::{debug, warn};

use dataflow_errors::{OrchestratorError, OrchestratorResult};

/// CRON表达式解析和调度工具
///
/// 接受 Quartz 风格的六/七段表达式（秒 分 时 日 月 周 [年]），
/// 其中表示“不指定”的 `?` 按 `*` 处理。
///
/// 表达式里的时分按 `tz` 解释，默认是进程所在的本地时区，
/// `0 0 2 * * ?` 即本地时间每天 02:00。对外的时间参数和返回值都是 UTC。
pub struct CronScheduler<Z: TimeZone = Local> {
    schedule: Schedule,
    tz: Z,
}

impl CronScheduler {
    /// 创建按本地时区计算触发点的调度器
    pub fn new(cron_expr: &str) -> OrchestratorResult<Self> {
        Self::with_timezone(cron_expr, Local)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> OrchestratorResult<()> {
        parse(cron_expr).map(|_| ())
    }
}

impl<Z: TimeZone> CronScheduler<Z> {
    pub fn with_timezone(cron_expr: &str, tz: Z) -> OrchestratorResult<Self> {
        let schedule = parse(cron_expr)?;
        Ok(Self { schedule, tz })
    }

    fn fire_times_after(&self, from: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.schedule
            .after(&from.with_timezone(&self.tz))
            .map(|time| time.with_timezone(&Utc))
    }

    /// 检查给定时间是否应该触发
    ///
    /// `last_fire` 为空时以 `registered_at` 作为起点，注册之前的触发点不会补发。
    pub fn should_trigger(
        &self,
        last_fire: Option<DateTime<Utc>>,
        registered_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let from = last_fire.unwrap_or(registered_at);
        match self.next_execution_time(from) {
            Some(next_time) => {
                let should_trigger = next_time <= now;
                if should_trigger {
                    debug!(
                        "调度应该触发: 起点={}, 触发点={}, 当前时间={}",
                        from.format("%Y-%m-%d %H:%M:%S UTC"),
                        next_time.format("%Y-%m-%d %H:%M:%S UTC"),
                        now.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                should_trigger
            }
            None => {
                warn!(
                    "无法计算下一次执行时间，起点: {}",
                    from.format("%Y-%m-%d %H:%M:%S UTC")
                );
                false
            }
        }
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.fire_times_after(from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.fire_times_after(from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }
}

/// `?` 只在日和周两段出现，语义等同于任意值
pub fn normalize_quartz(cron_expr: &str) -> String {
    cron_expr
        .split_whitespace()
        .map(|field| if field == "?" { "*" } else { field })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse(cron_expr: &str) -> OrchestratorResult<Schedule> {
    let normalized = normalize_quartz(cron_expr);
    if normalized.is_empty() {
        return Err(OrchestratorError::InvalidCron {
            expr: cron_expr.to_string(),
            message: "表达式为空".to_string(),
        });
    }
    Schedule::from_str(&normalized).map_err(|e| OrchestratorError::InvalidCron {
        expr: cron_expr.to_string(),
        message: e.to_string(),
    })
}
