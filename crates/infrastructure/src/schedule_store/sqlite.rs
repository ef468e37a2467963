use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataflow_domain::{ScheduleEntry, ScheduleKey, ScheduleStore};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

/// 持久化调度条目，主键为 (分组, 名称)
pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 连接并建表。内存库只能使用单连接，否则每个连接各自一个库
    pub async fn connect(database_url: &str) -> OrchestratorResult<Self> {
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_entries (
                group_name      TEXT NOT NULL,
                name            TEXT NOT NULL,
                cron_expression TEXT NOT NULL,
                payload         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (group_name, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<ScheduleEntry> {
        let payload: String = row.try_get("payload")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(ScheduleEntry {
            key: ScheduleKey {
                group: row.try_get("group_name")?,
                name: row.try_get("name")?,
            },
            cron_expression: row.try_get("cron_expression")?,
            payload: serde_json::from_str(&payload)?,
            created_at,
        })
    }
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn exists(&self, key: &ScheduleKey) -> OrchestratorResult<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM schedule_entries WHERE group_name = $1 AND name = $2",
        )
        .bind(&key.group)
        .bind(&key.name)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count > 0)
    }

    async fn get(&self, key: &ScheduleKey) -> OrchestratorResult<Option<ScheduleEntry>> {
        let row = sqlx::query(
            "SELECT group_name, name, cron_expression, payload, created_at
             FROM schedule_entries WHERE group_name = $1 AND name = $2",
        )
        .bind(&key.group)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, entry), fields(schedule.key = %entry.key))]
    async fn insert(&self, entry: &ScheduleEntry) -> OrchestratorResult<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        let result = sqlx::query(
            r#"
            INSERT INTO schedule_entries (group_name, name, cron_expression, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.key.group)
        .bind(&entry.key.name)
        .bind(&entry.cron_expression)
        .bind(payload)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("调度条目已写入: {}", entry.key);
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                OrchestratorError::validation(format!("调度条目已存在: {}", entry.key)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(schedule.key = %key))]
    async fn delete(&self, key: &ScheduleKey) -> OrchestratorResult<bool> {
        let result = sqlx::query("DELETE FROM schedule_entries WHERE group_name = $1 AND name = $2")
            .bind(&key.group)
            .bind(&key.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, group: &str) -> OrchestratorResult<Vec<ScheduleEntry>> {
        let rows = sqlx::query(
            "SELECT group_name, name, cron_expression, payload, created_at
             FROM schedule_entries WHERE group_name = $1 ORDER BY name",
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}
