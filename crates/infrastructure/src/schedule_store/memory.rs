use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dataflow_domain::{ScheduleEntry, ScheduleKey, ScheduleStore};
use dataflow_errors::OrchestratorResult;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleStore {
    entries: Arc<RwLock<BTreeMap<ScheduleKey, ScheduleEntry>>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn exists(&self, key: &ScheduleKey) -> OrchestratorResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn get(&self, key: &ScheduleKey) -> OrchestratorResult<Option<ScheduleEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn insert(&self, entry: &ScheduleEntry) -> OrchestratorResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &ScheduleKey) -> OrchestratorResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn list(&self, group: &str) -> OrchestratorResult<Vec<ScheduleEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.key.group == group)
            .cloned()
            .collect())
    }
}
