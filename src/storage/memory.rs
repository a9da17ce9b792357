// In-process user records, for local development and tests

use super::{validate_key, ProfileStore, StoreError, StoreResult};
use crate::models::{Provider, UserRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryProfileStore {
    rows: Mutex<HashMap<String, Map<String, Value>>>,
    writes: AtomicU32,
    failures_remaining: AtomicU32,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with `StoreError::Unavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of write attempts seen, including failed ones
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Raw stored row, including provider columns
    pub async fn raw(&self, user_id: &str) -> Option<Value> {
        self.rows
            .lock()
            .await
            .get(user_id)
            .map(|row| Value::Object(row.clone()))
    }

    fn take_failure(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    async fn merge_columns(&self, user_id: &str, columns: Map<String, Value>) -> StoreResult<()> {
        let key = validate_key(user_id)?.to_string();
        self.take_failure()?;

        let mut rows = self.rows.lock().await;
        let row = rows.entry(key.clone()).or_default();
        row.extend(columns);
        row.insert("id".to_string(), Value::String(key));
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let key = validate_key(user_id)?;
        let rows = self.rows.lock().await;
        match rows.get(key) {
            Some(row) => serde_json::from_value(Value::Object(row.clone()))
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &UserRecord) -> StoreResult<()> {
        let columns = match serde_json::to_value(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
        {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.merge_columns(&record.user_id, columns).await
    }

    async fn store_connection(
        &self,
        user_id: &str,
        provider: Provider,
        data: &Value,
    ) -> StoreResult<()> {
        let mut columns = Map::new();
        columns.insert(provider.data_column().to_string(), data.clone());
        self.merge_columns(user_id, columns).await
    }
}
