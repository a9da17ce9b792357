//! File-backed user records
//!
//! Each user is one JSON object at `{data_dir}/users/{user_id}.json`.
//! Record columns and provider columns share the object, so an upsert only
//! replaces the columns it owns.

use super::{read_json, validate_key, write_json, ProfileStore, StoreError, StoreResult};
use crate::models::{Provider, UserRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct FileProfileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("users"),
            write_lock: Mutex::new(()),
        }
    }

    fn record_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        let key = validate_key(user_id)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn read_object(&self, path: &Path) -> StoreResult<Map<String, Value>> {
        if !path.exists() {
            return Ok(Map::new());
        }
        match read_json::<Value>(path)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Serialization(format!(
                "Expected object in {:?}, found {}",
                path, other
            ))),
        }
    }

    async fn merge_columns(&self, user_id: &str, columns: Map<String, Value>) -> StoreResult<()> {
        let path = self.record_path(user_id)?;
        let _guard = self.write_lock.lock().await;

        let mut object = self.read_object(&path)?;
        let existed = !object.is_empty();
        for (key, value) in columns {
            object.insert(key, value);
        }
        object.insert("id".to_string(), Value::String(user_id.trim().to_string()));

        write_json(&path, &Value::Object(object))?;
        log::debug!(
            "{} user record {}",
            if existed { "Updated" } else { "Inserted" },
            user_id
        );
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let path = self.record_path(user_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let record: UserRecord = read_json(&path)?;
        Ok(Some(record))
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
        columns.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        self.merge_columns(user_id, columns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(user_id: &str, name: &str) -> UserRecord {
        UserRecord {
            user_id: user_id.to_string(),
            profile_data: json!({ "name": name }),
            onboarding_conversation: json!([]),
            prompt_mode: Some("standard".to_string()),
            has_completed_onboarding: true,
            updated_at: Some("2026-01-01T00:00:00Z".to_string()),
        }
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let temp = TempDir::new().unwrap();
        let store = FileProfileStore::new(temp.path());
        assert!(store.get("nobody").await.unwrap().is_none());
        assert!(!store.has_profile("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_record_with_latest_data() {
        let temp = TempDir::new().unwrap();
        let store = FileProfileStore::new(temp.path());

        store.upsert(&record("u1", "First")).await.unwrap();
        store.upsert(&record("u1", "Second")).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(temp.path().join("users"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.profile_data["name"], "Second");
        assert!(store.has_profile("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_columns_survive_profile_upsert() {
        let temp = TempDir::new().unwrap();
        let store = FileProfileStore::new(temp.path());

        store
            .store_connection("u2", Provider::Spotify, &json!({ "topArtists": ["Björk"] }))
            .await
            .unwrap();
        store.upsert(&record("u2", "Dee")).await.unwrap();

        let raw: Value = read_json(&temp.path().join("users").join("u2.json")).unwrap();
        assert_eq!(raw["spotify_data"]["topArtists"][0], "Björk");
        assert_eq!(raw["profile_data"]["name"], "Dee");
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let store = FileProfileStore::new(temp.path());
        let result = store.upsert(&record("../escape", "x")).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
