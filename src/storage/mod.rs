//! Storage for user records and onboarding drafts
//!
//! The backend user record is consumed through the [`ProfileStore`] trait:
//! read "does a profile exist for this user" and upsert "profile +
//! transcript + mode for this user id". Implementations:
//! - `FileProfileStore` - `{data_dir}/users/{user_id}.json`
//! - `SupabaseProfileStore` - PostgREST table keyed by `id`
//! - `MemoryProfileStore` - in-process map, for development and tests
//!
//! Onboarding drafts (conversations not yet tied to a stored profile) live in
//! `{data_dir}/drafts/{session_id}.json`.

pub mod drafts;
pub mod memory;
pub mod supabase;
pub mod users;

pub use drafts::DraftStore;
pub use memory::MemoryProfileStore;
pub use supabase::SupabaseProfileStore;
pub use users::FileProfileStore;

use crate::models::{Provider, UserRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Invalid record key '{0}'")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Failed to (de)serialize record: {0}")]
    Serialization(String),

    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Backend request failed: {0}")]
    Request(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The persisted user record, keyed uniquely by user id
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Fetch the record for `user_id`, if any
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserRecord>>;

    /// Insert or update the record for `record.user_id`
    async fn upsert(&self, record: &UserRecord) -> StoreResult<()>;

    /// Store a provider summary on the user's record
    async fn store_connection(
        &self,
        user_id: &str,
        provider: Provider,
        data: &Value,
    ) -> StoreResult<()>;

    /// Whether a non-empty profile already exists (new-user routing)
    async fn has_profile(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self
            .get(user_id)
            .await?
            .map(|record| record.has_profile())
            .unwrap_or(false))
    }
}

/// Keys become file names and URL filters; keep them to a safe alphabet
pub fn validate_key(key: &str) -> StoreResult<&str> {
    let trimmed = key.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= 128
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(trimmed)
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> StoreResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| StoreError::Io(format!("Failed to create directory {:?}: {}", path, e)))?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &str) -> StoreResult<()> {
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    fs::write(&temp_path, content)
        .map_err(|e| StoreError::Io(format!("Failed to write temp file {:?}: {}", temp_path, e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        StoreError::Io(format!(
            "Failed to rename {:?} to {:?}: {}",
            temp_path, path, e
        ))
    })?;

    Ok(())
}

/// Read a JSON file and deserialize it
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("Failed to read file {:?}: {}", path, e)))?;

    serde_json::from_str(&content).map_err(|e| {
        StoreError::Serialization(format!("Failed to parse JSON from {:?}: {}", path, e))
    })
}

/// Write data as pretty-printed JSON atomically
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| StoreError::Serialization(format!("Failed to serialize to JSON: {}", e)))?;

    atomic_write(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key(" user_1-a ").unwrap(), "user_1-a");
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a b").is_err());
    }

    #[test]
    fn test_atomic_write_and_read_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("data.json");

        write_json(&path, &serde_json::json!({ "ok": true })).unwrap();
        let value: Value = read_json(&path).unwrap();
        assert_eq!(value["ok"], true);
        assert!(!path.with_extension("tmp").exists());
    }
}
