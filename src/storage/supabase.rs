//! Supabase (PostgREST) user records
//!
//! Rows live in one table keyed by `id`. Upserts use PostgREST's
//! `on_conflict=id` with `resolution=merge-duplicates`, so repeated writes for
//! the same user update the existing row and only touch the columns sent.

use super::{validate_key, ProfileStore, StoreError, StoreResult};
use crate::models::{Provider, UserRecord};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "users";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct SupabaseProfileStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseProfileStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> StoreResult<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Unavailable(format!("request timed out after {:?}", REQUEST_TIMEOUT))
            } else {
                StoreError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn upsert_row(&self, row: Value) -> StoreResult<()> {
        let url = format!("{}?on_conflict=id", self.table_url());
        let builder = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!([row]));
        self.send(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn get(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let key = validate_key(user_id)?;
        let url = format!("{}?id=eq.{}&select=*", self.table_url(), key);
        let response = self.send(self.request(reqwest::Method::GET, &url)).await?;

        let rows: Vec<UserRecord> = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, record: &UserRecord) -> StoreResult<()> {
        validate_key(&record.user_id)?;
        let row =
            serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.upsert_row(row).await?;
        log::info!("Upserted user record {} to {}", record.user_id, self.table);
        Ok(())
    }

    async fn store_connection(
        &self,
        user_id: &str,
        provider: Provider,
        data: &Value,
    ) -> StoreResult<()> {
        let key = validate_key(user_id)?;
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), Value::String(key.to_string()));
        row.insert(provider.data_column().to_string(), data.clone());
        row.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        self.upsert_row(Value::Object(row)).await
    }
}
