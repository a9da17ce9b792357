//! OAuth data connections (Spotify, YouTube)
//!
//! Each connect flow is linear: exchange the authorization code, read the
//! provider endpoints in parallel, shape a summary, optionally add an LLM
//! insight, then store the summary on the user's record with retries. Any
//! failed step fails the flow with a typed reason; nothing is partially kept.

pub mod spotify;
pub mod token;
pub mod youtube;

pub use spotify::{SpotifyApi, SPOTIFY_API_URL};
pub use token::{OAuthTokenExchanger, TokenExchange};
pub use youtube::{YouTubeApi, YOUTUBE_API_URL};

use crate::events::{
    emit_event, ConnectionStoredPayload, EventSink, NoticePayload, EVENT_CONNECTION_STORED,
    EVENT_NOTICE_CONNECTION_FAILED,
};
use crate::llm::{CallKind, CallTimeouts, ChatCompletion};
use crate::models::{ConversationTurn, Provider, SessionContext, SpotifySummary, YouTubeSummary};
use crate::storage::ProfileStore;
use crate::templates::builtin::CONNECTION_INSIGHT;
use crate::templates::render_builtin;
use crate::utils::{retry_async, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0} connection is not configured")]
    NotConfigured(String),

    #[error("Token exchange failed: {0}")]
    Token(String),

    #[error("Failed to read {provider} data: {message}")]
    Fetch { provider: String, message: String },

    #[error("Failed to store connection data: {0}")]
    Storage(String),

    #[error("Insight generation failed: {0}")]
    Insight(String),
}

impl ConnectionError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::Unauthenticated => "unauthenticated",
            ConnectionError::NotConfigured(_) => "not_configured",
            ConnectionError::Token(_) => "token",
            ConnectionError::Fetch { .. } => "fetch",
            ConnectionError::Storage(_) => "storage",
            ConnectionError::Insight(_) => "insight",
        }
    }

    /// Message shown to the user for this kind of failure
    pub fn user_message(&self) -> &'static str {
        match self {
            ConnectionError::Unauthenticated => "Please sign in again to connect your account.",
            ConnectionError::NotConfigured(_) => "This connection isn't available right now.",
            ConnectionError::Token(_) => {
                "We couldn't verify your account authorization. Please try connecting again."
            }
            ConnectionError::Fetch { .. } => {
                "We couldn't read your data from the provider. Please try again later."
            }
            ConnectionError::Storage(_) => {
                "Your account connected, but we couldn't save the data. Please try again."
            }
            ConnectionError::Insight(_) => {
                "We got your data but couldn't generate insights. Please try again."
            }
        }
    }
}

/// OAuth client registration for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

impl OAuthClientConfig {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.redirect_uri.is_empty()
    }
}

/// Authenticated GET returning JSON; errors are plain messages
#[async_trait]
pub trait JsonFetch: Send + Sync {
    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, String>;
}

pub struct HttpJsonFetch {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpJsonFetch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl JsonFetch for HttpJsonFetch {
    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {} from {}: {}", status.as_u16(), url, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid JSON from {}: {}", url, e))
    }
}

/// `items[].name` of a provider list response
pub(crate) fn item_names(value: &Value) -> Vec<String> {
    value
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Ask the LLM for a short, warm read of a provider summary
pub async fn generate_insight(
    llm: &dyn ChatCompletion,
    provider: Provider,
    summary: &Value,
    timeouts: &CallTimeouts,
) -> Result<String, ConnectionError> {
    let summary_json =
        serde_json::to_string_pretty(summary).map_err(|e| ConnectionError::Insight(e.to_string()))?;
    let prompt = render_builtin(
        CONNECTION_INSIGHT,
        &json!({ "provider": provider.as_str(), "summary_json": summary_json }),
    )
    .map_err(ConnectionError::Insight)?;

    let reply = llm
        .complete(
            &[ConversationTurn::user(prompt)],
            &timeouts.options(CallKind::Insight),
        )
        .await
        .map_err(|e| ConnectionError::Insight(e.to_string()))?;

    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ConnectionError::Insight("empty insight".to_string()));
    }
    Ok(reply.to_string())
}

/// Runs the connect flows against injected collaborators
pub struct ConnectionService {
    exchanger: Arc<dyn TokenExchange>,
    fetch: Arc<dyn JsonFetch>,
    store: Arc<dyn ProfileStore>,
    events: Arc<dyn EventSink>,
    llm: Option<Arc<dyn ChatCompletion>>,
    timeouts: CallTimeouts,
    retry: RetryPolicy,
    spotify_api_url: String,
    youtube_api_url: String,
}

impl ConnectionService {
    pub fn new(
        exchanger: Arc<dyn TokenExchange>,
        fetch: Arc<dyn JsonFetch>,
        store: Arc<dyn ProfileStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            exchanger,
            fetch,
            store,
            events,
            llm: None,
            timeouts: CallTimeouts::default(),
            retry: RetryPolicy::default(),
            spotify_api_url: SPOTIFY_API_URL.to_string(),
            youtube_api_url: YOUTUBE_API_URL.to_string(),
        }
    }

    /// Enable insight generation
    pub fn with_insights(mut self, llm: Arc<dyn ChatCompletion>, timeouts: CallTimeouts) -> Self {
        self.llm = Some(llm);
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_api_urls(mut self, spotify: impl Into<String>, youtube: impl Into<String>) -> Self {
        self.spotify_api_url = spotify.into();
        self.youtube_api_url = youtube.into();
        self
    }

    pub async fn connect_spotify(
        &self,
        ctx: &SessionContext,
        code: &str,
    ) -> Result<SpotifySummary, ConnectionError> {
        let result = self.run_spotify(ctx, code).await;
        self.report(ctx, Provider::Spotify, &result);
        result
    }

    pub async fn connect_youtube(
        &self,
        ctx: &SessionContext,
        code: &str,
    ) -> Result<YouTubeSummary, ConnectionError> {
        let result = self.run_youtube(ctx, code).await;
        self.report(ctx, Provider::Youtube, &result);
        result
    }

    async fn run_spotify(
        &self,
        ctx: &SessionContext,
        code: &str,
    ) -> Result<SpotifySummary, ConnectionError> {
        let user_id = ctx.user_id().ok_or(ConnectionError::Unauthenticated)?;
        let tokens = self.exchanger.exchange(Provider::Spotify, code).await?;

        let api = SpotifyApi::new(self.fetch.as_ref(), &self.spotify_api_url);
        let mut summary = api.fetch_summary(&tokens.access_token).await?;
        summary.insight = self.insight(Provider::Spotify, &summary).await?;

        self.store_summary(user_id, Provider::Spotify, &summary).await?;
        Ok(summary)
    }

    async fn run_youtube(
        &self,
        ctx: &SessionContext,
        code: &str,
    ) -> Result<YouTubeSummary, ConnectionError> {
        let user_id = ctx.user_id().ok_or(ConnectionError::Unauthenticated)?;
        let tokens = self.exchanger.exchange(Provider::Youtube, code).await?;

        let api = YouTubeApi::new(self.fetch.as_ref(), &self.youtube_api_url);
        let mut summary = api.fetch_summary(&tokens.access_token).await?;
        summary.insight = self.insight(Provider::Youtube, &summary).await?;

        self.store_summary(user_id, Provider::Youtube, &summary).await?;
        Ok(summary)
    }

    async fn insight<S: Serialize>(
        &self,
        provider: Provider,
        summary: &S,
    ) -> Result<Option<String>, ConnectionError> {
        let Some(llm) = &self.llm else {
            return Ok(None);
        };
        let value =
            serde_json::to_value(summary).map_err(|e| ConnectionError::Insight(e.to_string()))?;
        generate_insight(llm.as_ref(), provider, &value, &self.timeouts)
            .await
            .map(Some)
    }

    async fn store_summary<S: Serialize>(
        &self,
        user_id: &str,
        provider: Provider,
        summary: &S,
    ) -> Result<(), ConnectionError> {
        let value =
            serde_json::to_value(summary).map_err(|e| ConnectionError::Storage(e.to_string()))?;
        let store = &self.store;
        let value = &value;
        let label = format!("Storing {} data for {}", provider, user_id);

        retry_async(&self.retry, &label, move |_| {
            store.store_connection(user_id, provider, value)
        })
        .await
        .map_err(|e| ConnectionError::Storage(e.to_string()))
    }

    fn report<T>(&self, ctx: &SessionContext, provider: Provider, result: &Result<T, ConnectionError>) {
        let user_id = ctx.user_id().unwrap_or("anonymous");
        match result {
            Ok(_) => {
                log::info!("Connected {} for {}", provider, user_id);
                emit_event(
                    self.events.as_ref(),
                    EVENT_CONNECTION_STORED,
                    &ConnectionStoredPayload {
                        user_id: user_id.to_string(),
                        provider: provider.as_str().to_string(),
                    },
                );
            }
            Err(e) => {
                log::warn!("{} connection failed for {} ({}): {}", provider, user_id, e.kind(), e);
                emit_event(
                    self.events.as_ref(),
                    EVENT_NOTICE_CONNECTION_FAILED,
                    &NoticePayload::for_user(user_id, e.user_message()).with_detail(e),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::llm::{LlmError, ScriptedLlm};
    use crate::models::TokenSet;
    use crate::storage::MemoryProfileStore;
    use std::collections::HashMap;

    struct FixedTokens;

    #[async_trait]
    impl TokenExchange for FixedTokens {
        async fn exchange(&self, _provider: Provider, code: &str) -> Result<TokenSet, ConnectionError> {
            if code == "bad" {
                return Err(ConnectionError::Token("invalid_grant".to_string()));
            }
            Ok(TokenSet {
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
            })
        }
    }

    /// Serves canned JSON by URL (query string ignored)
    #[derive(Default)]
    struct CannedFetch {
        responses: HashMap<&'static str, Value>,
    }

    #[async_trait]
    impl JsonFetch for CannedFetch {
        async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, String> {
            assert_eq!(access_token, "tok");
            let path = url.split('?').next().unwrap_or(url);
            self.responses
                .get(path)
                .cloned()
                .ok_or_else(|| format!("HTTP 404 from {}", url))
        }
    }

    fn spotify_fetch() -> CannedFetch {
        let mut responses = HashMap::new();
        responses.insert("https://spotify.test/me", json!({ "display_name": "Kem" }));
        responses.insert(
            "https://spotify.test/me/top/artists",
            json!({ "items": [{ "name": "Little Simz", "genres": ["uk hip hop"] }] }),
        );
        responses.insert(
            "https://spotify.test/me/top/tracks",
            json!({ "items": [{ "name": "Venom" }] }),
        );
        responses.insert(
            "https://spotify.test/me/player/recently-played",
            json!({ "items": [] }),
        );
        CannedFetch { responses }
    }

    struct Setup {
        store: Arc<MemoryProfileStore>,
        events: Arc<RecordingSink>,
        service: ConnectionService,
    }

    fn setup(fetch: CannedFetch) -> Setup {
        let store = Arc::new(MemoryProfileStore::new());
        let events = Arc::new(RecordingSink::new());
        let service = ConnectionService::new(
            Arc::new(FixedTokens),
            Arc::new(fetch),
            store.clone(),
            events.clone(),
        )
        .with_retry(RetryPolicy::linear(3, Duration::from_millis(1)))
        .with_api_urls("https://spotify.test", "https://youtube.test");
        Setup {
            store,
            events,
            service,
        }
    }

    #[tokio::test]
    async fn test_spotify_flow_stores_summary() {
        let s = setup(spotify_fetch());
        let summary = s
            .service
            .connect_spotify(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap();

        assert_eq!(summary.top_artists, vec!["Little Simz"]);
        assert_eq!(summary.top_genres, vec!["uk hip hop"]);
        let raw = s.store.raw("u1").await.unwrap();
        assert_eq!(raw["spotify_data"]["topArtists"][0], "Little Simz");
        assert_eq!(s.events.count(EVENT_CONNECTION_STORED), 1);
    }

    #[tokio::test]
    async fn test_requires_signed_in_user() {
        let s = setup(spotify_fetch());
        let result = s
            .service
            .connect_spotify(&SessionContext::anonymous(), "code")
            .await;
        assert!(matches!(result, Err(ConnectionError::Unauthenticated)));
        assert_eq!(s.events.count(EVENT_NOTICE_CONNECTION_FAILED), 1);
    }

    #[tokio::test]
    async fn test_token_failure_is_typed() {
        let s = setup(spotify_fetch());
        let err = s
            .service
            .connect_spotify(&SessionContext::for_user("u1"), "bad")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "token");
        assert!(s.store.raw("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_one_failed_read_fails_the_batch() {
        // No YouTube responses registered: every read 404s
        let s = setup(CannedFetch::default());
        let err = s
            .service
            .connect_youtube(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Fetch { .. }));
        assert_eq!(s.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_retried_three_times_then_typed_failure() {
        let s = setup(spotify_fetch());
        s.store.fail_next_writes(3);
        let err = s
            .service
            .connect_spotify(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert_eq!(s.store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_storage_recovers_within_retries() {
        let s = setup(spotify_fetch());
        s.store.fail_next_writes(2);
        s.service
            .connect_spotify(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap();
        assert_eq!(s.store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_insight_failure_is_typed() {
        let mut s = setup(spotify_fetch());
        let llm = ScriptedLlm::new().failing(CallKind::Insight, LlmError::EmptyResponse);
        s.service = s.service.with_insights(Arc::new(llm), CallTimeouts::default());

        let err = s
            .service
            .connect_spotify(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "insight");
        assert_eq!(s.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_insight_attached_to_summary() {
        let mut s = setup(spotify_fetch());
        let llm = ScriptedLlm::new().with_default(CallKind::Insight, "  You love sharp lyricism.  ");
        s.service = s.service.with_insights(Arc::new(llm), CallTimeouts::default());

        let summary = s
            .service
            .connect_spotify(&SessionContext::for_user("u1"), "code")
            .await
            .unwrap();
        assert_eq!(summary.insight.as_deref(), Some("You love sharp lyricism."));
    }

    #[test]
    fn test_user_messages_distinguish_kinds() {
        let token = ConnectionError::Token("x".into()).user_message();
        let storage = ConnectionError::Storage("x".into()).user_message();
        let insight = ConnectionError::Insight("x".into()).user_message();
        assert_ne!(token, storage);
        assert_ne!(storage, insight);
    }
}
