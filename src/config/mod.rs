// Server configuration: TOML file, environment and CLI, merged by priority

pub mod loader;
pub mod merger;
pub mod secrets;

pub use loader::ConfigLoader;
pub use merger::{
    ConfigMerger, PartialConfig, PartialConnectionsConfig, PartialLlmConfig, PartialOAuthClient,
    PartialOnboardingConfig, PartialServerConfig, PartialSmsConfig, PartialStorageConfig,
};
pub use secrets::SecretsConfig;

use crate::connections::OAuthClientConfig;
use crate::llm::openai::{DEFAULT_MODEL, OPENAI_API_URL};
use crate::llm::CallTimeouts;
use crate::models::PromptMode;
use crate::onboarding::policy::{
    PolicyKind, SoftStopConfig, StopPolicy, DEFAULT_MAX_TURNS, DEFAULT_SOFT_STOP_EVERY,
    DEFAULT_SOFT_STOP_PROBABILITY, DEFAULT_SOFT_STOP_START,
};
use crate::storage::supabase::DEFAULT_TABLE;
use crate::utils::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Twyne server configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TwyneConfig {
    /// Completion service settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Turn pacing and stop policy
    #[serde(default)]
    pub onboarding: OnboardingConfig,
    /// Where drafts and profiles live
    #[serde(default)]
    pub storage: StorageConfig,
    /// OAuth data connections
    #[serde(default)]
    pub connections: ConnectionsConfig,
    /// SMS echo endpoint
    #[serde(default)]
    pub sms: SmsConfig,
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,
}

// ============================================================================
// [llm]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Usually supplied through OPENAI_API_KEY or secrets.toml
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_coverage_timeout")]
    pub coverage_timeout_secs: u64,
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_secs: u64,
    #[serde(default = "default_mirror_timeout")]
    pub mirror_timeout_secs: u64,
    #[serde(default = "default_insight_timeout")]
    pub insight_timeout_secs: u64,
}

fn default_llm_base_url() -> String { OPENAI_API_URL.to_string() }
fn default_model() -> String { DEFAULT_MODEL.to_string() }
fn default_turn_timeout() -> u64 { 30 }
fn default_coverage_timeout() -> u64 { 20 }
fn default_synthesis_timeout() -> u64 { 40 }
fn default_mirror_timeout() -> u64 { 30 }
fn default_insight_timeout() -> u64 { 20 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            api_key: None,
            turn_timeout_secs: default_turn_timeout(),
            coverage_timeout_secs: default_coverage_timeout(),
            synthesis_timeout_secs: default_synthesis_timeout(),
            mirror_timeout_secs: default_mirror_timeout(),
            insight_timeout_secs: default_insight_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            turn: Duration::from_secs(self.turn_timeout_secs),
            coverage: Duration::from_secs(self.coverage_timeout_secs),
            synthesis: Duration::from_secs(self.synthesis_timeout_secs),
            mirror: Duration::from_secs(self.mirror_timeout_secs),
            insight: Duration::from_secs(self.insight_timeout_secs),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ============================================================================
// [onboarding]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_soft_stop_start")]
    pub soft_stop_start: usize,
    #[serde(default = "default_soft_stop_every")]
    pub soft_stop_every: usize,
    #[serde(default = "default_soft_stop_probability")]
    pub soft_stop_probability: f64,
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,
    #[serde(default)]
    pub default_mode: PromptMode,
    /// Live sessions untouched for this long are dropped from memory; drafts stay
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_turns() -> usize { DEFAULT_MAX_TURNS }
fn default_soft_stop_start() -> usize { DEFAULT_SOFT_STOP_START }
fn default_soft_stop_every() -> usize { DEFAULT_SOFT_STOP_EVERY }
fn default_soft_stop_probability() -> f64 { DEFAULT_SOFT_STOP_PROBABILITY }
fn default_policy() -> PolicyKind { PolicyKind::FixedCap }
fn default_idle_timeout_secs() -> u64 { 3600 }

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            soft_stop_start: default_soft_stop_start(),
            soft_stop_every: default_soft_stop_every(),
            soft_stop_probability: default_soft_stop_probability(),
            policy: default_policy(),
            default_mode: PromptMode::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl OnboardingConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(60))
    }

    pub fn stop_policy(&self) -> StopPolicy {
        let soft_stop = SoftStopConfig {
            max_turns: self.max_turns.max(1),
            window_start: self.soft_stop_start,
            every: self.soft_stop_every,
            probability: self.soft_stop_probability.clamp(0.0, 1.0),
        };
        StopPolicy::from_kind(self.policy, soft_stop)
    }
}

// ============================================================================
// [storage]
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Supabase,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "files" => Ok(StorageBackend::File),
            "supabase" => Ok(StorageBackend::Supabase),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!(
                "Invalid storage backend: '{}'. Expected 'file', 'supabase', or 'memory'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Defaults to ~/.twyne/data
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String { DEFAULT_TABLE.to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: None,
            supabase_url: None,
            supabase_key: None,
            table: default_table(),
        }
    }
}

impl StorageConfig {
    /// Configured data directory, or ~/.twyne/data
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".twyne")
                .join("data")
        })
    }
}

// ============================================================================
// [connections]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default)]
    pub spotify: Option<OAuthClientConfig>,
    #[serde(default)]
    pub google: Option<OAuthClientConfig>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retry_attempts() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            spotify: None,
            google: None,
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ConnectionsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry_attempts.max(1),
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

// ============================================================================
// [sms] and [server]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Endpoint that turns an SMS transcript into the next reply
    #[serde(default)]
    pub echo_url: Option<String>,
    #[serde(default = "default_sms_timeout")]
    pub timeout_secs: u64,
}

fn default_sms_timeout() -> u64 { 20 }

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            echo_url: None,
            timeout_secs: default_sms_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Fixed bearer token; a random one is generated when unset
    #[serde(default)]
    pub token: Option<String>,
    /// Empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 { 3420 }
fn default_bind() -> String { "0.0.0.0".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            token: None,
            cors_origins: Vec::new(),
        }
    }
}

impl TwyneConfig {
    /// Fill credentials left empty by the config file from secrets.toml
    pub fn apply_secrets(&mut self, secrets: &SecretsConfig) {
        if !self.llm.has_api_key() {
            if let Some(key) = secrets.get_token(secrets::OPENAI) {
                self.llm.api_key = Some(key.clone());
            }
        }
        if self.storage.supabase_key.is_none() {
            self.storage.supabase_key = secrets.get_token(secrets::SUPABASE).cloned();
        }
        for (client, id) in [
            (self.connections.spotify.as_mut(), secrets::SPOTIFY),
            (self.connections.google.as_mut(), secrets::GOOGLE),
        ] {
            if let Some(client) = client {
                if client.client_secret.is_empty() {
                    if let Some(secret) = secrets.get_token(id) {
                        client.client_secret = secret.clone();
                    }
                }
            }
        }
    }
}
