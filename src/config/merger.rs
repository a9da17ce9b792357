// Configuration merging with priority

use super::{
    ConnectionsConfig, LlmConfig, OnboardingConfig, ServerConfig, SmsConfig, StorageBackend,
    StorageConfig, TwyneConfig,
};
use crate::connections::OAuthClientConfig;
use crate::models::PromptMode;
use crate::onboarding::PolicyKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Partial configuration for merging
/// Uses Option<T> for all fields to support partial overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialConfig {
    #[serde(default)]
    pub llm: Option<PartialLlmConfig>,
    #[serde(default)]
    pub onboarding: Option<PartialOnboardingConfig>,
    #[serde(default)]
    pub storage: Option<PartialStorageConfig>,
    #[serde(default)]
    pub connections: Option<PartialConnectionsConfig>,
    #[serde(default)]
    pub sms: Option<PartialSmsConfig>,
    #[serde(default)]
    pub server: Option<PartialServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialLlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub turn_timeout_secs: Option<u64>,
    pub synthesis_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialOnboardingConfig {
    pub max_turns: Option<usize>,
    pub soft_stop_start: Option<usize>,
    pub soft_stop_every: Option<usize>,
    pub soft_stop_probability: Option<f64>,
    pub policy: Option<PolicyKind>,
    pub default_mode: Option<PromptMode>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialStorageConfig {
    pub backend: Option<StorageBackend>,
    pub data_dir: Option<PathBuf>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub table: Option<String>,
}

/// Individual OAuth fields, so an environment can supply only the secret
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialOAuthClient {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl PartialOAuthClient {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.client_secret.is_none() && self.redirect_uri.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialConnectionsConfig {
    pub spotify: Option<PartialOAuthClient>,
    pub google: Option<PartialOAuthClient>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialSmsConfig {
    pub echo_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialServerConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub token: Option<String>,
    pub cors_origins: Option<Vec<String>>,
}

/// Configuration merger
/// Priority order: CLI -> Environment -> File -> Defaults
pub struct ConfigMerger {
    defaults: TwyneConfig,
    file: Option<TwyneConfig>,
    env: Option<PartialConfig>,
    cli: Option<PartialConfig>,
}

impl ConfigMerger {
    /// Create a new config merger with defaults
    pub fn new() -> Self {
        Self {
            defaults: TwyneConfig::default(),
            file: None,
            env: None,
            cli: None,
        }
    }

    /// Set config loaded from the TOML file
    pub fn with_file(mut self, config: Option<TwyneConfig>) -> Self {
        self.file = config;
        self
    }

    /// Set environment overrides
    pub fn with_env(mut self, config: Option<PartialConfig>) -> Self {
        self.env = config;
        self
    }

    /// Set CLI overrides
    pub fn with_cli(mut self, config: Option<PartialConfig>) -> Self {
        self.cli = config;
        self
    }

    /// Merge all configs with priority
    pub fn merge(&self) -> TwyneConfig {
        let mut result = self.defaults.clone();

        if let Some(ref file) = self.file {
            result = self.merge_full(&result, file);
        }

        // Environment overrides the file
        if let Some(ref env) = self.env {
            result = self.merge_partial(&result, env);
        }

        // CLI overrides (highest priority)
        if let Some(ref cli) = self.cli {
            result = self.merge_partial(&result, cli);
        }

        result
    }

    /// Merge a full config over a base; optional values fall back to the base
    fn merge_full(&self, base: &TwyneConfig, over: &TwyneConfig) -> TwyneConfig {
        let mut merged = over.clone();
        merged.llm.api_key = over.llm.api_key.clone().or_else(|| base.llm.api_key.clone());
        merged.storage.data_dir = over
            .storage
            .data_dir
            .clone()
            .or_else(|| base.storage.data_dir.clone());
        merged.storage.supabase_url = over
            .storage
            .supabase_url
            .clone()
            .or_else(|| base.storage.supabase_url.clone());
        merged.storage.supabase_key = over
            .storage
            .supabase_key
            .clone()
            .or_else(|| base.storage.supabase_key.clone());
        merged.connections.spotify = over
            .connections
            .spotify
            .clone()
            .or_else(|| base.connections.spotify.clone());
        merged.connections.google = over
            .connections
            .google
            .clone()
            .or_else(|| base.connections.google.clone());
        merged.sms.echo_url = over.sms.echo_url.clone().or_else(|| base.sms.echo_url.clone());
        merged.server.token = over.server.token.clone().or_else(|| base.server.token.clone());
        merged
    }

    /// Merge partial config into full config
    fn merge_partial(&self, base: &TwyneConfig, partial: &PartialConfig) -> TwyneConfig {
        TwyneConfig {
            llm: partial
                .llm
                .as_ref()
                .map(|p| self.merge_partial_llm(&base.llm, p))
                .unwrap_or_else(|| base.llm.clone()),
            onboarding: partial
                .onboarding
                .as_ref()
                .map(|p| self.merge_partial_onboarding(&base.onboarding, p))
                .unwrap_or_else(|| base.onboarding.clone()),
            storage: partial
                .storage
                .as_ref()
                .map(|p| self.merge_partial_storage(&base.storage, p))
                .unwrap_or_else(|| base.storage.clone()),
            connections: partial
                .connections
                .as_ref()
                .map(|p| self.merge_partial_connections(&base.connections, p))
                .unwrap_or_else(|| base.connections.clone()),
            sms: partial
                .sms
                .as_ref()
                .map(|p| self.merge_partial_sms(&base.sms, p))
                .unwrap_or_else(|| base.sms.clone()),
            server: partial
                .server
                .as_ref()
                .map(|p| self.merge_partial_server(&base.server, p))
                .unwrap_or_else(|| base.server.clone()),
        }
    }

    // Partial config mergers

    fn merge_partial_llm(&self, base: &LlmConfig, partial: &PartialLlmConfig) -> LlmConfig {
        LlmConfig {
            base_url: partial.base_url.clone().unwrap_or_else(|| base.base_url.clone()),
            model: partial.model.clone().unwrap_or_else(|| base.model.clone()),
            api_key: partial.api_key.clone().or_else(|| base.api_key.clone()),
            turn_timeout_secs: partial.turn_timeout_secs.unwrap_or(base.turn_timeout_secs),
            synthesis_timeout_secs: partial
                .synthesis_timeout_secs
                .unwrap_or(base.synthesis_timeout_secs),
            ..base.clone()
        }
    }

    fn merge_partial_onboarding(
        &self,
        base: &OnboardingConfig,
        partial: &PartialOnboardingConfig,
    ) -> OnboardingConfig {
        OnboardingConfig {
            max_turns: partial.max_turns.unwrap_or(base.max_turns),
            soft_stop_start: partial.soft_stop_start.unwrap_or(base.soft_stop_start),
            soft_stop_every: partial.soft_stop_every.unwrap_or(base.soft_stop_every),
            soft_stop_probability: partial
                .soft_stop_probability
                .unwrap_or(base.soft_stop_probability),
            policy: partial.policy.unwrap_or(base.policy),
            default_mode: partial.default_mode.unwrap_or(base.default_mode),
            idle_timeout_secs: partial.idle_timeout_secs.unwrap_or(base.idle_timeout_secs),
        }
    }

    fn merge_partial_storage(
        &self,
        base: &StorageConfig,
        partial: &PartialStorageConfig,
    ) -> StorageConfig {
        StorageConfig {
            backend: partial.backend.unwrap_or(base.backend),
            data_dir: partial.data_dir.clone().or_else(|| base.data_dir.clone()),
            supabase_url: partial
                .supabase_url
                .clone()
                .or_else(|| base.supabase_url.clone()),
            supabase_key: partial
                .supabase_key
                .clone()
                .or_else(|| base.supabase_key.clone()),
            table: partial.table.clone().unwrap_or_else(|| base.table.clone()),
        }
    }

    fn merge_partial_connections(
        &self,
        base: &ConnectionsConfig,
        partial: &PartialConnectionsConfig,
    ) -> ConnectionsConfig {
        ConnectionsConfig {
            spotify: merge_oauth(base.spotify.as_ref(), partial.spotify.as_ref()),
            google: merge_oauth(base.google.as_ref(), partial.google.as_ref()),
            retry_attempts: partial.retry_attempts.unwrap_or(base.retry_attempts),
            retry_delay_ms: partial.retry_delay_ms.unwrap_or(base.retry_delay_ms),
        }
    }

    fn merge_partial_sms(&self, base: &SmsConfig, partial: &PartialSmsConfig) -> SmsConfig {
        SmsConfig {
            echo_url: partial.echo_url.clone().or_else(|| base.echo_url.clone()),
            timeout_secs: partial.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }

    fn merge_partial_server(
        &self,
        base: &ServerConfig,
        partial: &PartialServerConfig,
    ) -> ServerConfig {
        ServerConfig {
            port: partial.port.unwrap_or(base.port),
            bind: partial.bind.clone().unwrap_or_else(|| base.bind.clone()),
            token: partial.token.clone().or_else(|| base.token.clone()),
            cors_origins: partial
                .cors_origins
                .clone()
                .unwrap_or_else(|| base.cors_origins.clone()),
        }
    }
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Field-wise merge of OAuth settings; absent on both sides stays absent
fn merge_oauth(
    base: Option<&OAuthClientConfig>,
    partial: Option<&PartialOAuthClient>,
) -> Option<OAuthClientConfig> {
    let Some(partial) = partial.filter(|p| !p.is_empty()) else {
        return base.cloned();
    };
    let base = base.cloned().unwrap_or_default();
    Some(OAuthClientConfig {
        client_id: partial.client_id.clone().unwrap_or(base.client_id),
        client_secret: partial.client_secret.clone().unwrap_or(base.client_secret),
        redirect_uri: partial.redirect_uri.clone().unwrap_or(base.redirect_uri),
    })
}
