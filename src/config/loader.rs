// Configuration file and environment loading

use super::merger::{
    ConfigMerger, PartialConfig, PartialConnectionsConfig, PartialLlmConfig, PartialOAuthClient,
    PartialOnboardingConfig, PartialServerConfig, PartialSmsConfig, PartialStorageConfig,
};
use super::{SecretsConfig, TwyneConfig};
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Config loader
pub struct ConfigLoader {
    /// Explicit --config path, otherwise ~/.twyne/config.toml
    path: Option<PathBuf>,
    secrets_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader for the default locations
    pub fn new() -> Self {
        Self {
            path: Self::default_config_path(),
            secrets_path: SecretsConfig::get_secrets_path(),
        }
    }

    /// Use an explicit config file instead of the default one
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_secrets_path(mut self, path: Option<PathBuf>) -> Self {
        self.secrets_path = path;
        self
    }

    /// Get the default config path (~/.twyne/config.toml)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".twyne").join("config.toml"))
    }

    /// Load a config file; a missing file is not an error
    pub fn load_file(path: &Path) -> Result<Option<TwyneConfig>> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: TwyneConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        log::info!("Loaded config from: {}", path.display());
        Ok(Some(config))
    }

    /// Read overrides from the process environment
    pub fn env_overrides() -> Result<PartialConfig> {
        Self::overrides_from(|key| std::env::var(key).ok())
    }

    /// Build overrides from an arbitrary variable lookup
    pub fn overrides_from<F>(lookup: F) -> Result<PartialConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm = PartialLlmConfig {
            base_url: var("TWYNE_LLM_BASE_URL"),
            model: var("TWYNE_LLM_MODEL"),
            api_key: var("OPENAI_API_KEY"),
            ..Default::default()
        };

        let onboarding = PartialOnboardingConfig {
            max_turns: parse_var(&var, "TWYNE_MAX_TURNS")?,
            soft_stop_probability: parse_var(&var, "TWYNE_SOFT_STOP_PROBABILITY")?,
            policy: parse_var(&var, "TWYNE_STOP_POLICY")?,
            default_mode: parse_var(&var, "TWYNE_DEFAULT_MODE")?,
            idle_timeout_secs: parse_var(&var, "TWYNE_SESSION_IDLE_SECS")?,
            ..Default::default()
        };

        let storage = PartialStorageConfig {
            backend: parse_var(&var, "TWYNE_STORAGE_BACKEND")?,
            data_dir: var("TWYNE_DATA_DIR").map(PathBuf::from),
            supabase_url: var("SUPABASE_URL"),
            supabase_key: var("SUPABASE_SERVICE_KEY").or_else(|| var("SUPABASE_KEY")),
            table: var("TWYNE_USERS_TABLE"),
        };

        let oauth = |prefix: &str| {
            let client = PartialOAuthClient {
                client_id: var(&format!("{}_CLIENT_ID", prefix)),
                client_secret: var(&format!("{}_CLIENT_SECRET", prefix)),
                redirect_uri: var(&format!("{}_REDIRECT_URI", prefix)),
            };
            (!client.is_empty()).then_some(client)
        };
        let connections = PartialConnectionsConfig {
            spotify: oauth("SPOTIFY"),
            google: oauth("GOOGLE"),
            retry_attempts: parse_var(&var, "TWYNE_RETRY_ATTEMPTS")?,
            retry_delay_ms: parse_var(&var, "TWYNE_RETRY_DELAY_MS")?,
        };

        let sms = PartialSmsConfig {
            echo_url: var("TWYNE_SMS_ECHO_URL"),
            timeout_secs: None,
        };

        let server = PartialServerConfig {
            port: parse_var(&var, "TWYNE_PORT")?,
            bind: var("TWYNE_BIND"),
            cors_origins: var("TWYNE_CORS_ORIGINS").map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            }),
            ..Default::default()
        };

        Ok(PartialConfig {
            llm: Some(llm),
            onboarding: Some(onboarding),
            storage: Some(storage),
            connections: Some(connections),
            sms: Some(sms),
            server: Some(server),
        })
    }

    /// Load file, environment and secrets, then apply CLI overrides on top
    pub fn load(&self, cli: Option<PartialConfig>) -> Result<TwyneConfig> {
        let file = match &self.path {
            Some(path) => Self::load_file(path)?,
            None => None,
        };

        let mut config = ConfigMerger::new()
            .with_file(file)
            .with_env(Some(Self::env_overrides()?))
            .with_cli(cli)
            .merge();

        if let Some(path) = &self.secrets_path {
            match SecretsConfig::load_from(path) {
                Ok(secrets) => config.apply_secrets(&secrets),
                Err(e) => log::warn!("Ignoring secrets file: {}", e),
            }
        }
        Ok(config)
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Invalid value for {}: {}", key, e))
        })
        .transpose()
}
