// Secure storage for API keys and OAuth client secrets
//
// Stored in ~/.twyne/secrets.toml, readable by the owner only

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const OPENAI: &str = "openai";
pub const SUPABASE: &str = "supabase";
pub const SPOTIFY: &str = "spotify";
pub const GOOGLE: &str = "google";

/// Secrets stored in ~/.twyne/secrets.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Secrets indexed by service ("openai" -> "sk-...", "spotify" -> client secret)
    #[serde(default)]
    pub api_tokens: HashMap<String, String>,
}

impl SecretsConfig {
    /// Get the secrets file path (~/.twyne/secrets.toml)
    pub fn get_secrets_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".twyne").join("secrets.toml"))
    }

    /// Load secrets from the default location
    pub fn load() -> Result<Self> {
        let path = Self::get_secrets_path()
            .ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Self::load_from(&path)
    }

    /// Load secrets from `path`; a missing file yields no secrets
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read secrets file '{}': {}", path.display(), e))?;

        let config: SecretsConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse secrets file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save secrets to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::get_secrets_path()
            .ok_or_else(|| anyhow!("Could not determine home directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    anyhow!(
                        "Failed to create secrets directory '{}': {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize secrets: {}", e))?;

        fs::write(path, contents)
            .map_err(|e| anyhow!("Failed to write secrets file '{}': {}", path.display(), e))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, permissions).map_err(|e| {
                anyhow!(
                    "Failed to set permissions on secrets file '{}': {}",
                    path.display(),
                    e
                )
            })?;
        }

        log::info!("Saved secrets to: {}", path.display());
        Ok(())
    }

    pub fn get_token(&self, service: &str) -> Option<&String> {
        self.api_tokens.get(service).filter(|t| !t.trim().is_empty())
    }

    pub fn set_token(&mut self, service: &str, token: &str) {
        self.api_tokens.insert(service.to_string(), token.to_string());
    }

    pub fn delete_token(&mut self, service: &str) -> bool {
        self.api_tokens.remove(service).is_some()
    }

    pub fn has_token(&self, service: &str) -> bool {
        self.get_token(service).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_delete() {
        let mut config = SecretsConfig::default();
        config.set_token(OPENAI, "sk-test");
        assert_eq!(config.get_token(OPENAI), Some(&"sk-test".to_string()));
        assert!(!config.has_token(SUPABASE));

        assert!(config.delete_token(OPENAI));
        assert!(!config.delete_token(OPENAI));
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let mut config = SecretsConfig::default();
        config.set_token(SPOTIFY, "   ");
        assert!(!config.has_token(SPOTIFY));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("secrets.toml");

        let mut config = SecretsConfig::default();
        config.set_token(OPENAI, "sk-12345");
        config.set_token(GOOGLE, "g-secret");
        config.save_to(&path).unwrap();

        let loaded = SecretsConfig::load_from(&path).unwrap();
        assert_eq!(loaded.get_token(GOOGLE), Some(&"g-secret".to_string()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let loaded = SecretsConfig::load_from(&temp.path().join("absent.toml")).unwrap();
        assert!(loaded.api_tokens.is_empty());
    }
}
