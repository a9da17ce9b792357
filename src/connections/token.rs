// OAuth authorization-code exchange for Spotify and Google

use super::{ConnectionError, OAuthClientConfig};
use crate::models::{Provider, TokenSet};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(20);

/// Exchanges an authorization code for provider tokens
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, provider: Provider, code: &str) -> Result<TokenSet, ConnectionError>;
}

pub struct OAuthTokenExchanger {
    client: reqwest::Client,
    spotify: Option<OAuthClientConfig>,
    google: Option<OAuthClientConfig>,
    spotify_url: String,
    google_url: String,
}

impl OAuthTokenExchanger {
    pub fn new(spotify: Option<OAuthClientConfig>, google: Option<OAuthClientConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            spotify,
            google,
            spotify_url: SPOTIFY_TOKEN_URL.to_string(),
            google_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_urls(mut self, spotify: impl Into<String>, google: impl Into<String>) -> Self {
        self.spotify_url = spotify.into();
        self.google_url = google.into();
        self
    }

    fn client_for(&self, provider: Provider) -> Result<&OAuthClientConfig, ConnectionError> {
        let config = match provider {
            Provider::Spotify => self.spotify.as_ref(),
            Provider::Youtube => self.google.as_ref(),
        };
        config
            .filter(|c| c.is_complete())
            .ok_or_else(|| ConnectionError::NotConfigured(provider.as_str().to_string()))
    }
}

/// `Basic base64(client_id:client_secret)` as Spotify expects
pub fn basic_auth_header(client: &OAuthClientConfig) -> String {
    let raw = format!("{}:{}", client.client_id, client.client_secret);
    format!("Basic {}", STANDARD.encode(raw))
}

#[async_trait]
impl TokenExchange for OAuthTokenExchanger {
    async fn exchange(&self, provider: Provider, code: &str) -> Result<TokenSet, ConnectionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ConnectionError::Token("missing authorization code".to_string()));
        }
        let client = self.client_for(provider)?;

        let request = match provider {
            Provider::Spotify => self
                .client
                .post(&self.spotify_url)
                .header("Authorization", basic_auth_header(client))
                .form(&[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", client.redirect_uri.as_str()),
                ]),
            Provider::Youtube => self.client.post(&self.google_url).form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", client.redirect_uri.as_str()),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
            ]),
        };

        let response = request
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|e| ConnectionError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectionError::Token(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let tokens: TokenSet = response
            .json()
            .await
            .map_err(|e| ConnectionError::Token(format!("invalid token response: {}", e)))?;

        if tokens.access_token.trim().is_empty() {
            return Err(ConnectionError::Token("empty access token".to_string()));
        }
        log::info!("Exchanged {} authorization code", provider);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "abc".to_string(),
            client_secret: "xyz".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
        }
    }

    #[test]
    fn test_basic_auth_header() {
        // base64("abc:xyz")
        assert_eq!(basic_auth_header(&client()), "Basic YWJjOnh5eg==");
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let exchanger = OAuthTokenExchanger::new(Some(client()), None);
        let result = exchanger.exchange(Provider::Youtube, "code").await;
        assert!(matches!(result, Err(ConnectionError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_blank_code_is_token_error() {
        let exchanger = OAuthTokenExchanger::new(Some(client()), Some(client()));
        let result = exchanger.exchange(Provider::Spotify, "  ").await;
        assert!(matches!(result, Err(ConnectionError::Token(_))));
    }
}
