// Connection Models - OAuth tokens and provider summaries stored on the user record

use serde::{Deserialize, Serialize};

/// A third-party data provider the user can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Youtube,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Youtube => "youtube",
        }
    }

    /// Column on the user record that holds this provider's summary
    pub fn data_column(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify_data",
            Provider::Youtube => "youtube_data",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spotify" => Ok(Provider::Spotify),
            "youtube" | "google" => Ok(Provider::Youtube),
            _ => Err(format!(
                "Unknown provider: '{}'. Expected 'spotify' or 'youtube'",
                s
            )),
        }
    }
}

/// Result of an authorization-code exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Listening summary built from the Spotify Web API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifySummary {
    pub display_name: String,
    pub top_artists: Vec<String>,
    pub top_tracks: Vec<String>,
    pub top_genres: Vec<String>,
    pub recent_tracks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    pub connected_at: String,
}

/// Viewing summary built from the YouTube Data API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeSummary {
    pub channel_title: String,
    pub subscriptions: Vec<String>,
    pub liked_videos: Vec<String>,
    pub top_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    pub connected_at: String,
}
