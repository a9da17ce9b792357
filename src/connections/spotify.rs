// Spotify listening data: parallel reads shaped into a SpotifySummary

use super::{item_names, ConnectionError, JsonFetch};
use crate::models::SpotifySummary;
use serde_json::Value;
use std::collections::HashMap;

pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

const MAX_GENRES: usize = 10;

pub struct SpotifyApi<'a> {
    fetch: &'a dyn JsonFetch,
    base_url: &'a str,
}

impl<'a> SpotifyApi<'a> {
    pub fn new(fetch: &'a dyn JsonFetch, base_url: &'a str) -> Self {
        Self { fetch, base_url }
    }

    async fn get(&self, path: &str, token: &str) -> Result<Value, ConnectionError> {
        let url = format!("{}{}", self.base_url, path);
        self.fetch
            .get_json(&url, token)
            .await
            .map_err(|message| ConnectionError::Fetch {
                provider: "spotify".to_string(),
                message,
            })
    }

    /// Read profile, top artists, top tracks and recent plays concurrently.
    ///
    /// Any failed read fails the whole batch.
    pub async fn fetch_summary(&self, token: &str) -> Result<SpotifySummary, ConnectionError> {
        let (me, artists, tracks, recent) = tokio::try_join!(
            self.get("/me", token),
            self.get("/me/top/artists?limit=20&time_range=medium_term", token),
            self.get("/me/top/tracks?limit=20&time_range=medium_term", token),
            self.get("/me/player/recently-played?limit=20", token),
        )?;
        Ok(summarize(&me, &artists, &tracks, &recent))
    }
}

/// Shape raw Spotify responses into a summary
pub fn summarize(me: &Value, artists: &Value, tracks: &Value, recent: &Value) -> SpotifySummary {
    let display_name = me
        .get("display_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let top_tracks = items(tracks)
        .iter()
        .filter_map(|track| {
            let name = track.get("name")?.as_str()?;
            let artist = track
                .get("artists")
                .and_then(|a| a.get(0))
                .and_then(|a| a.get("name"))
                .and_then(Value::as_str);
            Some(match artist {
                Some(artist) => format!("{} - {}", name, artist),
                None => name.to_string(),
            })
        })
        .collect();

    let recent_tracks = items(recent)
        .iter()
        .filter_map(|play| play.get("track")?.get("name")?.as_str().map(str::to_string))
        .collect();

    SpotifySummary {
        display_name,
        top_artists: item_names(artists),
        top_tracks,
        top_genres: top_genres(artists),
        recent_tracks,
        insight: None,
        connected_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn items(value: &Value) -> &[Value] {
    value
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Genres across top artists, most frequent first
fn top_genres(artists: &Value) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for artist in items(artists) {
        if let Some(genres) = artist.get("genres").and_then(Value::as_array) {
            for genre in genres.iter().filter_map(Value::as_str) {
                *counts.entry(genre).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(MAX_GENRES)
        .map(|(genre, _)| genre.to_string())
        .collect()
}
