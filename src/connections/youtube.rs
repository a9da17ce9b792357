// YouTube viewing data: parallel reads shaped into a YouTubeSummary

use super::{ConnectionError, JsonFetch};
use crate::models::YouTubeSummary;
use serde_json::Value;
use std::collections::HashMap;

pub const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

const MAX_CATEGORIES: usize = 5;

pub struct YouTubeApi<'a> {
    fetch: &'a dyn JsonFetch,
    base_url: &'a str,
}

impl<'a> YouTubeApi<'a> {
    pub fn new(fetch: &'a dyn JsonFetch, base_url: &'a str) -> Self {
        Self { fetch, base_url }
    }

    async fn get(&self, path: &str, token: &str) -> Result<Value, ConnectionError> {
        let url = format!("{}{}", self.base_url, path);
        self.fetch
            .get_json(&url, token)
            .await
            .map_err(|message| ConnectionError::Fetch {
                provider: "youtube".to_string(),
                message,
            })
    }

    /// Read channel, subscriptions and liked videos concurrently
    pub async fn fetch_summary(&self, token: &str) -> Result<YouTubeSummary, ConnectionError> {
        let (channel, subscriptions, liked) = tokio::try_join!(
            self.get("/channels?part=snippet&mine=true", token),
            self.get("/subscriptions?part=snippet&mine=true&maxResults=50", token),
            self.get("/videos?part=snippet&myRating=like&maxResults=50", token),
        )?;
        Ok(summarize(&channel, &subscriptions, &liked))
    }
}

/// Standard YouTube video category names
pub fn category_name(id: &str) -> Option<&'static str> {
    let name = match id {
        "1" => "Film & Animation",
        "2" => "Autos & Vehicles",
        "10" => "Music",
        "15" => "Pets & Animals",
        "17" => "Sports",
        "19" => "Travel & Events",
        "20" => "Gaming",
        "22" => "People & Blogs",
        "23" => "Comedy",
        "24" => "Entertainment",
        "25" => "News & Politics",
        "26" => "Howto & Style",
        "27" => "Education",
        "28" => "Science & Technology",
        "29" => "Nonprofits & Activism",
        _ => return None,
    };
    Some(name)
}

fn snippet_titles(value: &Value) -> Vec<String> {
    value
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("snippet")?.get("title")?.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Shape raw YouTube responses into a summary
pub fn summarize(channel: &Value, subscriptions: &Value, liked: &Value) -> YouTubeSummary {
    let channel_title = snippet_titles(channel).into_iter().next().unwrap_or_default();

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    if let Some(items) = liked.get("items").and_then(Value::as_array) {
        for item in items {
            let category = item
                .get("snippet")
                .and_then(|s| s.get("categoryId"))
                .and_then(Value::as_str)
                .and_then(category_name);
            if let Some(category) = category {
                *counts.entry(category).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    YouTubeSummary {
        channel_title,
        subscriptions: snippet_titles(subscriptions),
        liked_videos: snippet_titles(liked),
        top_categories: ranked
            .into_iter()
            .take(MAX_CATEGORIES)
            .map(|(name, _)| name.to_string())
            .collect(),
        insight: None,
        connected_at: chrono::Utc::now().to_rfc3339(),
    }
}
