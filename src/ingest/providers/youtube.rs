// src/ingest/providers/youtube.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::ingest::types::TrendSource;
use crate::item::Item;

const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const MAX_RESULTS: &str = "50";

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default, rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumb>,
    medium: Option<Thumb>,
    default: Option<Thumb>,
}

#[derive(Debug, Deserialize)]
struct Thumb {
    url: String,
}

// Counters are JSON strings; absent on videos with hidden stats.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

fn count(v: Option<&str>) -> u64 {
    v.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

impl Video {
    fn into_item(self) -> Item {
        let Snippet {
            title,
            channel_title,
            published_at,
            description,
            tags,
            category_id,
            thumbnails,
        } = self.snippet;

        let thumbnail_url = thumbnails
            .high
            .or(thumbnails.medium)
            .or(thumbnails.default)
            .map(|t| t.url)
            .unwrap_or_default();

        let mut item = Item::new(self.id, title, published_at)
            .with_channel(channel_title)
            .with_counters(
                count(self.statistics.view_count.as_deref()),
                count(self.statistics.like_count.as_deref()),
                count(self.statistics.comment_count.as_deref()),
            )
            .with_duration(self.content_details.duration)
            .with_description(description)
            .with_tags(tags);
        item.thumbnail_url = thumbnail_url;
        item.category_hint = category_id.filter(|c| !c.is_empty());
        item
    }
}

pub fn parse_video_list(body: &str) -> Result<Vec<Item>> {
    let list: VideoList = serde_json::from_str(body).context("parsing youtube videos.list json")?;
    Ok(list.items.into_iter().map(Video::into_item).collect())
}

/// Most-popular chart from the YouTube Data API v3.
pub struct YouTubeProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        api_key: String,
        client: reqwest::Client,
    },
}

impl YouTubeProvider {
    /// Serve a canned `videos.list` response; the region is ignored.
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trend-pulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            mode: Mode::Http {
                api_key: api_key.into(),
                client,
            },
        }
    }

    /// Reads `YOUTUBE_API_KEY`; `None` when unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("YOUTUBE_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }

    async fn fetch_body(&self, region: &str) -> Result<String> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { api_key, client } => {
                let resp = client
                    .get(VIDEOS_URL)
                    .query(&[
                        ("part", "snippet,statistics,contentDetails"),
                        ("chart", "mostPopular"),
                        ("regionCode", region),
                        ("maxResults", MAX_RESULTS),
                        ("key", api_key.as_str()),
                    ])
                    .send()
                    .await
                    .context("youtube request")?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    bail!("youtube returned {status}: {}", body.chars().take(200).collect::<String>());
                }
                resp.text().await.context("youtube response body")
            }
        }
    }
}

#[async_trait]
impl TrendSource for YouTubeProvider {
    async fn fetch_trending(&self, region: &str) -> Result<Vec<Item>> {
        let body = self.fetch_body(region).await?;

        let t0 = std::time::Instant::now();
        let items = parse_video_list(&body)?;
        histogram!("trend_youtube_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("trend_youtube_videos_total").increment(items.len() as u64);

        tracing::debug!(region, count = items.len(), "youtube chart fetched");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }
}
