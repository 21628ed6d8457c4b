//! item.rs: the tracked trending item, its category and trend labels.
//!
//! Raw fields come from the ingestion provider; derived fields are rewritten
//! on every cycle by `scoring::score_item` and `category::categorize`.
//! The `notified` flag is owned by the store and only ever goes false → true.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::Insight;

/// Closed set of digest categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Gaming,
    Technology,
    #[serde(rename = "News & Politics")]
    NewsPolitics,
    Finance,
    Education,
    Entertainment,
    Shorts,
}

impl Category {
    /// Order in which categories appear in a digest.
    pub const DIGEST_ORDER: [Category; 7] = [
        Category::Gaming,
        Category::Technology,
        Category::NewsPolitics,
        Category::Entertainment,
        Category::Education,
        Category::Finance,
        Category::Shorts,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Gaming => "Gaming",
            Category::Technology => "Technology",
            Category::NewsPolitics => "News & Politics",
            Category::Finance => "Finance",
            Category::Education => "Education",
            Category::Entertainment => "Entertainment",
            Category::Shorts => "Shorts",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Case-insensitive; accepts the display label or a compact alias ("news", "tech").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let cat = match key.as_str() {
            "gaming" => Category::Gaming,
            "technology" | "tech" => Category::Technology,
            "news & politics" | "news" | "news_politics" => Category::NewsPolitics,
            "finance" => Category::Finance,
            "education" => Category::Education,
            "entertainment" => Category::Entertainment,
            "shorts" => Category::Shorts,
            _ => return Err(UnknownCategory(s.to_string())),
        };
        Ok(cat)
    }
}

/// Human-readable trend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendType {
    Exploding,
    #[serde(rename = "Fast Rising")]
    FastRising,
    #[serde(rename = "Steady Growth")]
    SteadyGrowth,
    /// Freshness placeholder for young items below the growth thresholds.
    News,
    #[default]
    Regular,
    #[serde(rename = "Viral Short")]
    ViralShort,
    #[serde(rename = "Viral Gaming")]
    ViralGaming,
    #[serde(rename = "Breaking News")]
    BreakingNews,
}

impl TrendType {
    pub fn label(self) -> &'static str {
        match self {
            TrendType::Exploding => "Exploding",
            TrendType::FastRising => "Fast Rising",
            TrendType::SteadyGrowth => "Steady Growth",
            TrendType::News => "News",
            TrendType::Regular => "Regular",
            TrendType::ViralShort => "Viral Short",
            TrendType::ViralGaming => "Viral Gaming",
            TrendType::BreakingNews => "Breaking News",
        }
    }

    /// Badge prefix used in digests.
    pub fn emoji(self) -> &'static str {
        match self {
            TrendType::Exploding => "🔥",
            TrendType::FastRising => "🚀",
            TrendType::SteadyGrowth => "📈",
            TrendType::ViralShort => "⚡",
            TrendType::ViralGaming => "🎮",
            TrendType::BreakingNews => "📰",
            TrendType::News | TrendType::Regular => "",
        }
    }
}

impl fmt::Display for TrendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.emoji() {
            "" => f.write_str(self.label()),
            e => write!(f, "{e} {}", self.label()),
        }
    }
}

/// One trending media entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub channel: String,
    /// RFC 3339 as delivered by the provider (e.g. "2025-10-27T10:00:00Z").
    pub published_at: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    /// ISO 8601 duration, e.g. "PT1H2M10S".
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Provider category id (YouTube: "20" gaming, "28" science & tech, ...).
    #[serde(default)]
    pub category_hint: Option<String>,

    // --- derived, rewritten each cycle ---
    #[serde(default)]
    pub hours_since_publish: f64,
    #[serde(default)]
    pub engagement_score: f64,
    #[serde(default)]
    pub viral_probability: u8,
    #[serde(default)]
    pub trend_type: TrendType,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<Insight>,
    #[serde(default)]
    pub first_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Bare item with raw fields only; everything derived is zeroed.
    pub fn new(id: impl Into<String>, title: impl Into<String>, published_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channel: String::new(),
            published_at: published_at.into(),
            views: 0,
            likes: 0,
            comments: 0,
            duration: String::new(),
            thumbnail_url: String::new(),
            description: String::new(),
            tags: Vec::new(),
            category_hint: None,
            hours_since_publish: 0.0,
            engagement_score: 0.0,
            viral_probability: 0,
            trend_type: TrendType::default(),
            category: None,
            notified: false,
            insight: None,
            first_seen_at: None,
            last_seen_at: None,
        }
    }

    pub fn with_counters(mut self, views: u64, likes: u64, comments: u64) -> Self {
        self.views = views;
        self.likes = likes;
        self.comments = comments;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn with_category_hint(mut self, hint: impl Into<String>) -> Self {
        self.category_hint = Some(hint.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn watch_url(&self) -> String {
        format!("https://youtu.be/{}", self.id)
    }

    /// Resolved category, falling back to the classifier default.
    pub fn category_or_default(&self) -> Category {
        self.category.unwrap_or(Category::Entertainment)
    }
}
