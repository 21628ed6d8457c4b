//! Engagement scoring, viral probability and trend-type labelling.
//!
//! Every function here is pure; `score_item` is the only one that touches an
//! [`Item`], and it rewrites the derived fields from the current counters.
//! Tier boundaries below are strict (`>`), probability thresholds are `>=`.

use chrono::{DateTime, Utc};

use crate::item::{Category, Item, TrendType};

/// Lower bound for elapsed hours, keeps rates finite.
pub const MIN_HOURS: f64 = 0.1;
/// Returned when the publish timestamp cannot be parsed.
pub const FALLBACK_HOURS: f64 = 1.0;

const BASE_PROBABILITY: u32 = 20;

/// (views/hour threshold, bonus), highest first.
const VIEWS_PER_HOUR_TIERS: [(f64, u32); 3] = [(100_000.0, 40), (50_000.0, 30), (10_000.0, 20)];
/// (engagement threshold, bonus), highest first.
const ENGAGEMENT_TIERS: [(f64, u32); 3] = [(50_000.0, 40), (10_000.0, 30), (1_000.0, 10)];

/// Hours elapsed since `published_at` (RFC 3339), floored at [`MIN_HOURS`].
/// Fails soft to [`FALLBACK_HOURS`].
pub fn hours_since_publish(published_at: &str, now: DateTime<Utc>) -> f64 {
    match DateTime::parse_from_rfc3339(published_at.trim()) {
        Ok(ts) => {
            let elapsed_ms = now
                .signed_duration_since(ts.with_timezone(&Utc))
                .num_milliseconds();
            (elapsed_ms as f64 / 3_600_000.0).max(MIN_HOURS)
        }
        Err(e) => {
            tracing::debug!(published_at, error = %e, "unparseable publish timestamp");
            FALLBACK_HOURS
        }
    }
}

/// (views + 2·likes + 3·comments) / hours, rounded to 2 decimals.
pub fn engagement_score(views: u64, likes: u64, comments: u64, hours: f64) -> f64 {
    let weighted = views as f64 + likes as f64 * 2.0 + comments as f64 * 3.0;
    round2(weighted / hours.max(MIN_HOURS))
}

fn tier_bonus(value: f64, tiers: &[(f64, u32)]) -> u32 {
    tiers
        .iter()
        .find(|(threshold, _)| value > *threshold)
        .map_or(0, |(_, bonus)| *bonus)
}

/// Additive heuristic in [20, 100].
pub fn viral_probability(engagement_score: f64, hours: f64, views: u64) -> u8 {
    let views_per_hour = views as f64 / hours.max(MIN_HOURS);
    let total = BASE_PROBABILITY
        + tier_bonus(views_per_hour, &VIEWS_PER_HOUR_TIERS)
        + tier_bonus(engagement_score, &ENGAGEMENT_TIERS);
    total.min(100) as u8
}

/// Generic label from probability and freshness, before category overrides.
pub fn trend_type(probability: u8, hours: f64) -> TrendType {
    if probability >= 90 && hours < 4.0 {
        TrendType::Exploding
    } else if probability >= 75 {
        TrendType::FastRising
    } else if probability >= 50 {
        TrendType::SteadyGrowth
    } else if hours < 24.0 {
        if hours < MIN_HOURS {
            TrendType::ViralShort
        } else {
            TrendType::News
        }
    } else {
        TrendType::Regular
    }
}

/// Category overrides: Shorts > Gaming (p > 70) > News (h < 5) > generic.
pub fn apply_category_override(
    generic: TrendType,
    category: Option<Category>,
    probability: u8,
    hours: f64,
) -> TrendType {
    match category {
        Some(Category::Shorts) => TrendType::ViralShort,
        Some(Category::Gaming) if probability > 70 => TrendType::ViralGaming,
        Some(Category::NewsPolitics) if hours < 5.0 => TrendType::BreakingNews,
        _ => generic,
    }
}

/// Recompute every derived metric on `item` from its latest counters.
pub fn score_item(item: &mut Item, now: DateTime<Utc>) {
    let hours = hours_since_publish(&item.published_at, now);
    let score = engagement_score(item.views, item.likes, item.comments, hours);
    let probability = viral_probability(score, hours, item.views);
    let generic = trend_type(probability, hours);

    item.hours_since_publish = round2(hours);
    item.engagement_score = score;
    item.viral_probability = probability;
    item.trend_type = apply_category_override(generic, item.category, probability, hours);
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
