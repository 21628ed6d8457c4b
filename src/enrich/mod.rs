// src/enrich/mod.rs
//! Enrichment: turns a selected item into a fixed-shape [`Insight`].
//!
//! The gateway never fails. Provider errors, timeouts and malformed payloads
//! all collapse into [`Insight::degraded`], so one bad item cannot abort a batch.

pub mod ai_adapter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::enrich::ai_adapter::DynAiClient;
use crate::error::PipelineError;
use crate::item::Item;

pub use crate::enrich::ai_adapter::{AiClient, DisabledClient};

const MISSING: &str = "N/A";

/// Structured insight attached to a selected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub why_trending: String,
    pub emotional_trigger: String,
    pub target_audience: String,
    pub thumbnail_psychology: String,
    pub title_strategy: String,
    pub predicted_performance: String,
    /// 0..=100
    pub viral_score: u8,
}

impl Insight {
    /// Fixed payload used whenever enrichment fails for an item.
    pub fn degraded() -> Self {
        Self {
            why_trending: "Analysis failed.".to_string(),
            emotional_trigger: "Unknown".to_string(),
            target_audience: "General".to_string(),
            thumbnail_psychology: "N/A".to_string(),
            title_strategy: "N/A".to_string(),
            predicted_performance: "Unknown".to_string(),
            viral_score: 0,
        }
    }
}

/// Loose mirror of the model output; validated into [`Insight`].
#[derive(Debug, Default, Deserialize)]
struct RawInsight {
    #[serde(default)]
    why_trending: Option<serde_json::Value>,
    #[serde(default)]
    emotional_trigger: Option<serde_json::Value>,
    #[serde(default)]
    target_audience: Option<serde_json::Value>,
    #[serde(default)]
    thumbnail_psychology: Option<serde_json::Value>,
    #[serde(default)]
    title_strategy: Option<serde_json::Value>,
    #[serde(default)]
    predicted_performance: Option<serde_json::Value>,
    #[serde(default)]
    viral_score: Option<serde_json::Value>,
}

fn text_field(v: Option<serde_json::Value>) -> String {
    use serde_json::Value;
    let s = match v {
        Some(Value::String(s)) => s,
        // models sometimes answer with a list of lines
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let s = s.trim();
    if s.is_empty() {
        MISSING.to_string()
    } else {
        s.to_string()
    }
}

fn score_field(v: Option<serde_json::Value>) -> u8 {
    use serde_json::Value;
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|x| x.is_finite())
        .map_or(0, |x| x.round().clamp(0.0, 100.0) as u8)
}

/// Parse a model reply into an [`Insight`].
///
/// Tolerates markdown fences and chatter around the object; missing fields get
/// "N/A" (text) or 0 (score). Errors only when no JSON object can be found.
pub fn parse_insight(reply: &str) -> Result<Insight> {
    let start = reply.find('{').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let end = reply.rfind('}').ok_or_else(|| anyhow!("unterminated JSON object in reply"))?;
    if end < start {
        return Err(anyhow!("malformed JSON object in reply"));
    }
    let raw: RawInsight =
        serde_json::from_str(&reply[start..=end]).context("parse insight JSON")?;
    Ok(Insight {
        why_trending: text_field(raw.why_trending),
        emotional_trigger: text_field(raw.emotional_trigger),
        target_audience: text_field(raw.target_audience),
        thumbnail_psychology: text_field(raw.thumbnail_psychology),
        title_strategy: text_field(raw.title_strategy),
        predicted_performance: text_field(raw.predicted_performance),
        viral_score: score_field(raw.viral_score),
    })
}

/// Prompt sent to the model for one item.
pub fn build_prompt(item: &Item) -> String {
    let description: String = item.description.chars().take(300).collect();
    let tags = item
        .tags
        .iter()
        .take(10)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Analyze this trending YouTube video.\n\
         Title: {title}\n\
         Channel: {channel}\n\
         Views: {views}\n\
         Hours live: {hours:.2}\n\
         Description: {description}\n\
         Tags: {tags}\n\n\
         Reply with ONLY a JSON object with exactly these keys:\n\
         \"why_trending\" (three short lines on why it is spreading),\n\
         \"emotional_trigger\" (e.g. Curiosity, Shock, Nostalgia),\n\
         \"target_audience\" (specific demographic),\n\
         \"thumbnail_psychology\" (why the thumbnail works, inferred from title and stats),\n\
         \"title_strategy\" (how the title is built),\n\
         \"predicted_performance\" (forecast for the next 24h),\n\
         \"viral_score\" (integer 0-100).\n\
         No markdown, no code fences.",
        title = item.title,
        channel = item.channel,
        views = item.views,
        hours = item.hours_since_publish,
    )
}

/// Wraps an [`AiClient`] with a per-call timeout and the degraded fallback.
#[derive(Clone)]
pub struct EnrichmentGateway {
    client: DynAiClient,
    timeout: Duration,
    concurrency: usize,
}

impl EnrichmentGateway {
    pub fn new(client: DynAiClient, timeout: Duration, concurrency: usize) -> Self {
        Self {
            client,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Gateway whose every call degrades. Useful when AI is switched off.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledClient), Duration::from_secs(1), 1)
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// Enrich one item; never fails.
    pub async fn enrich(&self, item: &Item) -> Insight {
        let reason = match tokio::time::timeout(self.timeout, self.client.analyze(item)).await {
            Ok(Ok(insight)) => return insight,
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {:?}", self.timeout),
        };
        let err = PipelineError::Enrichment {
            item_id: item.id.clone(),
            reason,
        };
        tracing::warn!(
            provider = self.client.provider_name(),
            error = %err,
            "using degraded insight"
        );
        counter!("trend_enrich_degraded_total").increment(1);
        Insight::degraded()
    }

    /// Enrich many items with bounded concurrency. Output order matches input order.
    pub async fn enrich_all(&self, items: &[Item]) -> Vec<Insight> {
        // Built up front: a lazy `map` closure over `&Item` makes the
        // enclosing future fail the `Send` bound under `tokio::spawn`.
        let calls: Vec<_> = items.iter().map(|it| self.enrich(it)).collect();
        stream::iter(calls)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}
