// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::PipelineError;
use crate::ingest::types::TrendSource;
use crate::item::Item;

/// Decode HTML entities, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim titles/channels, drop items without an id and repeated ids (first wins).
/// Returns (kept, dropped).
pub fn normalize_items(raw: Vec<Item>) -> (Vec<Item>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut kept = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for mut it in raw {
        it.id = it.id.trim().to_string();
        if it.id.is_empty() || !seen.insert(it.id.clone()) {
            dropped += 1;
            continue;
        }
        it.title = normalize_text(&it.title);
        it.channel = normalize_text(&it.channel);
        kept.push(it);
    }

    (kept, dropped)
}

/// Fetch the current chart; never fails.
///
/// Provider errors and timeouts are logged and yield an empty list so the
/// cycle can still persist nothing, select nothing and report.
pub async fn fetch_items(source: &dyn TrendSource, region: &str, timeout: Duration) -> Vec<Item> {
    let t0 = std::time::Instant::now();
    let outcome = tokio::time::timeout(timeout, source.fetch_trending(region)).await;
    histogram!("trend_ingest_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    let raw = match outcome {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            let err = PipelineError::Ingest(format!("{e:#}"));
            tracing::error!(provider = source.name(), region, error = %err, "provider error");
            counter!("trend_ingest_errors_total").increment(1);
            return Vec::new();
        }
        Err(_) => {
            let err = PipelineError::Ingest(format!("timed out after {timeout:?}"));
            tracing::error!(provider = source.name(), region, error = %err, "provider error");
            counter!("trend_ingest_errors_total").increment(1);
            return Vec::new();
        }
    };

    let (kept, dropped) = normalize_items(raw);
    if dropped > 0 {
        tracing::debug!(provider = source.name(), dropped, "dropped empty/duplicate ids");
    }
    counter!("trend_items_ingested_total").increment(kept.len() as u64);
    kept
}
