// src/ingest/types.rs
use anyhow::Result;

use crate::item::Item;

/// Source of the current trending chart.
#[async_trait::async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch_trending(&self, region: &str) -> Result<Vec<Item>>;
    fn name(&self) -> &'static str;
}
