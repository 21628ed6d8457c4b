// tests/common/mod.rs
//
// Shared fakes for the integration tests: scripted sources, AI clients,
// dispatchers and a store that always fails to write.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use trend_pulse::ai_adapter::{AiClient, AiFuture};
use trend_pulse::config::PipelineConfig;
use trend_pulse::enrich::{EnrichmentGateway, Insight};
use trend_pulse::ingest::types::TrendSource;
use trend_pulse::store::{ListQuery, StoreError, StoreResult, StoreStats};
use trend_pulse::{Digest, Dispatcher, Item, Pipeline, TrendStore};

// ---------- sources ----------

/// Returns whatever was last `set`; counts calls.
#[derive(Default)]
pub struct FakeSource {
    items: Mutex<Vec<Item>>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, items: Vec<Item>) {
        *self.items.lock().expect("source poisoned") = items;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TrendSource for FakeSource {
    async fn fetch_trending(&self, _region: &str) -> Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().expect("source poisoned").clone())
    }
    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Sleeps inside every fetch and records the peak number of concurrent fetches.
pub struct SlowSource {
    items: Vec<Item>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl SlowSource {
    pub fn with(items: Vec<Item>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            items,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TrendSource for SlowSource {
    async fn fetch_trending(&self, _region: &str) -> Result<Vec<Item>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Panics on every fetch; counts calls first.
#[derive(Default)]
pub struct PanickingSource {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl TrendSource for PanickingSource {
    async fn fetch_trending(&self, _region: &str) -> Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("provider exploded");
    }
    fn name(&self) -> &'static str {
        "panicking"
    }
}

// ---------- AI ----------

/// Fixed insight with `score`; errors for ids listed in `fail_ids`.
pub struct ScriptedAi {
    pub score: u8,
    pub fail_ids: Vec<String>,
}

impl ScriptedAi {
    pub fn ok(score: u8) -> Arc<Self> {
        Arc::new(Self {
            score,
            fail_ids: Vec::new(),
        })
    }

    pub fn failing_for(score: u8, ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            score,
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl AiClient for ScriptedAi {
    fn analyze<'a>(&'a self, item: &'a Item) -> AiFuture<'a> {
        Box::pin(async move {
            if self.fail_ids.iter().any(|id| id == &item.id) {
                return Err(anyhow!("scripted failure for {}", item.id));
            }
            Ok(Insight {
                why_trending: format!("why {}", item.id),
                emotional_trigger: "Curiosity".into(),
                target_audience: "Everyone".into(),
                thumbnail_psychology: "Faces".into(),
                title_strategy: "Numbers".into(),
                predicted_performance: "Up".into(),
                viral_score: self.score,
            })
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// ---------- dispatch ----------

/// Records every digest; answers with the current `ok` flag.
pub struct RecordingDispatcher {
    ok: AtomicBool,
    sent: Mutex<Vec<Digest>>,
}

impl RecordingDispatcher {
    pub fn new(ok: bool) -> Arc<Self> {
        Arc::new(Self {
            ok: AtomicBool::new(ok),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_ok(&self, ok: bool) {
        self.ok.store(ok, Ordering::SeqCst);
    }

    pub fn digests(&self) -> Vec<Digest> {
        self.sent.lock().expect("dispatcher poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("dispatcher poisoned").len()
    }
}

#[async_trait::async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, digest: &Digest) -> bool {
        self.sent
            .lock()
            .expect("dispatcher poisoned")
            .push(digest.clone());
        self.ok.load(Ordering::SeqCst)
    }
}

// ---------- store ----------

/// Reads succeed (empty, active); every write fails.
pub struct ReadOnlyStore;

fn io_error() -> StoreError {
    StoreError::Io {
        path: "/readonly/state.json".into(),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
    }
}

#[async_trait::async_trait]
impl TrendStore for ReadOnlyStore {
    async fn upsert(&self, _item: &Item) -> StoreResult<()> {
        Err(io_error())
    }
    async fn is_notified(&self, _id: &str) -> StoreResult<bool> {
        Ok(false)
    }
    async fn mark_notified(&self, _id: &str) -> StoreResult<()> {
        Err(io_error())
    }
    async fn list(&self, _query: &ListQuery) -> StoreResult<Vec<Item>> {
        Ok(Vec::new())
    }
    async fn reports(&self, _limit: usize) -> StoreResult<Vec<Item>> {
        Ok(Vec::new())
    }
    async fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            total_items: 0,
            notified_items: 0,
        })
    }
    async fn get_setting(&self, _key: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }
    async fn set_setting(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(io_error())
    }
}

// ---------- builders ----------

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        top_k: 5,
        ingest_timeout_secs: 2,
        enrich_timeout_secs: 2,
        dispatch_timeout_secs: 2,
        enrich_concurrency: 4,
    }
}

pub fn pipeline(
    source: Arc<dyn TrendSource>,
    store: Arc<dyn TrendStore>,
    ai: Arc<dyn AiClient>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Pipeline {
    let cfg = fast_config();
    let gateway = EnrichmentGateway::new(ai, Duration::from_secs(2), cfg.enrich_concurrency);
    Pipeline::new(source, store, gateway, dispatcher, "IN", cfg)
}

/// Item published `hours` before `now` with the given counters.
pub fn trending(id: &str, title: &str, hours: i64, views: u64, now: DateTime<Utc>) -> Item {
    let published = (now - chrono::Duration::hours(hours)).to_rfc3339();
    Item::new(id, title, published)
        .with_channel("Channel")
        .with_counters(views, views / 20, views / 100)
        .with_duration("PT10M")
}
