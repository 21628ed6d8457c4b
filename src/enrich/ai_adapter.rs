//! AI adapter: provider abstraction + file cache + daily limit.
//!
//! `CachingClient` sits in front of a real provider so that a selected item is
//! analysed once even when its digest has to be re-sent on a later cycle.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ai::AiConfig;
use crate::enrich::{build_prompt, parse_insight, Insight};
use crate::item::Item;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub type AiFuture<'a> = Pin<Box<dyn Future<Output = Result<Insight>> + Send + 'a>>;

/// Trait object used by the enrichment gateway (and tests).
pub trait AiClient: Send + Sync {
    fn analyze<'a>(&'a self, item: &'a Item) -> AiFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the configured provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(CachingClient::new(
            MockProvider::default(),
            config.cache_dir.clone(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => Arc::new(CachingClient::new(
            OpenAiProvider::new(config.api_key.clone(), config.model.as_deref()),
            config.cache_dir.clone(),
            config.daily_limit,
        )),
        "gemini" => Arc::new(CachingClient::new(
            GeminiProvider::new(config.api_key.clone(), config.model.as_deref()),
            config.cache_dir.clone(),
            config.daily_limit,
        )),
        other => {
            tracing::warn!(provider = other, "unknown AI provider, enrichment disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same
/// caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, item: &'a Item) -> AiFuture<'a>;
    fn name(&self) -> &'static str;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("trend-pulse/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// OpenAI Chat Completions in JSON mode.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// `model`: defaults to gpt-4o-mini.
    pub fn new(api_key: String, model: Option<&str>) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
        }
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, item: &'a Item) -> AiFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                bail!("OPENAI_API_KEY not set");
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                response_format: serde_json::Value,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: Option<String>,
            }

            let sys = "You are a YouTube trend analyst. Answer with a single JSON object only.";
            let prompt = build_prompt(item);
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: sys,
                    },
                    Msg {
                        role: "user",
                        content: &prompt,
                    },
                ],
                temperature: 0.4,
                response_format: serde_json::json!({ "type": "json_object" }),
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .context("openai request")?
                .error_for_status()
                .context("openai non-2xx")?;

            let body: Resp = resp.json().await.context("openai response body")?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| anyhow!("openai returned no content"))?;
            parse_insight(&content)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Google Gemini `generateContent`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    /// `model`: defaults to gemini-1.5-flash.
    pub fn new(api_key: String, model: Option<&str>) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.unwrap_or("gemini-1.5-flash").to_string(),
        }
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(&'a self, item: &'a Item) -> AiFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                bail!("GEMINI_API_KEY not set");
            }

            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Content,
            }
            #[derive(Deserialize)]
            struct Content {
                #[serde(default)]
                parts: Vec<Part>,
            }
            #[derive(Deserialize)]
            struct Part {
                #[serde(default)]
                text: String,
            }

            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let req = serde_json::json!({
                "contents": [{ "parts": [{ "text": build_prompt(item) }] }],
                "generationConfig": { "responseMimeType": "application/json" }
            });

            let resp = self
                .http
                .post(url)
                .query(&[("key", self.api_key.as_str())])
                .json(&req)
                .send()
                .await
                .context("gemini request")?
                .error_for_status()
                .context("gemini non-2xx")?;

            let body: Resp = resp.json().await.context("gemini response body")?;
            let text: String = body
                .candidates
                .into_iter()
                .next()
                .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                bail!("gemini returned no text");
            }
            parse_insight(&text)
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Always fails; the gateway turns that into the degraded insight.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn analyze<'a>(&'a self, _item: &'a Item) -> AiFuture<'a> {
        Box::pin(async { Err(anyhow!("enrichment disabled")) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: Insight,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fixed: Insight {
                why_trending: "Strong early velocity (mock).".to_string(),
                emotional_trigger: "Curiosity".to_string(),
                target_audience: "General".to_string(),
                thumbnail_psychology: "High contrast face".to_string(),
                title_strategy: "Curiosity gap".to_string(),
                predicted_performance: "Keeps climbing".to_string(),
                viral_score: 50,
            },
        }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _item: &'a Item) -> AiFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

impl AiClient for MockProvider {
    fn analyze<'a>(&'a self, item: &'a Item) -> AiFuture<'a> {
        self.fetch(item)
    }
    fn provider_name(&self) -> &'static str {
        self.name()
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(dir = %cache_dir.display(), error = %e, "AI cache dir unavailable");
        }
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn analyze_impl(&self, item: &Item) -> Result<Insight> {
        // 1) Cache lookup. Hits do not count against the limit.
        let key = cache_key(&item.id);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            tracing::debug!(item_id = %item.id, "AI cache hit");
            return Ok(hit);
        }

        // 2) Daily limit. The slot is taken before the call so concurrent
        // requests cannot overrun it.
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.is_expired() {
                g.reset_to_today();
            }
            if g.count >= self.daily_limit_max {
                bail!("daily AI limit reached ({})", self.daily_limit_max);
            }
            g.count = g.count.saturating_add(1);
            self.save_counter(&g);
        }

        // 3) Real call. A failed call gives its slot back.
        let fresh = match self.inner.fetch(item).await {
            Ok(fresh) => fresh,
            Err(e) => {
                let mut g = self.counter.lock().expect("poisoned counter");
                g.count = g.count.saturating_sub(1);
                self.save_counter(&g);
                return Err(e);
            }
        };
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh) {
            tracing::debug!(item_id = %item.id, error = %e, "AI cache write failed");
        }
        Ok(fresh)
    }

    fn save_counter(&self, dc: &DailyCounter) {
        if let Err(e) = save_daily_counter(&self.cache_dir, dc) {
            tracing::debug!(count = dc.count, error = %e, "AI daily counter write failed");
        }
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn analyze<'a>(&'a self, item: &'a Item) -> AiFuture<'a> {
        Box::pin(self.analyze_impl(item))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(item_id: &str) -> String {
    let digest = Sha256::digest(item_id.as_bytes());
    digest.iter().take(12).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Insight> {
    let buf = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &Insight) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(value).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    fs::rename(tmp, path)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_vec(dc).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&s)?;
    fs::rename(tmp, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicU32>,
    }

    impl Provider for CountingProvider {
        fn fetch<'a>(&'a self, _item: &'a Item) -> AiFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(MockProvider::default().fixed) })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct SlowProvider {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl Provider for SlowProvider {
        fn fetch<'a>(&'a self, _item: &'a Item) -> AiFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                if fail {
                    bail!("provider down");
                }
                Ok(MockProvider::default().fixed)
            })
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn item(id: &str) -> Item {
        Item::new(id, "t", "2025-01-01T00:00:00Z")
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            10,
        );
        let a = client.analyze(&item("v1")).await.unwrap();
        let b = client.analyze(&item("v1")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_limit_fails_new_calls() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            1,
        );
        assert!(client.analyze(&item("v1")).await.is_ok());
        assert!(client.analyze(&item("v2")).await.is_err());
        // cached item still served
        assert!(client.analyze(&item("v1")).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_respect_daily_limit() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let client = CachingClient::new(
            SlowProvider {
                calls: calls.clone(),
                fail: false,
            },
            dir.path().to_path_buf(),
            2,
        );
        let items: Vec<Item> = (0..4).map(|i| item(&format!("v{i}"))).collect();
        let results = futures::future::join_all(items.iter().map(|it| client.analyze(it))).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_call_releases_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let client = CachingClient::new(
            SlowProvider {
                calls: calls.clone(),
                fail: true,
            },
            dir.path().to_path_buf(),
            1,
        );
        assert!(client.analyze(&item("v1")).await.is_err());
        assert!(client.analyze(&item("v2")).await.is_err());
        // both reached the provider; the first failure did not use up the limit
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.counter.lock().unwrap().count, 0);
    }

    #[tokio::test]
    async fn disabled_client_always_errs() {
        assert!(DisabledClient.analyze(&item("v1")).await.is_err());
    }

    #[test]
    fn cache_key_is_stable_hex() {
        let k = cache_key("abc");
        assert_eq!(k.len(), 24);
        assert_eq!(k, cache_key("abc"));
        assert_ne!(k, cache_key("abd"));
    }
}
