//! trend-pulse service entrypoint.
//! Loads config, opens the state file, spawns the worker loop and serves the
//! query/admin router.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_pulse::ai_adapter::build_client_from_config;
use trend_pulse::api::{self, AppState};
use trend_pulse::config::{ai::AiConfig, AppConfig};
use trend_pulse::enrich::EnrichmentGateway;
use trend_pulse::ingest::providers::YouTubeProvider;
use trend_pulse::ingest::types::TrendSource;
use trend_pulse::metrics::Metrics;
use trend_pulse::{JsonFileStore, NotifierMux, Pipeline, TrendStore, Worker};

const EMPTY_CHART: &str = r#"{"items": []}"#;

/// `RUST_LOG` filter (default `trend_pulse=info,warn`), `LOG_FORMAT=json` for JSON lines.
/// Uses `try_init` so a subscriber installed by the runtime takes precedence.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trend_pulse=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Live API when `YOUTUBE_API_KEY` is set, else `YOUTUBE_FIXTURE_PATH`, else an empty chart.
fn build_source() -> anyhow::Result<Arc<dyn TrendSource>> {
    if let Some(p) = YouTubeProvider::from_env() {
        return Ok(Arc::new(p));
    }
    if let Ok(path) = std::env::var("YOUTUBE_FIXTURE_PATH") {
        let body = std::fs::read_to_string(Path::new(&path))
            .with_context(|| format!("reading YOUTUBE_FIXTURE_PATH {path}"))?;
        tracing::info!(%path, "using youtube fixture");
        return Ok(Arc::new(YouTubeProvider::from_fixture(&body)));
    }
    tracing::warn!("YOUTUBE_API_KEY not set, ingesting an empty chart");
    Ok(Arc::new(YouTubeProvider::from_fixture(EMPTY_CHART)))
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load().context("loading trend-pulse config")?;
    let ai_cfg = AiConfig::load_default().context("loading AI config")?;

    let metrics = match Metrics::init(cfg.worker.interval_secs) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let store: Arc<dyn TrendStore> = Arc::new(
        JsonFileStore::open(&cfg.store.path)
            .await
            .context("opening trend store")?,
    );

    let ai = build_client_from_config(&ai_cfg);
    let enrichment = EnrichmentGateway::new(
        ai,
        cfg.pipeline.enrich_timeout(),
        cfg.pipeline.enrich_concurrency,
    );
    let mux = NotifierMux::from_env().context("configuring notifiers")?;
    tracing::info!(
        region = %cfg.region,
        ai = enrichment.provider_name(),
        channels = ?mux.channel_names(),
        "trend-pulse starting"
    );

    let pipeline = Arc::new(Pipeline::new(
        build_source()?,
        Arc::clone(&store),
        enrichment,
        Arc::new(mux),
        cfg.region.clone(),
        cfg.pipeline,
    ));
    let stage = pipeline.subscribe_stage();

    // The handle is dropped at the end of startup; the worker keeps running
    // for the life of the runtime.
    let worker = Worker::new(Arc::clone(&pipeline), &cfg.worker).spawn();
    let state = AppState::new(store, worker.trigger_handle(), stage);

    let mut router = api::create_router(state);
    if let Some(m) = &metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
