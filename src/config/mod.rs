// src/config/mod.rs
//! Application configuration: TOML file + env overrides.
//!
//! Lookup order for the file:
//! 1) $TREND_PULSE_CONFIG
//! 2) config/trend_pulse.toml
//! 3) built-in defaults
//!
//! Then `REGION_CODE`, `CYCLE_INTERVAL_SECS` and `STATE_PATH` override.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "TREND_PULSE_CONFIG";
const DEFAULT_PATH: &str = "config/trend_pulse.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Provider region code (ISO 3166-1 alpha-2).
    pub region: String,
    pub worker: WorkerConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: "IN".to_string(),
            worker: WorkerConfig::default(),
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    /// Run the first cycle right away instead of after one interval.
    pub run_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            run_on_start: true,
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max items per category in a digest.
    pub top_k: usize,
    pub ingest_timeout_secs: u64,
    pub enrich_timeout_secs: u64,
    pub dispatch_timeout_secs: u64,
    pub enrich_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            ingest_timeout_secs: 30,
            enrich_timeout_secs: 20,
            dispatch_timeout_secs: 60,
            enrich_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs.max(1))
    }
    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_secs(self.enrich_timeout_secs.max(1))
    }
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/trends.json"),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// File (env path, default path, or defaults) with env overrides applied.
    pub fn load() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_PATH))?
        } else {
            Self::default()
        };
        base.with_env_overrides().map(Self::sanitized)
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(region) = std::env::var("REGION_CODE") {
            if !region.trim().is_empty() {
                self.region = region.trim().to_ascii_uppercase();
            }
        }
        if let Ok(v) = std::env::var("CYCLE_INTERVAL_SECS") {
            self.worker.interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("CYCLE_INTERVAL_SECS is not a number: {v}"))?;
        }
        if let Ok(p) = std::env::var("STATE_PATH") {
            if !p.trim().is_empty() {
                self.store.path = PathBuf::from(p);
            }
        }
        Ok(self)
    }

    fn sanitized(mut self) -> Self {
        self.worker.interval_secs = self.worker.interval_secs.max(1);
        self.pipeline.top_k = self.pipeline.top_k.max(1);
        self.pipeline.enrich_concurrency = self.pipeline.enrich_concurrency.max(1);
        self
    }
}
