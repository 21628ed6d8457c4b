// src/config/ai.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const ENV_PATH: &str = "AI_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/ai.json";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_daily_limit() -> u32 {
    50
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "gemini" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Real provider calls per UTC day; cache hits are free.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY / GEMINI_API_KEY (by provider)
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: None,
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading AI config from {}", path.display()))?;
        let cfg: AiConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing AI config {}", path.display()))?;
        cfg.normalized()
    }

    /// 1) $AI_CONFIG_PATH
    /// 2) config/ai.json
    /// 3) disabled defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let p = Path::new(DEFAULT_PATH);
        if p.exists() {
            return Self::load_from_file(p);
        }
        Ok(Self::default())
    }

    fn normalized(mut self) -> Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        // Only resolve secrets when they will actually be used.
        if self.enabled && self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("Missing OPENAI_API_KEY env var"))?,
                "gemini" => env::var("GEMINI_API_KEY")
                    .map_err(|_| anyhow!("Missing GEMINI_API_KEY env var"))?,
                other => bail!("Unsupported provider in config: {other}"),
            };
        }

        if self.daily_limit == 0 {
            self.daily_limit = default_daily_limit();
        }
        Ok(self)
    }
}
