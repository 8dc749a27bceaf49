// src/config/lookup.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const DEFAULT_LOOKUP_CONFIG_PATH: &str = "config/lookup.toml";
pub const ENV_LOOKUP_CONFIG_PATH: &str = "LOOKUP_CONFIG_PATH";
pub const ENV_SOURCE_TIMEOUT_MS: &str = "LOOKUP_SOURCE_TIMEOUT_MS";
pub const ENV_PROGRESS_TTL_SECS: &str = "LOOKUP_PROGRESS_TTL_SECS";

fn default_source_timeout_ms() -> u64 {
    8_000
}
fn default_progress_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    64
}
fn default_history_capacity() -> usize {
    200
}
fn default_env_secret() -> Option<String> {
    Some("ENV".to_string())
}
fn default_sources() -> Vec<String> {
    ["openfoodfacts", "usda", "upcitemdb", "ean-search"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Lookup service settings (`config/lookup.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_progress_ttl_secs")]
    pub progress_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Adapter names in priority order.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// "ENV" means: read from USDA_API_KEY.
    #[serde(default = "default_env_secret")]
    pub usda_api_key: Option<String>,
    /// "ENV" means: read from EAN_SEARCH_TOKEN.
    #[serde(default = "default_env_secret")]
    pub ean_search_token: Option<String>,
    /// JSON catalog for the offline `fixture` source.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    #[serde(default)]
    pub base_urls: BaseUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseUrls {
    pub openfoodfacts: Option<String>,
    pub usda: Option<String>,
    pub upcitemdb: Option<String>,
    pub ean_search: Option<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout_ms(),
            progress_ttl_secs: default_progress_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            channel_capacity: default_channel_capacity(),
            history_capacity: default_history_capacity(),
            sources: default_sources(),
            usda_api_key: default_env_secret(),
            ean_search_token: default_env_secret(),
            fixture_path: None,
            base_urls: BaseUrls::default(),
        }
    }
}

impl LookupConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading lookup config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: LookupConfig = toml::from_str(s).context("parsing lookup config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// 1) $LOOKUP_CONFIG_PATH (must exist)
    /// 2) config/lookup.toml
    /// 3) built-in defaults
    ///
    /// Env overrides for timeout/TTL are applied last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_LOOKUP_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_LOOKUP_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_LOOKUP_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_LOOKUP_CONFIG_PATH)?
        } else {
            Self::default()
        };

        if let Some(ms) = env_u64(ENV_SOURCE_TIMEOUT_MS) {
            cfg.source_timeout_ms = ms;
        }
        if let Some(secs) = env_u64(ENV_PROGRESS_TTL_SECS) {
            cfg.progress_ttl_secs = secs;
        }
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if self.source_timeout_ms == 0 {
            self.source_timeout_ms = default_source_timeout_ms();
        }
        if self.progress_ttl_secs == 0 {
            self.progress_ttl_secs = default_progress_ttl_secs();
        }
        if self.sweep_interval_secs == 0 {
            self.sweep_interval_secs = default_sweep_interval_secs();
        }
        self.channel_capacity = self.channel_capacity.max(1);

        // Normalize names; drop blanks and repeats but keep first-seen order.
        let mut seen = std::collections::HashSet::new();
        self.sources = std::mem::take(&mut self.sources)
            .into_iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn usda_api_key(&self) -> Option<String> {
        resolve_secret(self.usda_api_key.as_deref(), "USDA_API_KEY")
    }

    pub fn ean_search_token(&self) -> Option<String> {
        resolve_secret(self.ean_search_token.as_deref(), "EAN_SEARCH_TOKEN")
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// `"ENV"` reads `env_name`; blank values count as missing.
fn resolve_secret(raw: Option<&str>, env_name: &str) -> Option<String> {
    let raw = raw?.trim();
    let value = if raw.eq_ignore_ascii_case("env") {
        env::var(env_name).ok()?
    } else {
        raw.to_string()
    };
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}
