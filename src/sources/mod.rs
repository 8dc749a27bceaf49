// src/sources/mod.rs
//! External food databases behind one adapter contract, plus the registry that
//! turns configuration into an ordered adapter list.

pub mod ean_search;
pub mod fixture;
pub mod openfoodfacts;
pub mod types;
pub mod upcitemdb;
pub mod usda;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::LookupConfig;
use crate::product::NormalizedProduct;

pub use ean_search::EanSearchSource;
pub use fixture::{Behavior, StaticSource};
pub use openfoodfacts::OpenFoodFactsSource;
pub use types::SourceAdapter;
pub use upcitemdb::UpcItemDbSource;
pub use usda::UsdaSource;

pub type DynSource = Arc<dyn SourceAdapter>;

/// Shared HTTP client for all adapters. Open Food Facts rejects anonymous
/// user agents.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("processed-or-not/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(request_timeout)
        .build()
        .context("building http client")
}

/// Build adapters in the configured priority order. Unknown names and
/// sources without credentials are skipped with a warning.
pub fn build_sources(cfg: &LookupConfig, client: &reqwest::Client) -> Result<Vec<DynSource>> {
    let mut out: Vec<DynSource> = Vec::with_capacity(cfg.sources.len());
    for name in &cfg.sources {
        let source: DynSource = match name.as_str() {
            "openfoodfacts" | "off" => Arc::new(OpenFoodFactsSource::new(
                client.clone(),
                cfg.base_urls.openfoodfacts.clone(),
            )),
            "usda" => match cfg.usda_api_key() {
                Some(key) => Arc::new(UsdaSource::new(
                    client.clone(),
                    key,
                    cfg.base_urls.usda.clone(),
                )),
                None => {
                    warn!(target: "sources", source = "usda", "no API key configured; skipping");
                    continue;
                }
            },
            "upcitemdb" => Arc::new(UpcItemDbSource::new(
                client.clone(),
                cfg.base_urls.upcitemdb.clone(),
            )),
            "ean-search" | "ean_search" => match cfg.ean_search_token() {
                Some(token) => Arc::new(EanSearchSource::new(
                    client.clone(),
                    token,
                    cfg.base_urls.ean_search.clone(),
                )),
                None => {
                    warn!(
                        target: "sources",
                        source = "ean-search",
                        "no token configured; skipping"
                    );
                    continue;
                }
            },
            "fixture" => {
                let Some(path) = cfg.fixture_path.as_deref() else {
                    warn!(target: "sources", source = "fixture", "fixture_path not set; skipping");
                    continue;
                };
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("reading fixture catalog {}", path.display()))?;
                let catalog: HashMap<String, NormalizedProduct> =
                    serde_json::from_str(&data).context("parsing fixture catalog")?;
                Arc::new(StaticSource::new("Fixture", Behavior::Catalog(catalog)))
            }
            other => {
                warn!(target: "sources", source = other, "unknown source name; skipping");
                continue;
            }
        };
        out.push(source);
    }
    Ok(out)
}

/// Most name-similar usable candidate (Jaro-Winkler on lowercase names). Ties
/// keep the earlier candidate, i.e. the source's own ranking.
pub(crate) fn best_by_name(
    candidates: Vec<NormalizedProduct>,
    query: &str,
) -> Option<NormalizedProduct> {
    let query = query.to_lowercase();
    let mut best: Option<(f64, NormalizedProduct)> = None;
    for p in candidates.into_iter().filter(NormalizedProduct::is_usable) {
        let score = strsim::jaro_winkler(&p.name.to_lowercase(), &query);
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, p));
        }
    }
    best.map(|(_, p)| p)
}
