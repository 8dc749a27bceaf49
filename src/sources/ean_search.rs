// src/sources/ean_search.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::SourceAdapter;
use crate::product::{clean_text, NormalizedProduct};
use crate::query::{QueryKind, SearchQuery};

pub const DEFAULT_BASE_URL: &str = "https://api.ean-search.org/api";

/// ean-search.org barcode lookup. Returns names only.
pub struct EanSearchSource {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    ean: Option<String>,
    name: Option<String>,
    error: Option<String>,
}

impl EanSearchSource {
    pub fn new(client: Client, token: String, base_url: Option<String>) -> Self {
        Self {
            client,
            token,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn parse_hits(hits: Vec<Hit>) -> Result<Option<NormalizedProduct>> {
    let Some(first) = hits.into_iter().next() else {
        return Ok(None);
    };
    if let Some(err) = first.error {
        // The API reports a miss as an error object.
        if err.to_ascii_lowercase().contains("not found") {
            return Ok(None);
        }
        return Err(anyhow!("ean-search error: {err}"));
    }
    let product = NormalizedProduct {
        name: clean_text(first.name.as_deref()).unwrap_or_default(),
        barcode: first.ean,
        ..Default::default()
    };
    Ok(Some(product).filter(NormalizedProduct::is_usable))
}

#[async_trait]
impl SourceAdapter for EanSearchSource {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>> {
        let SearchQuery::Barcode(code) = query else {
            return Ok(None);
        };
        let hits: Vec<Hit> = self
            .client
            .get(&self.base_url)
            .query(&[
                ("token", self.token.as_str()),
                ("op", "barcode-lookup"),
                ("format", "json"),
                ("ean", code.as_str()),
            ])
            .send()
            .await
            .context("ean-search get()")?
            .error_for_status()
            .context("ean-search status")?
            .json()
            .await
            .context("ean-search json")?;
        parse_hits(hits)
    }

    fn name(&self) -> &str {
        "EAN-Search"
    }

    fn supports(&self, kind: QueryKind) -> bool {
        kind == QueryKind::Barcode
    }
}
