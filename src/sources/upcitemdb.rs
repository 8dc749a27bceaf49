// src/sources/upcitemdb.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::SourceAdapter;
use crate::product::{clean_text, NormalizedProduct};
use crate::query::{QueryKind, SearchQuery};

pub const DEFAULT_BASE_URL: &str = "https://api.upcitemdb.com/prod/trial";

/// UPCitemdb trial API. Barcode only, no ingredient data.
pub struct UpcItemDbSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LookupResp {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    ean: Option<String>,
    title: Option<String>,
    brand: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

impl UpcItemDbSource {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

fn parse_lookup(body: LookupResp) -> Result<Option<NormalizedProduct>> {
    match body.code.as_deref() {
        Some("OK") | None => {}
        Some(code) => {
            return Err(anyhow!(
                "upcitemdb returned {code}: {}",
                body.message.unwrap_or_default()
            ))
        }
    }
    let product = body.items.into_iter().next().map(|it| NormalizedProduct {
        name: clean_text(it.title.as_deref()).unwrap_or_default(),
        brand: clean_text(it.brand.as_deref()),
        barcode: it.ean,
        image_url: it.images.into_iter().next(),
        ..Default::default()
    });
    Ok(product.filter(NormalizedProduct::is_usable))
}

#[async_trait]
impl SourceAdapter for UpcItemDbSource {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>> {
        let SearchQuery::Barcode(code) = query else {
            return Ok(None);
        };
        let url = format!("{}/lookup", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("upc", code.as_str())])
            .send()
            .await
            .context("upcitemdb lookup get()")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: LookupResp = resp
            .error_for_status()
            .context("upcitemdb lookup status")?
            .json()
            .await
            .context("upcitemdb lookup json")?;
        parse_lookup(body)
    }

    fn name(&self) -> &str {
        "UPCitemdb"
    }

    fn supports(&self, kind: QueryKind) -> bool {
        kind == QueryKind::Barcode
    }
}
