// src/sources/openfoodfacts.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::{best_by_name, SourceAdapter};
use crate::product::{clean_text, NormalizedProduct};
use crate::query::SearchQuery;

pub const DEFAULT_BASE_URL: &str = "https://world.openfoodfacts.org";

/// Open Food Facts: primary aggregator, supports barcode and text.
pub struct OpenFoodFactsSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProductResp {
    #[serde(default)]
    status: i64,
    product: Option<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default)]
    products: Vec<OffProduct>,
}

#[derive(Debug, Default, Deserialize)]
struct OffProduct {
    code: Option<String>,
    product_name: Option<String>,
    brands: Option<String>,
    ingredients_text: Option<String>,
    #[serde(default)]
    nutriments: HashMap<String, serde_json::Value>,
    image_url: Option<String>,
}

impl OpenFoodFactsSource {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn by_barcode(&self, code: &str) -> Result<Option<NormalizedProduct>> {
        let url = format!("{}/api/v2/product/{}.json", self.base_url, code);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("openfoodfacts product get()")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ProductResp = resp
            .error_for_status()
            .context("openfoodfacts product status")?
            .json()
            .await
            .context("openfoodfacts product json")?;
        Ok(parse_product_resp(body, code))
    }

    async fn by_text(&self, text: &str) -> Result<Option<NormalizedProduct>> {
        let url = format!("{}/cgi/search.pl", self.base_url);
        let body: SearchResp = self
            .client
            .get(&url)
            .query(&[
                ("search_terms", text),
                ("search_simple", "1"),
                ("action", "process"),
                ("json", "1"),
                ("page_size", "10"),
            ])
            .send()
            .await
            .context("openfoodfacts search get()")?
            .error_for_status()
            .context("openfoodfacts search status")?
            .json()
            .await
            .context("openfoodfacts search json")?;
        Ok(pick_search_hit(body, text))
    }
}

fn parse_product_resp(body: ProductResp, code: &str) -> Option<NormalizedProduct> {
    if body.status != 1 {
        return None;
    }
    let mut product = normalize(body.product?);
    product.barcode.get_or_insert_with(|| code.to_string());
    Some(product)
}

fn pick_search_hit(body: SearchResp, text: &str) -> Option<NormalizedProduct> {
    let candidates = body.products.into_iter().map(normalize).collect();
    best_by_name(candidates, text)
}

fn normalize(p: OffProduct) -> NormalizedProduct {
    NormalizedProduct {
        name: clean_text(p.product_name.as_deref()).unwrap_or_default(),
        brand: clean_text(p.brands.as_deref()),
        barcode: p.code.filter(|c| !c.is_empty()),
        ingredients: clean_text(p.ingredients_text.as_deref()),
        nutrients: per_100g(&p.nutriments),
        image_url: p.image_url.filter(|u| !u.is_empty()),
    }
}

/// Keep `<nutrient>_100g` numeric values, keyed by the bare nutrient name.
fn per_100g(raw: &HashMap<String, serde_json::Value>) -> BTreeMap<String, f64> {
    raw.iter()
        .filter_map(|(k, v)| {
            let name = k.strip_suffix("_100g")?;
            let amount = match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }?;
            Some((name.to_string(), amount))
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for OpenFoodFactsSource {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>> {
        match query {
            SearchQuery::Barcode(code) => self.by_barcode(code).await,
            SearchQuery::Text(text) => self.by_text(text).await,
        }
    }

    fn name(&self) -> &str {
        "OpenFoodFacts"
    }
}
