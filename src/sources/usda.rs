// src/sources/usda.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{best_by_name, SourceAdapter};
use crate::product::{clean_text, same_gtin, NormalizedProduct};
use crate::query::SearchQuery;

pub const DEFAULT_BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";

/// USDA FoodData Central. Barcodes are matched against the branded-food GTIN.
pub struct UsdaSource {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default)]
    foods: Vec<Food>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Food {
    description: Option<String>,
    brand_owner: Option<String>,
    brand_name: Option<String>,
    gtin_upc: Option<String>,
    ingredients: Option<String>,
    #[serde(default)]
    food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoodNutrient {
    nutrient_name: Option<String>,
    value: Option<f64>,
}

impl UsdaSource {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn search(&self, query: &str) -> Result<SearchResp> {
        let url = format!("{}/foods/search", self.base_url);
        self.client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("query", query),
                ("pageSize", "10"),
            ])
            .send()
            .await
            .context("usda search get()")?
            .error_for_status()
            .context("usda search status")?
            .json()
            .await
            .context("usda search json")
    }
}

fn normalize(f: Food) -> NormalizedProduct {
    let nutrients = f
        .food_nutrients
        .into_iter()
        .filter_map(|n| Some((n.nutrient_name?.trim().to_string(), n.value?)))
        .filter(|(name, _)| !name.is_empty())
        .collect();
    NormalizedProduct {
        name: clean_text(f.description.as_deref()).unwrap_or_default(),
        brand: clean_text(f.brand_name.as_deref()).or_else(|| clean_text(f.brand_owner.as_deref())),
        barcode: f.gtin_upc.filter(|g| !g.is_empty()),
        ingredients: clean_text(f.ingredients.as_deref()),
        nutrients,
        image_url: None,
    }
}

fn pick_by_gtin(body: SearchResp, code: &str) -> Option<NormalizedProduct> {
    body.foods
        .into_iter()
        .find(|f| f.gtin_upc.as_deref().is_some_and(|g| same_gtin(g, code)))
        .map(normalize)
        .filter(NormalizedProduct::is_usable)
}

fn pick_by_text(body: SearchResp, text: &str) -> Option<NormalizedProduct> {
    best_by_name(body.foods.into_iter().map(normalize).collect(), text)
}

#[async_trait]
impl SourceAdapter for UsdaSource {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>> {
        match query {
            SearchQuery::Barcode(code) => Ok(pick_by_gtin(self.search(code).await?, code)),
            SearchQuery::Text(text) => Ok(pick_by_text(self.search(text).await?, text)),
        }
    }

    fn name(&self) -> &str {
        "USDA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"foods": [
        {"description": "COLA", "brandOwner": "Other Co", "gtinUpc": "012000001291",
         "foodNutrients": [{"nutrientName": "Sugars, total", "value": 10.6, "unitName": "G"}]},
        {"description": "DIET COLA", "brandName": "Fizz", "gtinUpc": "0049000028911",
         "ingredients": "CARBONATED WATER, CARAMEL COLOR",
         "foodNutrients": [{"nutrientName": "Energy", "value": 0.0}, {"nutrientName": "Sodium"}]}
    ]}"#;

    #[test]
    fn barcode_requires_matching_gtin() {
        let body: SearchResp = serde_json::from_str(BODY).unwrap();
        let p = pick_by_gtin(body, "049000028911").unwrap();
        assert_eq!(p.name, "DIET COLA");
        assert_eq!(p.brand.as_deref(), Some("Fizz"));
        assert_eq!(p.nutrients.len(), 1);

        let body: SearchResp = serde_json::from_str(BODY).unwrap();
        assert!(pick_by_gtin(body, "8720600618161").is_none());
    }

    #[test]
    fn text_uses_name_similarity() {
        let body: SearchResp = serde_json::from_str(BODY).unwrap();
        let p = pick_by_text(body, "cola").unwrap();
        assert_eq!(p.name, "COLA");
        assert_eq!(p.brand.as_deref(), Some("Other Co"));
        assert_eq!(p.nutrients.get("Sugars, total"), Some(&10.6));
    }
}
