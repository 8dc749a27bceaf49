// src/product.rs
//! Normalized product record and the per-source result the orchestrator consumes.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimal product shape shared by every source adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProduct {
    pub name: String,
    pub brand: Option<String>,
    pub barcode: Option<String>,
    pub ingredients: Option<String>,
    /// Nutrient name -> amount per 100 g/ml where the source reports it.
    #[serde(default)]
    pub nutrients: BTreeMap<String, f64>,
    pub image_url: Option<String>,
}

impl NormalizedProduct {
    /// A match is usable when it has a name or an ingredient list.
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty()
            || self
                .ingredients
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Outcome of one adapter call, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source_name: String,
    pub found: bool,
    pub product: Option<NormalizedProduct>,
    pub error_message: Option<String>,
}

impl SourceResult {
    pub fn found(source: &str, product: NormalizedProduct) -> Self {
        Self {
            source_name: source.to_string(),
            found: true,
            product: Some(product),
            error_message: None,
        }
    }

    pub fn not_found(source: &str) -> Self {
        Self {
            source_name: source.to_string(),
            found: false,
            product: None,
            error_message: None,
        }
    }

    pub fn failed(source: &str, message: impl Into<String>) -> Self {
        Self {
            source_name: source.to_string(),
            found: false,
            product: None,
            error_message: Some(message.into()),
        }
    }
}

/// Decode entities, strip tags and collapse whitespace. Empty result maps to `None`.
pub fn clean_text(s: Option<&str>) -> Option<String> {
    let s = s?;
    let decoded = html_escape::decode_html_entities(s);

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let no_tags = re_tags.replace_all(&decoded, " ");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    let out = re_ws.replace_all(&no_tags, " ").trim().to_string();

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Strip leading zeros so UPC-A and EAN-13 forms of the same code compare equal.
pub fn same_gtin(a: &str, b: &str) -> bool {
    let a = a.trim().trim_start_matches('0');
    let b = b.trim().trim_start_matches('0');
    !a.is_empty() && a == b
}
