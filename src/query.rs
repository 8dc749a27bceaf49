// src/query.rs
//! Search input normalization: decides barcode vs. free text and produces the
//! key that correlates a search, its progress entry and its subscribers.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

/// Barcode lengths we accept: EAN-8, UPC-E/A, EAN-13, GTIN-14.
const BARCODE_LEN: std::ops::RangeInclusive<usize> = 8..=14;

/// Cap for free-text queries (chars).
const MAX_TEXT_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Barcode,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Digits only.
    Barcode(String),
    /// Lowercased, whitespace-collapsed.
    Text(String),
}

impl SearchQuery {
    /// Normalize raw user input. Returns `None` for empty input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let compact: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if BARCODE_LEN.contains(&compact.len()) && compact.chars().all(|c| c.is_ascii_digit()) {
            return Some(Self::Barcode(compact));
        }

        static RE_WS: OnceCell<Regex> = OnceCell::new();
        let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
        let mut text = re_ws.replace_all(trimmed, " ").to_lowercase();
        if text.chars().count() > MAX_TEXT_LEN {
            text = text.chars().take(MAX_TEXT_LEN).collect();
        }
        Some(Self::Text(text))
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            Self::Barcode(_) => QueryKind::Barcode,
            Self::Text(_) => QueryKind::Text,
        }
    }

    /// Progress key for this query.
    pub fn key(&self) -> &str {
        match self {
            Self::Barcode(s) | Self::Text(s) => s,
        }
    }

    /// Value safe to put into logs. Free text is hashed, barcodes are not.
    pub fn log_id(&self) -> String {
        match self {
            Self::Barcode(code) => code.clone(),
            Self::Text(text) => format!("text:{}", anon_hash(text)),
        }
    }
}

/// Short SHA-256 prefix used to correlate free-text searches in logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
