// src/lookup/types.rs
use serde::Serialize;

use crate::product::NormalizedProduct;

/// Failure recorded for one source during a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceError {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found {
        product: NormalizedProduct,
        source: String,
        tried: Vec<String>,
    },
    /// Every applicable source was tried without a usable match.
    NotFound {
        tried: Vec<String>,
        errors: Vec<SourceError>,
    },
    /// A newer search for the same key took over; this run stopped early.
    Superseded {
        tried: Vec<String>,
        errors: Vec<SourceError>,
    },
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn tried(&self) -> &[String] {
        match self {
            Self::Found { tried, .. }
            | Self::NotFound { tried, .. }
            | Self::Superseded { tried, .. } => tried,
        }
    }

    pub fn errors(&self) -> &[SourceError] {
        match self {
            Self::Found { .. } => &[],
            Self::NotFound { errors, .. } | Self::Superseded { errors, .. } => errors,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Found { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::NotFound { .. } => "not_found",
            Self::Superseded { .. } => "superseded",
        }
    }
}
