// src/sources/types.rs
use anyhow::Result;

use crate::product::NormalizedProduct;
use crate::query::{QueryKind, SearchQuery};

/// One external food database. `Ok(None)` means "not found"; any `Err` is
/// recorded as this source's failure and the lookup moves on.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>>;

    fn name(&self) -> &str;

    fn supports(&self, kind: QueryKind) -> bool {
        let _ = kind;
        true
    }
}
