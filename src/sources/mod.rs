//! Search sources: the common fetch seam and the concrete adapters.

pub mod external;
pub mod local;
pub mod normalize;

use async_trait::async_trait;

use crate::types::{CanonicalItem, QueryRequest};

/// One source's answer for one query generation.
#[derive(Debug, Clone, Default)]
pub struct SourceFetch {
    /// Already normalized; merge order inside the vec is the source's own
    /// ranking and is preserved downstream.
    pub items: Vec<CanonicalItem>,
    /// Source-declared total, 0 when the source does not know.
    pub estimated_total: u64,
}

/// A queryable model catalog. Implementations normalize their own records;
/// the orchestrator never sees provider-shaped data.
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Fetch up to `budget` candidates for `request`. Network-level failures
    /// surface as `Err`; the caller degrades those to an empty contribution
    /// rather than failing the whole search.
    async fn fetch(&self, request: &QueryRequest, budget: usize) -> anyhow::Result<SourceFetch>;
}

#[cfg(test)]
mod tests;
