//! Crate-level error taxonomy.
//!
//! Network-class source failures never surface here: adapters return them at
//! the `ModelSource` seam and the orchestrator degrades them to empty
//! results. Only contract violations and whole-query outcomes are typed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed `QueryRequest`; a programming error on the caller's side.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Every source actually queried for this generation failed. Distinct
    /// from an empty result page.
    #[error("all search sources unavailable")]
    SourcesUnavailable,

    /// A newer request superseded this one before it completed.
    #[error("query superseded by a newer request")]
    Superseded,

    /// The orchestrator's publication channel is gone (orchestrator dropped
    /// while a waiter was still subscribed).
    #[error("search pipeline shut down")]
    Closed,

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The shared HTTP client could not be constructed.
    #[error("failed to initialize http client: {0}")]
    Init(#[from] reqwest::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;
