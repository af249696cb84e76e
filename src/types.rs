//! Shared data model: canonical items, query requests, result pages.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Which catalog a canonical item came from.
///
/// Consumers branch on this discriminant (e.g. "open externally" instead of
/// favoriting), never on the shape of the id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Local,
    External,
}

/// Display name of a tag attached to an item. Order is kept for display;
/// matching ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
}

impl TagRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The unified search result record, one shape for both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Opaque, unique across both sources within one result set. External
    /// ids carry a fixed prefix so they can never collide with local UUIDs.
    pub id: String,
    pub source: ItemSource,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub download_count: u64,
    /// Mean of submitted review scores, in [1,5]. `None` means no reviews
    /// yet, never 0.
    #[serde(default)]
    pub average_quality: Option<f32>,
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
    /// Provider page for external items; absent for local ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_external_url: Option<String>,
}

impl CanonicalItem {
    /// Lower-cased tag names joined with spaces, the form both the scorer
    /// and the compatibility filter match against.
    pub fn tag_text(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.name.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Requested ordering of the merged result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Relevance,
    Popularity,
    Newest,
    Oldest,
}

impl SortBy {
    /// Wire form, matching the serde representation. Source adapters pass
    /// this through as a query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Popularity => "popularity",
            SortBy::Newest => "newest",
            SortBy::Oldest => "oldest",
        }
    }
}

/// One federated query, built from user input and immutable once issued.
/// Issuing a new request supersedes every older in-flight one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
    #[serde(default)]
    pub is_free: Option<bool>,
    /// Items with a known quality below this are dropped; unreviewed items
    /// always pass.
    #[serde(default)]
    pub min_quality: Option<f32>,
    /// `None` lets the engine pick: popularity for a bare default view,
    /// relevance otherwise.
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    /// 1-based.
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_true")]
    pub material_compatible: bool,
    #[serde(default = "default_true")]
    pub include_external: bool,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            category_id: None,
            tag_ids: BTreeSet::new(),
            is_free: None,
            min_quality: None,
            sort_by: None,
            page: 1,
            page_size: default_page_size(),
            material_compatible: true,
            include_external: true,
        }
    }
}

impl QueryRequest {
    /// Plain text search, everything else defaulted.
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Query words: lower-cased, whitespace-split, empties discarded.
    pub fn query_words(&self) -> Vec<String> {
        self.query
            .trim()
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// True when any facet narrows the result set beyond the defaults.
    /// `material_compatible` is default-on and deliberately not counted.
    pub fn has_active_filters(&self) -> bool {
        self.category_id.is_some()
            || !self.tag_ids.is_empty()
            || self.is_free.is_some()
            || self.min_quality.is_some()
    }

    /// How many items to request from each source: more than one page so
    /// client-side filtering and ranking have something to work with.
    pub fn fetch_budget(&self, overfetch_factor: usize) -> usize {
        self.page_size * overfetch_factor.max(1)
    }

    /// Contract violations are hard errors; everything downstream assumes a
    /// well-formed request.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.page == 0 {
            return Err(SearchError::InvalidQuery("page is 1-based".into()));
        }
        if self.page_size == 0 {
            return Err(SearchError::InvalidQuery("page_size must be positive".into()));
        }
        if let Some(q) = self.min_quality {
            if !(1.0..=5.0).contains(&q) {
                return Err(SearchError::InvalidQuery(format!(
                    "min_quality {q} outside [1,5]"
                )));
            }
        }
        Ok(())
    }
}

/// One page of merged results. `estimated_total` is directional only; the
/// external provider never exposes an exact count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<CanonicalItem>,
    pub estimated_total: u64,
    pub page: usize,
    pub page_size: usize,
}
