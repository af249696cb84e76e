//! External provider adapter.
//!
//! Talks to a Thingiverse-style API: paginated full-text search, a detail
//! endpoint per thing, and tag-scoped search by slug. Search hits often omit
//! download counts, so a bounded backfill pass fills the gap from the detail
//! endpoint, sequentially and staggered; the provider rate-limits bursts.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::join_all;
use lru::LruCache;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::{BackfillConfig, SearchConfig};
use crate::refdata::RefDataCache;
use crate::sources::normalize::{self, ExternalRecord};
use crate::sources::{ModelSource, SourceFetch};
use crate::types::{QueryRequest, SortBy};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider quota exceeded")]
    QuotaExceeded,
    #[error("provider rejected the access token")]
    InvalidToken,
    #[error("provider returned HTTP {0}")]
    Status(StatusCode),
}

pub struct ExternalProviderSource {
    client: Client,
    base_url: String,
    token: Option<String>,
    page_size: usize,
    max_pages: usize,
    backfill: BackfillConfig,
    /// Download counts resolved earlier this session, keyed by native id.
    detail_cache: Mutex<LruCache<u64, u64>>,
    refdata: Option<Arc<RefDataCache>>,
}

struct ProviderPage {
    records: Vec<ExternalRecord>,
    total: u64,
}

impl ExternalProviderSource {
    pub fn new(client: Client, config: &SearchConfig) -> Self {
        let capacity = NonZeroUsize::new(config.backfill.cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            base_url: config.external_base_url.trim_end_matches('/').to_string(),
            token: config.external_token.clone(),
            page_size: config.external.page_size.max(1),
            max_pages: config.external.max_pages.max(1),
            backfill: config.backfill.clone(),
            detail_cache: Mutex::new(LruCache::new(capacity)),
            refdata: None,
        }
    }

    /// Attach the reference-data cache used to turn tag ids into provider
    /// slugs. Without it, tag filters simply widen the external search.
    pub fn with_refdata(mut self, refdata: Arc<RefDataCache>) -> Self {
        self.refdata = Some(refdata);
        self
    }

    async fn resolve_tag(&self, request: &QueryRequest) -> Option<String> {
        let tag_id = request.tag_ids.iter().next()?;
        let refdata = self.refdata.as_ref()?;
        match refdata.tag_slug(tag_id).await {
            Ok(slug) => slug,
            Err(err) => {
                debug!(error = %err, "tag slug lookup failed, searching untagged");
                None
            }
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        page: usize,
        sort: &str,
        tag: Option<&str>,
    ) -> Result<ProviderPage, ProviderError> {
        let url = format!("{}/search/{}", self.base_url, urlencoding::encode(query));
        let mut params = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), self.page_size.to_string()),
            ("sort".to_string(), sort.to_string()),
        ];
        if let Some(tag) = tag {
            params.push(("tag".to_string(), tag.to_string()));
        }
        if let Some(token) = &self.token {
            params.push(("access_token".to_string(), token.clone()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: Value = response.json().await?;
                let (hits, total) = decode_envelope(&body);
                Ok(ProviderPage {
                    records: normalize::decode_external_batch(&hits),
                    total,
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::QuotaExceeded),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::InvalidToken),
            status => Err(ProviderError::Status(status)),
        }
    }

    async fn fetch_detail(&self, id: u64, timeout: Duration) -> Result<u64, ProviderError> {
        let url = format!("{}/things/{}", self.base_url, id);
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(token) = &self.token {
            params.push(("access_token".to_string(), token.clone()));
        }
        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(timeout)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ProviderError::Status(response.status()));
        }
        let body: Value = response.json().await?;
        // the detail payload has used several names for this field
        Ok(["download_count", "downloads", "download_count_total", "downloads_count"]
            .iter()
            .find_map(|key| body.get(key).and_then(Value::as_u64))
            .unwrap_or(0))
    }

    /// Fill missing download counts from the detail endpoint: cached values
    /// first, then at most `max_items` live fetches, one at a time with a
    /// stagger between them and a wall-clock deadline over the whole pass.
    /// Items past either bound keep a zero count.
    async fn backfill_download_counts(&self, records: &mut [ExternalRecord]) {
        let mut pending: Vec<(usize, u64)> = Vec::new();
        {
            let mut cache = self.detail_cache.lock().await;
            for (index, record) in records.iter_mut().enumerate() {
                if record.download_count.is_some() {
                    continue;
                }
                let id = match record.id {
                    Some(id) => id,
                    None => continue,
                };
                match cache.get(&id) {
                    Some(count) => record.download_count = Some(*count),
                    None => pending.push((index, id)),
                }
            }
        }
        if pending.is_empty() {
            return;
        }

        let pending_len = pending.len();
        let started = Instant::now();
        for (position, (index, id)) in pending.into_iter().enumerate() {
            if position >= self.backfill.max_items {
                debug!(skipped = pending_len - position, "backfill budget exhausted");
                break;
            }
            let remaining = self.backfill.max_wait().saturating_sub(started.elapsed());
            if remaining.is_zero() {
                debug!(skipped = pending_len - position, "backfill deadline reached");
                break;
            }
            if position > 0 {
                tokio::time::sleep(self.backfill.stagger()).await;
            }
            match self.fetch_detail(id, remaining).await {
                Ok(count) => {
                    records[index].download_count = Some(count);
                    self.detail_cache.lock().await.put(id, count);
                }
                Err(err) => {
                    debug!(thing = id, error = %err, "download count backfill failed");
                }
            }
        }
    }
}

#[async_trait]
impl ModelSource for ExternalProviderSource {
    fn name(&self) -> &'static str {
        "external"
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    async fn fetch(&self, request: &QueryRequest, budget: usize) -> anyhow::Result<SourceFetch> {
        let query = request.query.trim();
        if query.is_empty() {
            // the provider needs a search term; browsing is local-only
            return Ok(SourceFetch::default());
        }

        let tag = self.resolve_tag(request).await;
        let sort = provider_sort(request.sort_by);
        let pages = ((budget + self.page_size - 1) / self.page_size).clamp(1, self.max_pages);

        let fetches = (1..=pages).map(|page| self.fetch_page(query, page, sort, tag.as_deref()));
        let outcomes = join_all(fetches).await;

        let mut records = Vec::new();
        let mut total = 0u64;
        let mut failures = 0;
        let mut last_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(page) => {
                    total = total.max(page.total);
                    records.extend(page.records);
                }
                Err(err) => {
                    failures += 1;
                    warn!(error = %err, "external page fetch failed");
                    last_error = Some(err);
                }
            }
        }
        if failures == pages {
            return Err(match last_error {
                Some(err) => anyhow::Error::new(err)
                    .context(format!("all {pages} external page fetches failed")),
                None => anyhow!("all {pages} external page fetches failed"),
            });
        }

        self.backfill_download_counts(&mut records).await;
        let items: Vec<_> = records
            .into_iter()
            .filter_map(normalize::external_item)
            .collect();
        debug!(count = items.len(), total, "external provider answered");
        Ok(SourceFetch {
            items,
            estimated_total: total,
        })
    }
}

/// Provider-side sort hint. It only pre-orders the overfetched window; the
/// merge engine re-sorts everything anyway.
fn provider_sort(sort: Option<SortBy>) -> &'static str {
    match sort {
        Some(SortBy::Popularity) => "popular",
        Some(SortBy::Newest) => "newest",
        _ => "relevant",
    }
}

/// The provider has shipped several envelope shapes over time; accept the
/// known ones and treat anything else as an empty page.
fn decode_envelope(body: &Value) -> (Vec<Value>, u64) {
    if let Some(array) = body.as_array() {
        return (array.clone(), array.len() as u64);
    }
    for key in ["hits", "results", "things"] {
        if let Some(hits) = body.get(key).and_then(Value::as_array) {
            let total = body
                .get("total")
                .and_then(Value::as_u64)
                .unwrap_or(hits.len() as u64);
            return (hits.clone(), total);
        }
    }
    warn!("unrecognized external response shape");
    (Vec::new(), 0)
}
