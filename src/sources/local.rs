//! Local catalog adapter: wraps the first-party search endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::SearchConfig;
use crate::sources::{normalize, ModelSource, SourceFetch};
use crate::types::QueryRequest;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

pub struct LocalCatalogSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    models: Vec<Value>,
    #[serde(default)]
    total: u64,
}

impl LocalCatalogSource {
    pub fn new(client: Client, config: &SearchConfig) -> Self {
        Self {
            client,
            base_url: config.local_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn query_params(&self, request: &QueryRequest, budget: usize) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), request.page.to_string()),
            ("limit".to_string(), budget.to_string()),
        ];
        let query = request.query.trim();
        if !query.is_empty() {
            params.push(("q".to_string(), query.to_string()));
        } else if request.material_compatible {
            // browse view with the compatibility toggle on: narrow at the
            // source instead of overfetching and discarding
            params.push(("q".to_string(), "PLA".to_string()));
        }
        if let Some(category) = &request.category_id {
            params.push(("category".to_string(), category.clone()));
        }
        if !request.tag_ids.is_empty() {
            let tags: Vec<&str> = request.tag_ids.iter().map(String::as_str).collect();
            params.push(("tags".to_string(), tags.join(",")));
        }
        if let Some(is_free) = request.is_free {
            params.push(("is_free".to_string(), is_free.to_string()));
        }
        if let Some(min_quality) = request.min_quality {
            params.push(("min_quality".to_string(), min_quality.to_string()));
        }
        if let Some(sort) = request.sort_by {
            params.push(("sort".to_string(), sort.as_str().to_string()));
        }
        params
    }
}

#[async_trait]
impl ModelSource for LocalCatalogSource {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    async fn fetch(&self, request: &QueryRequest, budget: usize) -> anyhow::Result<SourceFetch> {
        let url = format!("{}/api/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.query_params(request, budget))
            .send()
            .await
            .map_err(CatalogError::Request)?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()).into());
        }
        let body: CatalogResponse = response.json().await.map_err(CatalogError::Request)?;

        let items = normalize::decode_local_batch(body.models);
        debug!(count = items.len(), total = body.total, "local catalog answered");
        Ok(SourceFetch {
            items,
            estimated_total: body.total,
        })
    }
}
