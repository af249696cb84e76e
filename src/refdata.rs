//! Session cache for category and tag reference data.
//!
//! Categories and tags change rarely; request builders read them constantly
//! and the external adapter needs them to turn tag ids into provider slugs.
//! One snapshot serves the whole session until the TTL lapses or a caller
//! invalidates after editing reference data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::SearchConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

struct Snapshot {
    fetched_at: Instant,
    categories: Arc<Vec<Category>>,
    tags: Arc<Vec<TagDef>>,
}

pub struct RefDataCache {
    client: Client,
    base_url: String,
    ttl: Duration,
    inner: Mutex<Option<Snapshot>>,
}

impl RefDataCache {
    pub fn new(client: Client, config: &SearchConfig) -> Self {
        Self {
            client,
            base_url: config.local_base_url.trim_end_matches('/').to_string(),
            ttl: config.refdata.ttl(),
            inner: Mutex::new(None),
        }
    }

    pub async fn categories(&self) -> anyhow::Result<Arc<Vec<Category>>> {
        Ok(self.snapshot().await?.0)
    }

    pub async fn tags(&self) -> anyhow::Result<Arc<Vec<TagDef>>> {
        Ok(self.snapshot().await?.1)
    }

    /// Provider-facing slug for a tag id; `None` when the id is unknown.
    /// Tags without an explicit slug fall back to their lower-cased name.
    pub async fn tag_slug(&self, tag_id: &str) -> anyhow::Result<Option<String>> {
        let tags = self.tags().await?;
        Ok(tags
            .iter()
            .find(|tag| tag.id == tag_id)
            .map(|tag| tag.slug.clone().unwrap_or_else(|| tag.name.to_lowercase())))
    }

    /// Drop the snapshot; the next read refetches. Call after mutating
    /// reference data elsewhere.
    pub async fn invalidate(&self) {
        debug!("reference data invalidated");
        *self.inner.lock().await = None;
    }

    // The lock is held across the refresh on purpose: concurrent readers of
    // an expired snapshot must not stampede the endpoints.
    async fn snapshot(&self) -> anyhow::Result<(Arc<Vec<Category>>, Arc<Vec<TagDef>>)> {
        let mut guard = self.inner.lock().await;
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return Ok((snapshot.categories.clone(), snapshot.tags.clone()));
            }
            debug!("reference data expired, refreshing");
        }

        let (categories, tags) = tokio::try_join!(
            self.fetch_list::<Category>("/api/categories", "categories"),
            self.fetch_list::<TagDef>("/api/tags", "tags"),
        )?;
        debug!(
            categories = categories.len(),
            tags = tags.len(),
            "reference data refreshed"
        );
        let snapshot = Snapshot {
            fetched_at: Instant::now(),
            categories: Arc::new(categories),
            tags: Arc::new(tags),
        };
        let out = (snapshot.categories.clone(), snapshot.tags.clone());
        *guard = Some(snapshot);
        Ok(out)
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str, key: &str) -> anyhow::Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // endpoints wrap the list in an object keyed by resource name, but a
        // bare array is accepted too
        let list = match body.get(key) {
            Some(list) => list.clone(),
            None => body,
        };
        Ok(serde_json::from_value(list)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(base_url: &str, ttl_secs: u64) -> RefDataCache {
        let mut config = SearchConfig::default();
        config.local_base_url = base_url.to_string();
        config.refdata.ttl_secs = ttl_secs;
        RefDataCache::new(Client::new(), &config)
    }

    async fn mock_refdata(
        server: &mut mockito::Server,
        hits: usize,
    ) -> (mockito::Mock, mockito::Mock) {
        let categories = server
            .mock("GET", "/api/categories")
            .with_body(r#"{"categories": [{"id": "c1", "name": "Toys", "slug": "toys"}]}"#)
            .expect(hits)
            .create_async()
            .await;
        let tags = server
            .mock("GET", "/api/tags")
            .with_body(
                r#"{"tags": [
                    {"id": "t1", "name": "Dragons"},
                    {"id": "t2", "name": "Dinosaurs", "slug": "dino"}
                ]}"#,
            )
            .expect(hits)
            .create_async()
            .await;
        (categories, tags)
    }

    #[tokio::test]
    async fn one_snapshot_serves_repeated_reads() {
        let mut server = mockito::Server::new_async().await;
        let (categories_mock, tags_mock) = mock_refdata(&mut server, 1).await;

        let cache = cache(&server.url(), 3600);
        assert_eq!(cache.categories().await.unwrap().len(), 1);
        assert_eq!(cache.categories().await.unwrap().len(), 1);
        assert_eq!(cache.tags().await.unwrap().len(), 2);

        categories_mock.assert_async().await;
        tags_mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let mut server = mockito::Server::new_async().await;
        let (categories_mock, tags_mock) = mock_refdata(&mut server, 2).await;

        let cache = cache(&server.url(), 3600);
        cache.categories().await.unwrap();
        cache.invalidate().await;
        cache.categories().await.unwrap();

        categories_mock.assert_async().await;
        tags_mock.assert_async().await;
    }

    #[tokio::test]
    async fn zero_ttl_never_caches() {
        let mut server = mockito::Server::new_async().await;
        let (categories_mock, _tags_mock) = mock_refdata(&mut server, 2).await;

        let cache = cache(&server.url(), 0);
        cache.tags().await.unwrap();
        cache.tags().await.unwrap();
        categories_mock.assert_async().await;
    }

    #[tokio::test]
    async fn tag_slug_prefers_explicit_slug() {
        let mut server = mockito::Server::new_async().await;
        mock_refdata(&mut server, 1).await;

        let cache = cache(&server.url(), 3600);
        assert_eq!(
            cache.tag_slug("t2").await.unwrap(),
            Some("dino".to_string())
        );
        assert_eq!(
            cache.tag_slug("t1").await.unwrap(),
            Some("dragons".to_string())
        );
        assert_eq!(cache.tag_slug("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bare_arrays_are_accepted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/categories")
            .with_body(r#"[{"id": "c1", "name": "Toys"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/tags")
            .with_body("[]")
            .create_async()
            .await;

        let cache = cache(&server.url(), 3600);
        assert_eq!(cache.categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn endpoint_failure_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/categories")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/api/tags")
            .with_body("[]")
            .create_async()
            .await;

        let cache = cache(&server.url(), 3600);
        assert!(cache.categories().await.is_err());
    }
}
