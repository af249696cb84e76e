//! Query orchestration: one generation per submitted request.
//!
//! Every submit bumps a generation counter, aborts the previous in-flight
//! driver, and spawns a new one. A driver fans out to both sources, publishes
//! a partial page as soon as the local source answers (if the external one is
//! still pending), then a complete page after the merge. Publication goes
//! through a guard that re-checks the generation under the same lock submit
//! uses to bump it, so a stale generation can never reach subscribers, even
//! when its driver races the abort.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::merge::MergeEngine;
use crate::refdata::RefDataCache;
use crate::sources::external::ExternalProviderSource;
use crate::sources::local::LocalCatalogSource;
use crate::sources::{ModelSource, SourceFetch};
use crate::types::{QueryRequest, ResultPage};

/// What subscribers observe. Per generation at most one `Partial`, then
/// exactly one `Complete` or `Failed`.
#[derive(Debug, Clone)]
pub enum SearchUpdate {
    /// Nothing submitted yet.
    Idle,
    /// Local data only; the external source is still in flight.
    Partial { generation: u64, page: ResultPage },
    /// The final page for this generation.
    Complete { generation: u64, page: ResultPage },
    /// Every source actually queried for this generation failed.
    Failed { generation: u64 },
}

impl SearchUpdate {
    pub fn generation(&self) -> Option<u64> {
        match self {
            SearchUpdate::Idle => None,
            SearchUpdate::Partial { generation, .. }
            | SearchUpdate::Complete { generation, .. }
            | SearchUpdate::Failed { generation } => Some(*generation),
        }
    }

    pub fn page(&self) -> Option<&ResultPage> {
        match self {
            SearchUpdate::Partial { page, .. } | SearchUpdate::Complete { page, .. } => Some(page),
            _ => None,
        }
    }
}

struct Shared {
    generation: AtomicU64,
    sender: watch::Sender<SearchUpdate>,
    /// Driver handle of the current generation. Doubles as the publication
    /// lock: submit bumps the generation and publish re-checks it under the
    /// same guard.
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Send `update` unless `generation` is no longer current. Returns
    /// whether the update went out.
    fn publish(&self, generation: u64, update: SearchUpdate) -> bool {
        let _slot = self.slot.lock().unwrap();
        if self.superseded(generation) {
            debug!(generation, "dropping publication from a superseded generation");
            return false;
        }
        self.sender.send_replace(update);
        true
    }
}

pub struct FederatedSearch {
    local: Arc<dyn ModelSource>,
    external: Arc<dyn ModelSource>,
    engine: Arc<MergeEngine>,
    refdata: Arc<RefDataCache>,
    overfetch_factor: usize,
    shared: Arc<Shared>,
}

impl FederatedSearch {
    /// Wire the default HTTP adapters from `config`.
    pub fn from_config(config: SearchConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .build()?;
        let refdata = Arc::new(RefDataCache::new(client.clone(), &config));
        let local: Arc<dyn ModelSource> =
            Arc::new(LocalCatalogSource::new(client.clone(), &config));
        let external: Arc<dyn ModelSource> = Arc::new(
            ExternalProviderSource::new(client, &config).with_refdata(refdata.clone()),
        );
        info!(
            local = %config.local_base_url,
            external = %config.external_base_url,
            "search adapters wired"
        );
        Ok(Self::new(local, external, refdata, config.overfetch_factor))
    }

    /// Assemble from explicit sources. Tests inject stubs here.
    pub fn new(
        local: Arc<dyn ModelSource>,
        external: Arc<dyn ModelSource>,
        refdata: Arc<RefDataCache>,
        overfetch_factor: usize,
    ) -> Self {
        let (sender, _) = watch::channel(SearchUpdate::Idle);
        Self {
            local,
            external,
            engine: Arc::new(MergeEngine::default()),
            refdata,
            overfetch_factor: overfetch_factor.max(1),
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                sender,
                slot: Mutex::new(None),
            }),
        }
    }

    /// Reference data for request-builder UIs (category and tag lists).
    pub fn refdata(&self) -> &Arc<RefDataCache> {
        &self.refdata
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchUpdate> {
        self.shared.sender.subscribe()
    }

    pub fn current_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Start a new query generation, superseding any in-flight one. Returns
    /// the generation number whose updates to watch for. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, request: QueryRequest) -> SearchResult<u64> {
        request.validate()?;
        let budget = request.fetch_budget(self.overfetch_factor);

        let mut slot = self.shared.slot.lock().unwrap();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        debug!(generation, query = %request.query, "search submitted");
        *slot = Some(tokio::spawn(run_generation(
            self.shared.clone(),
            self.local.clone(),
            self.external.clone(),
            self.engine.clone(),
            request,
            generation,
            budget,
        )));
        Ok(generation)
    }

    /// Submit and wait for this generation's final outcome. Partial pages are
    /// skipped; a newer submission aborts the wait with `Superseded`.
    pub async fn search_once(&self, request: QueryRequest) -> SearchResult<ResultPage> {
        let mut updates = self.subscribe();
        let generation = self.submit(request)?;
        loop {
            updates.changed().await.map_err(|_| SearchError::Closed)?;
            let update = updates.borrow_and_update().clone();
            match update {
                SearchUpdate::Complete { generation: seen, page } if seen == generation => {
                    return Ok(page);
                }
                SearchUpdate::Failed { generation: seen } if seen == generation => {
                    return Err(SearchError::SourcesUnavailable);
                }
                other => {
                    if other.generation().map_or(false, |seen| seen > generation) {
                        return Err(SearchError::Superseded);
                    }
                }
            }
        }
    }
}

impl Drop for FederatedSearch {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

async fn run_generation(
    shared: Arc<Shared>,
    local: Arc<dyn ModelSource>,
    external: Arc<dyn ModelSource>,
    engine: Arc<MergeEngine>,
    request: QueryRequest,
    generation: u64,
    budget: usize,
) {
    // the external provider is only consulted for non-empty queries; browsing
    // is a local concern
    let skip_external = !request.include_external || request.query.trim().is_empty();
    if skip_external {
        debug!(generation, "external source skipped for this request");
    }

    let mut local_fut = local.fetch(&request, budget);
    let external_fut = async {
        if skip_external {
            Ok(SourceFetch::default())
        } else {
            external.fetch(&request, budget).await
        }
    };
    tokio::pin!(external_fut);

    let mut local_outcome: Option<anyhow::Result<SourceFetch>> = None;
    let mut external_outcome: Option<anyhow::Result<SourceFetch>> = None;

    while local_outcome.is_none() || external_outcome.is_none() {
        if shared.superseded(generation) {
            debug!(generation, "superseded mid-flight, abandoning");
            return;
        }
        tokio::select! {
            outcome = &mut local_fut, if local_outcome.is_none() => {
                if external_outcome.is_none() {
                    if let Ok(fetch) = &outcome {
                        let page = engine.build_page(
                            fetch.clone(),
                            SourceFetch::default(),
                            &request,
                            budget,
                            Utc::now(),
                        );
                        let update = SearchUpdate::Partial { generation, page };
                        if !shared.publish(generation, update) {
                            return;
                        }
                    }
                    // a failed local fetch publishes nothing here; the final
                    // emission decides between empty and failed
                }
                local_outcome = Some(outcome);
            }
            outcome = &mut external_fut, if external_outcome.is_none() => {
                external_outcome = Some(outcome);
            }
        }
    }

    let local_failed = matches!(&local_outcome, Some(Err(_)));
    let external_failed = !skip_external && matches!(&external_outcome, Some(Err(_)));
    let queried = if skip_external { 1 } else { 2 };
    if usize::from(local_failed) + usize::from(external_failed) == queried {
        warn!(generation, "every queried source failed");
        shared.publish(generation, SearchUpdate::Failed { generation });
        return;
    }

    let local_fetch = degrade(local_outcome, "local");
    let external_fetch = degrade(external_outcome, "external");
    let page = engine.build_page(local_fetch, external_fetch, &request, budget, Utc::now());
    shared.publish(generation, SearchUpdate::Complete { generation, page });
}

fn degrade(outcome: Option<anyhow::Result<SourceFetch>>, source: &'static str) -> SourceFetch {
    match outcome {
        Some(Ok(fetch)) => fetch,
        Some(Err(err)) => {
            warn!(source, error = %err, "source unavailable, continuing without it");
            SourceFetch::default()
        }
        None => SourceFetch::default(),
    }
}
