//! Merge, filter, sort, paginate.
//!
//! Everything here is synchronous and deterministic: the orchestrator hands
//! the engine whatever the sources produced (possibly empty) and gets back
//! exactly the page to publish. Local items precede external items in merge
//! order, and every sort is stable, so local wins ties all the way down.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::compat::MaterialRules;
use crate::scoring::relevance_score;
use crate::sources::SourceFetch;
use crate::types::{CanonicalItem, QueryRequest, ResultPage, SortBy};

/// Number of days an item counts as "recent" for the default trending view.
const TRENDING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Default)]
pub struct MergeEngine {
    rules: MaterialRules,
}

impl MergeEngine {
    pub fn new(rules: MaterialRules) -> Self {
        Self { rules }
    }

    /// Combine one fetch per source into the page for `request`. `budget` is
    /// the per-source fetch budget the orchestrator used; reaching it means
    /// the true result count is unknown and the total estimate is padded so
    /// pagination can keep going. `now` anchors the trending window.
    pub fn build_page(
        &self,
        local: SourceFetch,
        external: SourceFetch,
        request: &QueryRequest,
        budget: usize,
        now: DateTime<Utc>,
    ) -> ResultPage {
        let mut combined = local.items;
        combined.extend(external.items);
        let before_dedup = combined.len();

        // Keep-first dedupe: local precedence falls out of merge order.
        let mut seen = HashSet::new();
        combined.retain(|item| seen.insert(item.id.clone()));
        if combined.len() < before_dedup {
            debug!(
                dropped = before_dedup - combined.len(),
                "removed duplicate ids during merge"
            );
        }

        if let Some(wanted) = request.is_free {
            combined.retain(|item| item.is_free == wanted);
        }
        if let Some(min_quality) = request.min_quality {
            // unreviewed items pass; the filter only rejects known-bad ones
            combined.retain(|item| item.average_quality.map_or(true, |q| q >= min_quality));
        }
        if request.material_compatible {
            combined.retain(|item| self.rules.is_compatible(item, &request.query, true));
        }

        let default_view =
            request.query_words().is_empty() && !request.has_active_filters();
        if default_view {
            let cutoff = now - Duration::days(TRENDING_WINDOW_DAYS);
            let recent: Vec<CanonicalItem> = combined
                .iter()
                .filter(|item| item.created_at >= cutoff)
                .cloned()
                .collect();
            // a near-empty trending shelf is worse than an unrestricted one
            if recent.len() >= request.page_size {
                combined = recent;
            }
        }

        self.sort(&mut combined, request, default_view);

        let filtered_len = combined.len() as u64;
        let start = (request.page - 1) * request.page_size;
        let items: Vec<CanonicalItem> = combined
            .into_iter()
            .skip(start)
            .take(request.page_size)
            .collect();

        let mut estimated_total = local
            .estimated_total
            .max(external.estimated_total)
            .max(filtered_len);
        if filtered_len as usize >= budget {
            // budget reached: there is probably more behind it, so promise at
            // least one further page
            let next_page_floor = (request.page * request.page_size + request.page_size) as u64;
            estimated_total = estimated_total.max(next_page_floor);
        }

        debug!(
            page = request.page,
            returned = items.len(),
            estimated_total,
            "built result page"
        );
        ResultPage {
            items,
            estimated_total,
            page: request.page,
            page_size: request.page_size,
        }
    }

    fn sort(&self, items: &mut Vec<CanonicalItem>, request: &QueryRequest, default_view: bool) {
        match effective_sort(request, default_view) {
            SortBy::Relevance => {
                let words = request.query_words();
                if words.is_empty() {
                    // nothing to score against; fall back to a popularity /
                    // quality blend
                    items.sort_by(|a, b| {
                        total_cmp(fallback_key(b), fallback_key(a))
                    });
                } else {
                    let mut scored: Vec<(f64, CanonicalItem)> = std::mem::take(items)
                        .into_iter()
                        .map(|item| (relevance_score(&item, &request.query), item))
                        .collect();
                    // zero score means no textual relationship at all
                    scored.retain(|(score, _)| *score > 0.0);
                    scored.sort_by(|a, b| total_cmp(b.0, a.0));
                    *items = scored.into_iter().map(|(_, item)| item).collect();
                }
            }
            SortBy::Popularity => {
                items.sort_by(|a, b| b.download_count.cmp(&a.download_count));
            }
            SortBy::Newest => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
            SortBy::Oldest => {
                items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            }
        }
    }
}

/// The sort key actually applied: an unset `sort_by` means popularity on the
/// browse-everything default view and relevance everywhere else.
fn effective_sort(request: &QueryRequest, default_view: bool) -> SortBy {
    match request.sort_by {
        Some(sort) => sort,
        None if default_view => SortBy::Popularity,
        None => SortBy::Relevance,
    }
}

fn fallback_key(item: &CanonicalItem) -> f64 {
    item.download_count as f64 + f64::from(item.average_quality.unwrap_or(0.0)) * 100.0
}

// scores are finite by construction; any NaN sorts last rather than panicking
fn total_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
