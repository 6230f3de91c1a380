//! Load-all: every page of a query, merged into one result.
//!
//! Page 1 is fetched alone to learn the page count. Pages `2..=N` are then
//! fetched through a bounded pool of in-flight requests, each with its own
//! page-scoped copy of the compiled query. Records are buffered by page
//! number so the merged sequence is always in page order; side-tables merge
//! as pages arrive, so on a model+key collision the page that settled last
//! wins. Any failing page abandons the run and nothing partial is returned.

use std::collections::BTreeMap;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SdkError};
use crate::mapper::{FetchSpec, map_fetches_result};
use crate::outcome::Outcome;
use crate::page::{FetchedResults, PageFetcher, PageResult, Record};
use crate::query::CompiledQuery;

/// Page size forced on load-all queries.
pub const LOAD_ALL_PAGE_SIZE: u32 = 1000;

/// Maximum page requests in flight after page 1.
pub const LOAD_ALL_CONCURRENCY: usize = 5;

/// Merged result of a load-all run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulatedResult {
    /// Records of every page, in ascending page order.
    pub results: Vec<Record>,
    pub fetched_results: FetchedResults,
    pub success: bool,
}

/// Load-all tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAllSettings {
    pub page_size: u32,
    pub concurrency: usize,
}

impl Default for LoadAllSettings {
    fn default() -> Self {
        Self {
            page_size: LOAD_ALL_PAGE_SIZE,
            concurrency: LOAD_ALL_CONCURRENCY,
        }
    }
}

/// Runs load-all over a [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct PaginatedLoader {
    fetcher: PageFetcher,
    settings: LoadAllSettings,
}

impl PaginatedLoader {
    /// Create a loader. Zero page size or concurrency is raised to 1.
    pub fn new(fetcher: PageFetcher, settings: LoadAllSettings) -> Self {
        Self {
            fetcher,
            settings: LoadAllSettings {
                page_size: settings.page_size.max(1),
                concurrency: settings.concurrency.max(1),
            },
        }
    }

    pub fn settings(&self) -> LoadAllSettings {
        self.settings
    }

    /// Fetch every page of `query` and merge them.
    ///
    /// A page the server refuses yields `Outcome::Failure`; a page that
    /// cannot be fetched at all yields `SdkError::Page`, page 1 included.
    /// The page count is unknown until page 1 arrives, so a page 1 failure
    /// reports a total of 1. In both cases requests still in flight are
    /// dropped.
    pub async fn load_all(
        &self,
        query: &CompiledQuery,
        to_fetch: &FetchSpec,
    ) -> Result<Outcome<AccumulatedResult>> {
        let base = query.with_page_size(self.settings.page_size).with_page(1);

        let first = match self.fetcher.fetch_page(&base).await.map_err(|e| {
            warn!(model = %base.row_model, error = %e, "first page failed");
            SdkError::page(1, 1, e)
        })? {
            Outcome::Success(page) => page,
            Outcome::Failure(failure) => {
                warn!(model = %base.row_model, error = %failure, "first page refused");
                return Ok(Outcome::Failure(failure));
            }
        };

        let total_pages = first.page_count();
        let mut accumulator = Accumulator::seed(first);

        if total_pages >= 2 {
            debug!(
                model = %base.row_model,
                total_pages,
                concurrency = self.settings.concurrency,
                "fetching remaining pages"
            );

            let fetcher = &self.fetcher;
            let base = &base;
            let mut pending = stream::iter(2..=total_pages)
                .map(move |page| async move {
                    let scoped = base.with_page(page);
                    (page, fetcher.fetch_page(&scoped).await)
                })
                .buffer_unordered(self.settings.concurrency);

            while let Some((page, fetched)) = pending.next().await {
                match fetched {
                    Ok(Outcome::Success(result)) => accumulator.absorb(page, result),
                    Ok(Outcome::Failure(failure)) => {
                        warn!(
                            model = %base.row_model,
                            page,
                            total_pages,
                            error = %failure,
                            "page refused, abandoning load-all"
                        );
                        return Ok(Outcome::Failure(failure));
                    }
                    Err(e) => {
                        warn!(
                            model = %base.row_model,
                            page,
                            total_pages,
                            error = %e,
                            "page failed, abandoning load-all"
                        );
                        return Err(SdkError::page(page, total_pages, e));
                    }
                }
            }
        }

        let (results, fetched_results) = accumulator.finish();
        let results = if to_fetch.is_empty() {
            results
        } else {
            map_fetches_result(&results, &fetched_results, to_fetch)
        };

        info!(
            model = %base.row_model,
            total_pages,
            records = results.len(),
            "load-all complete"
        );

        Ok(Outcome::Success(AccumulatedResult {
            results,
            fetched_results,
            success: true,
        }))
    }
}

/// Page-ordered record buffer plus the merged side-table.
struct Accumulator {
    first: Vec<Record>,
    later: BTreeMap<u32, Vec<Record>>,
    fetched: FetchedResults,
}

impl Accumulator {
    fn seed(page: PageResult) -> Self {
        Self {
            first: page.results,
            later: BTreeMap::new(),
            fetched: page.fetched_results.unwrap_or_default(),
        }
    }

    fn absorb(&mut self, page_number: u32, page: PageResult) {
        if let Some(fetched) = page.fetched_results {
            merge_fetched(&mut self.fetched, fetched);
        }
        self.later.insert(page_number, page.results);
    }

    fn finish(self) -> (Vec<Record>, FetchedResults) {
        let mut results = self.first;
        for (_, records) in self.later {
            results.extend(records);
        }
        (results, self.fetched)
    }
}

/// Merge `from` into `into` model by model, key by key. Entities in `from`
/// replace existing ones with the same key.
pub fn merge_fetched(into: &mut FetchedResults, from: FetchedResults) {
    for (model, entities) in from {
        into.entry(model).or_default().extend(entities);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(results: serde_json::Value, fetched: Option<serde_json::Value>) -> PageResult {
        let mut body = json!({"success": true, "results": results});
        if let Some(fetched) = fetched {
            body["fetched_results"] = fetched;
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn accumulator_orders_by_page_not_arrival() {
        let mut acc = Accumulator::seed(page(json!([{"n": 1}]), None));
        acc.absorb(4, page(json!([{"n": 4}]), None));
        acc.absorb(2, page(json!([{"n": 2}, {"n": 2.5}]), None));
        acc.absorb(3, page(json!([{"n": 3}]), None));

        let (results, _) = acc.finish();
        let order: Vec<f64> = results.iter().map(|r| r["n"].as_f64().unwrap()).collect();
        assert_eq!(order, vec![1.0, 2.0, 2.5, 3.0, 4.0]);
    }

    #[test]
    fn later_arrival_wins_side_table_collision() {
        let mut acc = Accumulator::seed(page(json!([]), Some(json!({"User": {"u1": {"v": 1}}}))));
        acc.absorb(3, page(json!([]), Some(json!({"User": {"u1": {"v": 3}}}))));
        acc.absorb(2, page(json!([]), Some(json!({"User": {"u2": {"v": 2}}, "Shop": {"s1": {}}}))));

        let (_, fetched) = acc.finish();
        assert_eq!(fetched["User"]["u1"]["v"], 3);
        assert_eq!(fetched["User"]["u2"]["v"], 2);
        assert!(fetched.contains_key("Shop"));
    }

    #[test]
    fn settings_are_clamped() {
        let transport: std::sync::Arc<dyn crate::transport::Transport> =
            std::sync::Arc::new(NeverTransport);
        let loader = PaginatedLoader::new(
            PageFetcher::new(transport, "/find"),
            LoadAllSettings {
                page_size: 0,
                concurrency: 0,
            },
        );
        assert_eq!(loader.settings().page_size, 1);
        assert_eq!(loader.settings().concurrency, 1);
    }

    struct NeverTransport;

    #[async_trait::async_trait]
    impl crate::transport::Transport for NeverTransport {
        async fn post_json(&self, path: &str, _body: &serde_json::Value) -> Result<serde_json::Value> {
            Err(SdkError::transport(path, "unreachable"))
        }
    }
}
