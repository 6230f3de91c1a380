//! Per-model query session.
//!
//! A [`FindSession`] binds one model and one query to the three query
//! operations: a single-page `find`, a `delete` of the matching rows, and
//! `load_all` across every page.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::client::{DELETE_PATH, FIND_PATH};
use crate::error::{Result, SdkError};
use crate::loader::{AccumulatedResult, LoadAllSettings, PaginatedLoader};
use crate::mapper::{FetchSpec, map_fetches_result};
use crate::outcome::Outcome;
use crate::page::{PageFetcher, PageResult};
use crate::query::{CompiledQuery, QueryBuilder};
use crate::transport::Transport;

/// Query operations for one model.
pub struct FindSession {
    query: QueryBuilder,
    transport: Arc<dyn Transport>,
    load_all: LoadAllSettings,
}

impl FindSession {
    pub fn new(query: QueryBuilder, transport: Arc<dyn Transport>, load_all: LoadAllSettings) -> Self {
        Self {
            query,
            transport,
            load_all,
        }
    }

    pub fn model(&self) -> &str {
        self.query.model()
    }

    /// The query being built.
    pub fn query(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    pub fn compile(&self) -> CompiledQuery {
        self.query.compile()
    }

    /// Fetch the query's current page.
    ///
    /// With a non-empty `to_fetch`, reference fields in the returned records
    /// are replaced by their `fetched_results` entities; the side-table is
    /// still returned.
    pub async fn find(&self, to_fetch: &FetchSpec) -> Result<Outcome<PageResult>> {
        let compiled = self.compile();
        let outcome = PageFetcher::new(Arc::clone(&self.transport), FIND_PATH)
            .fetch_page(&compiled)
            .await?;

        Ok(outcome.map(|mut page| {
            if !to_fetch.is_empty()
                && let Some(fetched) = &page.fetched_results
            {
                page.results = map_fetches_result(&page.results, fetched, to_fetch);
            }
            page
        }))
    }

    /// Delete the rows the query matches.
    pub async fn delete(&self) -> Result<Outcome<Value>> {
        let compiled = self.compile();
        let body = serde_json::to_value(&compiled).map_err(|source| SdkError::Encode {
            what: "compiled query",
            source,
        })?;

        let reply = self.transport.post_json(DELETE_PATH, &body).await?;
        let outcome = Outcome::<Value>::from_reply(reply, "delete reply")?;

        match &outcome {
            Outcome::Success(_) => info!(model = %compiled.row_model, "rows deleted"),
            Outcome::Failure(failure) => {
                debug!(model = %compiled.row_model, error = %failure, "delete refused");
            }
        }

        Ok(outcome)
    }

    /// Fetch every page of the query; see [`PaginatedLoader::load_all`].
    pub async fn load_all(&self, to_fetch: &FetchSpec) -> Result<Outcome<AccumulatedResult>> {
        let fetcher = PageFetcher::new(Arc::clone(&self.transport), FIND_PATH);
        PaginatedLoader::new(fetcher, self.load_all)
            .load_all(&self.compile(), to_fetch)
            .await
    }
}

impl std::fmt::Debug for FindSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindSession")
            .field("model", &self.model())
            .field("load_all", &self.load_all)
            .finish()
    }
}
