//! Single-page retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SdkError};
use crate::outcome::Outcome;
use crate::query::CompiledQuery;
use crate::transport::Transport;

/// A primary record as returned by the server.
pub type Record = Value;

/// Denormalized side-table: model name → entity key → entity.
pub type FetchedResults = BTreeMap<String, BTreeMap<String, Value>>;

/// One page of a find reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(default)]
    pub results: Vec<Record>,

    #[serde(default = "default_total_pages", deserialize_with = "total_pages_or_one")]
    pub total_pages: u32,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_side_table"
    )]
    pub fetched_results: Option<FetchedResults>,

    /// Any other reply fields, `success` included.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_total_pages() -> u32 {
    1
}

/// `null` counts as a single page.
fn total_pages_or_one<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(1))
}

/// Servers send `[]` where an empty map is meant, at the top level and per
/// model. `null` and `[]` both decode as "no side-table".
fn lenient_side_table<'de, D>(deserializer: D) -> std::result::Result<Option<FetchedResults>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let models = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::Array(items) if items.is_empty() => return Ok(None),
        Value::Object(models) => models,
        other => {
            return Err(D::Error::custom(format!(
                "fetched_results must be an object, got {other}"
            )));
        }
    };

    let mut table = FetchedResults::new();
    for (model, entities) in models {
        let entities = match entities {
            Value::Null => BTreeMap::new(),
            Value::Array(items) if items.is_empty() => BTreeMap::new(),
            Value::Object(entities) => entities.into_iter().collect(),
            other => {
                return Err(D::Error::custom(format!(
                    "fetched_results.{model} must be an object, got {other}"
                )));
            }
        };
        table.insert(model, entities);
    }
    Ok(Some(table))
}

impl PageResult {
    /// Total page count, never below 1.
    pub fn page_count(&self) -> u32 {
        self.total_pages.max(1)
    }
}

/// Issues one find request per call.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl PageFetcher {
    /// Create a fetcher posting to the find endpoint at `path`.
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    /// Fetch the page `query.page` points at.
    ///
    /// One round-trip, no retry, no caching.
    pub async fn fetch_page(&self, query: &CompiledQuery) -> Result<Outcome<PageResult>> {
        let body = serde_json::to_value(query).map_err(|source| SdkError::Encode {
            what: "compiled query",
            source,
        })?;

        let reply = self.transport.post_json(&self.path, &body).await?;
        let outcome = Outcome::<PageResult>::from_reply(reply, "find page")?;

        if let Outcome::Success(page) = &outcome {
            debug!(
                model = %query.row_model,
                page = query.page,
                records = page.results.len(),
                total_pages = page.total_pages,
                "page fetched"
            );
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher").field("path", &self.path).finish()
    }
}
