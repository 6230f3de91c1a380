//! SBX client test utilities.
//!
//! A scripted [`Transport`] that answers find requests page by page, with
//! per-page delays, failures and completion gates, plus reply fixtures and
//! JSON assertion helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;

use sbx_client::{Result, SdkError, Transport};

/// What a scripted page answers.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply envelope returned as-is.
    Body(JsonValue),
    /// Transport failure with this message.
    Error(String),
}

/// Script for one page.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub reply: ScriptedReply,
    pub delay: Duration,
    /// Hold the reply until this page has settled.
    pub after: Option<u32>,
}

impl PageScript {
    fn body(body: JsonValue) -> Self {
        Self {
            reply: ScriptedReply::Body(body),
            delay: Duration::ZERO,
            after: None,
        }
    }
}

/// One request seen by the transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub body: JsonValue,
}

impl RecordedCall {
    /// The `page` field of the request body, 1 when absent.
    pub fn page(&self) -> u32 {
        self.body
            .get("page")
            .and_then(JsonValue::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1)
    }
}

/// Transport double answering from a script.
///
/// Requests to a path registered with [`ScriptedTransport::reply`] get that
/// body; every other request is answered by the script for its `page`.
pub struct ScriptedTransport {
    pages: HashMap<u32, PageScript>,
    path_replies: HashMap<String, JsonValue>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    settled: watch::Sender<Vec<u32>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(Vec::new());
        Self {
            pages: HashMap::new(),
            path_replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            settled,
        }
    }

    /// Answer `page` with `body`.
    pub fn page(mut self, page: u32, body: JsonValue) -> Self {
        self.pages.insert(page, PageScript::body(body));
        self
    }

    /// Answer `page` with `body` after sleeping for `delay`.
    pub fn page_delayed(mut self, page: u32, body: JsonValue, delay: Duration) -> Self {
        self.pages.insert(
            page,
            PageScript {
                delay,
                ..PageScript::body(body)
            },
        );
        self
    }

    /// Answer `page` with `body` only once `after` has settled.
    pub fn page_after(mut self, page: u32, body: JsonValue, after: u32) -> Self {
        self.pages.insert(
            page,
            PageScript {
                after: Some(after),
                ..PageScript::body(body)
            },
        );
        self
    }

    /// Fail `page` at the transport level.
    pub fn page_error(mut self, page: u32, message: &str) -> Self {
        self.pages.insert(
            page,
            PageScript {
                reply: ScriptedReply::Error(message.to_string()),
                delay: Duration::ZERO,
                after: None,
            },
        );
        self
    }

    /// Script every page of a `total_pages` collection with `per_page`
    /// generated records each, delaying every page by `delay`.
    pub fn collection(mut self, total_pages: u32, per_page: usize, delay: Duration) -> Self {
        for page in 1..=total_pages {
            self.pages.insert(
                page,
                PageScript {
                    delay,
                    ..PageScript::body(page_body(records(page, per_page), total_pages))
                },
            );
        }
        self
    }

    /// Answer every request to `path` with `body`.
    pub fn reply(mut self, path: &str, body: JsonValue) -> Self {
        self.path_replies.insert(path.to_string(), body);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Page numbers in request order.
    pub fn requested_pages(&self) -> Vec<u32> {
        self.calls.lock().iter().map(RecordedCall::page).collect()
    }

    /// Highest number of requests outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Page numbers in the order their replies were produced.
    pub fn settled_order(&self) -> Vec<u32> {
        self.settled.borrow().clone()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

/// Decrements the in-flight count when a request ends or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, path: &str, body: &JsonValue) -> Result<JsonValue> {
        let call = RecordedCall {
            path: path.to_string(),
            body: body.clone(),
        };
        let page = call.page();
        self.calls.lock().push(call);

        if let Some(reply) = self.path_replies.get(path) {
            return Ok(reply.clone());
        }

        let _guard = self.enter();

        let Some(script) = self.pages.get(&page).cloned() else {
            return Err(SdkError::transport(
                path,
                format!("no scripted reply for page {page}"),
            ));
        };

        if let Some(after) = script.after {
            let mut settled = self.settled.subscribe();
            let _ = settled.wait_for(|pages| pages.contains(&after)).await;
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        self.settled.send_modify(|pages| pages.push(page));

        match script.reply {
            ScriptedReply::Body(body) => Ok(body),
            ScriptedReply::Error(message) => Err(SdkError::transport(path, message)),
        }
    }
}

/// A successful find reply.
pub fn page_body(results: Vec<JsonValue>, total_pages: u32) -> JsonValue {
    json!({
        "success": true,
        "results": results,
        "total_pages": total_pages,
    })
}

/// A successful find reply carrying a side-table.
pub fn page_body_with_fetched(
    results: Vec<JsonValue>,
    total_pages: u32,
    fetched_results: JsonValue,
) -> JsonValue {
    let mut body = page_body(results, total_pages);
    body["fetched_results"] = fetched_results;
    body
}

/// A `success: false` reply.
pub fn failure_body(message: &str) -> JsonValue {
    json!({"success": false, "message": message})
}

/// `count` records tagged with their page: `{"_KEY": "p2-r0", "page": 2, "index": 0}`.
pub fn records(page: u32, count: usize) -> Vec<JsonValue> {
    (0..count)
        .map(|index| {
            json!({
                "_KEY": format!("p{page}-r{index}"),
                "page": page,
                "index": index,
            })
        })
        .collect()
}

/// `_KEY` of each record, in order.
pub fn record_keys(results: &[JsonValue]) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| r.get("_KEY").and_then(JsonValue::as_str))
        .map(str::to_string)
        .collect()
}

/// Assertions over request bodies and reply envelopes.
pub mod assert {
    use serde_json::Value;

    /// Assert two bodies are equal, printing both pretty when they differ.
    pub fn json_eq(actual: &Value, expected: &Value) {
        if actual != expected {
            let pretty = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_default();
            panic!(
                "body mismatch\n--- actual\n{}\n--- expected\n{}",
                pretty(actual),
                pretty(expected)
            );
        }
    }

    /// Assert a reply or result carries `fetched_results[model][key]`.
    pub fn side_table_has(body: &Value, model: &str, key: &str) {
        let found = body
            .get("fetched_results")
            .and_then(|table| table.get(model))
            .and_then(|entities| entities.get(key))
            .is_some();
        assert!(found, "no fetched_results entry {model}/{key} in {body}");
    }

    /// Assert an error or log line mentions `needle`.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "{needle:?} not found in {haystack:?}"
        );
    }
}
