//! Fetch mapping: substituting side-table entities into primary records.
//!
//! A find reply can carry `fetched_results`, the entities referenced by the
//! primary records keyed by model then key. Mapping replaces a reference
//! field (`"customer": "c1"`) with the entity it names
//! (`"customer": {"_KEY": "c1", ...}`).

use serde_json::Value;

use crate::page::{FetchedResults, Record};

/// A reference field to dereference, optionally through nested relations.
///
/// `"customer"` resolves one field; `"customer.address"` then resolves
/// `address` on the substituted customer entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPath {
    segments: Vec<String>,
    model: Option<String>,
}

impl FetchPath {
    /// Parse a dotted path. Empty segments are ignored.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            model: None,
        }
    }

    /// Look the first segment up in `model` only, instead of every model.
    pub fn in_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The field on the primary record.
    pub fn root(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

impl From<&str> for FetchPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for FetchPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

/// Ordered list of reference fields to dereference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSpec {
    paths: Vec<FetchPath>,
}

impl FetchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<FetchPath>) -> &mut Self {
        let path = path.into();
        if !path.segments.is_empty() {
            self.paths.push(path);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[FetchPath] {
        &self.paths
    }

    /// Distinct first-level fields, in order. These are what the server
    /// needs in a query's `fetch` list.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        for root in self.paths.iter().filter_map(FetchPath::root) {
            if !roots.iter().any(|r| r == root) {
                roots.push(root.to_string());
            }
        }
        roots
    }
}

impl<P: Into<FetchPath>> FromIterator<P> for FetchSpec {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut spec = Self::new();
        for path in iter {
            spec.push(path);
        }
        spec
    }
}

/// Replace reference fields with their side-table entities.
///
/// Returns new records; the inputs are untouched. Without a model hint the
/// key is searched in every model, in model-name order, and the first hit
/// wins. The side-table is a sorted map, so the server's own model order is
/// not preserved; pin the model with [`FetchPath::in_model`] when two models
/// can share a key. References with no matching entity keep their raw key.
pub fn map_fetches_result(
    results: &[Record],
    fetched_results: &FetchedResults,
    to_fetch: &FetchSpec,
) -> Vec<Record> {
    if to_fetch.is_empty() || fetched_results.is_empty() {
        return results.to_vec();
    }

    results
        .iter()
        .map(|record| {
            let mut mapped = record.clone();
            for path in to_fetch.paths() {
                resolve_path(&mut mapped, path.segments(), path.model(), fetched_results);
            }
            mapped
        })
        .collect()
}

fn resolve_path(
    value: &mut Value,
    segments: &[String],
    model: Option<&str>,
    fetched_results: &FetchedResults,
) {
    let Some((field, rest)) = segments.split_first() else {
        return;
    };
    let Some(slot) = value.as_object_mut().and_then(|obj| obj.get_mut(field)) else {
        return;
    };

    if let Some(entity) =
        reference_key(slot).and_then(|key| lookup(fetched_results, model, &key))
    {
        *slot = entity.clone();
    }

    if !rest.is_empty() {
        resolve_path(slot, rest, None, fetched_results);
    }
}

/// Keys are compared in string form; objects and nulls are not references.
fn reference_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lookup<'a>(
    fetched_results: &'a FetchedResults,
    model: Option<&str>,
    key: &str,
) -> Option<&'a Value> {
    match model {
        Some(model) => fetched_results.get(model)?.get(key),
        None => fetched_results
            .values()
            .find_map(|entities| entities.get(key)),
    }
}
