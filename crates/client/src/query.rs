//! Query construction and the compiled wire payload.
//!
//! [`QueryBuilder`] accumulates conditions, ordering and paging for one
//! model. [`QueryBuilder::compile`] produces a [`CompiledQuery`], the exact
//! body POSTed to the find and delete endpoints. The paginated loader only
//! ever touches `page` and `size` on the compiled value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size used when the caller does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Server-ready query payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub domain: u64,
    pub row_model: String,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub size: u32,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_groups: Option<Vec<ConditionGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    /// Relations the server should denormalize into `fetched_results`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch: Vec<String>,
    /// Explicit row keys; used instead of `where` when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl CompiledQuery {
    /// Copy of this query pointed at another page.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Copy of this query with another page size.
    pub fn with_page_size(&self, size: u32) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }
}

/// How a condition or group joins the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

/// Comparison operators understood by the find endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "IS")]
    Is,
    #[serde(rename = "IS NOT")]
    IsNot,
}

/// A single `FIELD OP VAL` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "ANDOR")]
    pub connector: Connector,
    #[serde(rename = "FIELD")]
    pub field: String,
    #[serde(rename = "OP")]
    pub operator: Operator,
    #[serde(rename = "VAL")]
    pub value: Value,
}

/// Parenthesized list of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(rename = "ANDOR")]
    pub connector: Connector,
    #[serde(rename = "GROUP")]
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    fn new(connector: Connector) -> Self {
        Self {
            connector,
            conditions: Vec::new(),
        }
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Asc,
    Desc,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    #[serde(rename = "ASC")]
    pub ascending: bool,
    #[serde(rename = "FIELD")]
    pub field: String,
}

/// Accumulates query directives for one model.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    domain: u64,
    model: String,
    page: u32,
    size: u32,
    groups: Vec<ConditionGroup>,
    order_by: Option<OrderBy>,
    fetch: Vec<String>,
    keys: Vec<String>,
}

impl QueryBuilder {
    pub fn new(domain: u64, model: impl Into<String>) -> Self {
        Self {
            domain,
            model: model.into(),
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            groups: vec![ConditionGroup::new(Connector::And)],
            order_by: None,
            fetch: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Set the page number. Page 0 is treated as page 1.
    pub fn set_page(&mut self, page: u32) -> &mut Self {
        self.page = page.max(1);
        self
    }

    /// Set the page size. A size of 0 is treated as 1.
    pub fn set_page_size(&mut self, size: u32) -> &mut Self {
        self.size = size.max(1);
        self
    }

    pub fn order_by(&mut self, field: impl Into<String>, sort: Sort) -> &mut Self {
        self.order_by = Some(OrderBy {
            ascending: sort == Sort::Asc,
            field: field.into(),
        });
        self
    }

    /// Ask the server to denormalize these relations into `fetched_results`.
    pub fn fetch_models<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fetch.contains(&field) {
                self.fetch.push(field);
            }
        }
        self
    }

    /// Target rows by key instead of by condition.
    pub fn where_with_keys<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Start a new condition group joined to the previous one with AND.
    pub fn new_group_with_and(&mut self) -> &mut Self {
        self.new_group(Connector::And)
    }

    /// Start a new condition group joined to the previous one with OR.
    pub fn new_group_with_or(&mut self) -> &mut Self {
        self.new_group(Connector::Or)
    }

    fn new_group(&mut self, connector: Connector) -> &mut Self {
        match self.groups.last_mut() {
            Some(current) if current.conditions.is_empty() => current.connector = connector,
            _ => self.groups.push(ConditionGroup::new(connector)),
        }
        self
    }

    /// Append a condition to the current group.
    ///
    /// The first condition of a group always connects with AND.
    pub fn push_condition(
        &mut self,
        connector: Connector,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        if self.groups.is_empty() {
            self.groups.push(ConditionGroup::new(Connector::And));
        }
        if let Some(group) = self.groups.last_mut() {
            let connector = if group.conditions.is_empty() {
                Connector::And
            } else {
                connector
            };
            group.conditions.push(Condition {
                connector,
                field: field.into(),
                operator,
                value: value.into(),
            });
        }
        self
    }

    pub fn and_where_is_equal(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::Equal, value)
    }

    pub fn or_where_is_equal(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::Equal, value)
    }

    pub fn and_where_is_not_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::NotEqual, value)
    }

    pub fn or_where_is_not_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::NotEqual, value)
    }

    pub fn and_where_is_greater_than(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::GreaterThan, value)
    }

    pub fn or_where_is_greater_than(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::GreaterThan, value)
    }

    pub fn and_where_is_less_than(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::LessThan, value)
    }

    pub fn or_where_is_less_than(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::LessThan, value)
    }

    pub fn and_where_is_greater_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::GreaterOrEqual, value)
    }

    pub fn or_where_is_greater_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::GreaterOrEqual, value)
    }

    pub fn and_where_is_less_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::LessOrEqual, value)
    }

    pub fn or_where_is_less_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::LessOrEqual, value)
    }

    /// Substring match (`LIKE %value%`).
    pub fn and_where_contains(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::Like, format!("%{value}%"))
    }

    pub fn or_where_contains(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::Like, format!("%{value}%"))
    }

    /// Prefix match (`LIKE value%`).
    pub fn and_where_starts_with(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::Like, format!("{value}%"))
    }

    pub fn or_where_starts_with(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::Like, format!("{value}%"))
    }

    /// Suffix match (`LIKE %value`).
    pub fn and_where_ends_with(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::Like, format!("%{value}"))
    }

    pub fn or_where_ends_with(&mut self, field: impl Into<String>, value: &str) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::Like, format!("%{value}"))
    }

    pub fn and_where_is_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_condition(Connector::And, field, Operator::In, list)
    }

    pub fn or_where_is_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_condition(Connector::Or, field, Operator::In, list)
    }

    pub fn and_where_is_not_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_condition(Connector::And, field, Operator::NotIn, list)
    }

    pub fn or_where_is_not_in<I, V>(&mut self, field: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_condition(Connector::Or, field, Operator::NotIn, list)
    }

    pub fn and_where_is_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::Is, Value::Null)
    }

    pub fn or_where_is_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::Is, Value::Null)
    }

    pub fn and_where_is_not_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_condition(Connector::And, field, Operator::IsNot, Value::Null)
    }

    pub fn or_where_is_not_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push_condition(Connector::Or, field, Operator::IsNot, Value::Null)
    }

    /// Produce the wire payload. Empty groups are dropped.
    pub fn compile(&self) -> CompiledQuery {
        let groups: Vec<ConditionGroup> = self
            .groups
            .iter()
            .filter(|group| !group.conditions.is_empty())
            .cloned()
            .collect();

        CompiledQuery {
            domain: self.domain,
            row_model: self.model.clone(),
            page: self.page,
            size: self.size,
            where_groups: if groups.is_empty() { None } else { Some(groups) },
            order_by: self.order_by.clone(),
            fetch: self.fetch.clone(),
            keys: self.keys.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_query_has_no_where_clause() {
        let compiled = QueryBuilder::new(96, "Product").compile();
        let wire = serde_json::to_value(&compiled).unwrap();

        assert_eq!(
            wire,
            json!({"domain": 96, "row_model": "Product", "page": 1, "size": DEFAULT_PAGE_SIZE})
        );
    }

    #[test]
    fn conditions_compile_to_wire_groups() {
        let mut query = QueryBuilder::new(96, "Product");
        query
            .and_where_is_equal("sku", "A1")
            .or_where_contains("name", "lamp")
            .new_group_with_or()
            .and_where_is_in("color", ["red", "blue"])
            .order_by("name", Sort::Desc);

        let wire = serde_json::to_value(query.compile()).unwrap();

        assert_eq!(
            wire["where"],
            json!([
                {"ANDOR": "AND", "GROUP": [
                    {"ANDOR": "AND", "FIELD": "sku", "OP": "=", "VAL": "A1"},
                    {"ANDOR": "OR", "FIELD": "name", "OP": "LIKE", "VAL": "%lamp%"}
                ]},
                {"ANDOR": "OR", "GROUP": [
                    {"ANDOR": "AND", "FIELD": "color", "OP": "IN", "VAL": ["red", "blue"]}
                ]}
            ])
        );
        assert_eq!(wire["order_by"], json!({"ASC": false, "FIELD": "name"}));
    }

    #[test]
    fn first_condition_in_group_connects_with_and() {
        let mut query = QueryBuilder::new(1, "Order");
        query.or_where_is_null("shipped_at");

        let compiled = query.compile();
        let groups = compiled.where_groups.unwrap();
        assert_eq!(groups[0].conditions[0].connector, Connector::And);
        assert_eq!(groups[0].conditions[0].operator, Operator::Is);
    }

    #[test]
    fn empty_group_is_reused_not_stacked() {
        let mut query = QueryBuilder::new(1, "Order");
        query.new_group_with_or().new_group_with_and();
        query.and_where_is_not_null("customer");

        let groups = query.compile().where_groups.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].connector, Connector::And);
    }

    #[test]
    fn with_page_leaves_base_untouched() {
        let base = QueryBuilder::new(1, "Order").compile();
        let third = base.with_page(3);

        assert_eq!(base.page, 1);
        assert_eq!(third.page, 3);
        assert_eq!(third.row_model, base.row_model);
    }

    #[test]
    fn fetch_models_are_deduplicated() {
        let mut query = QueryBuilder::new(1, "Order");
        query.fetch_models(["customer", "customer", "product"]);

        assert_eq!(query.compile().fetch, vec!["customer", "product"]);
    }

    #[test]
    fn zero_page_and_size_are_clamped() {
        let mut query = QueryBuilder::new(1, "Order");
        query.set_page(0).set_page_size(0);

        let compiled = query.compile();
        assert_eq!(compiled.page, 1);
        assert_eq!(compiled.size, 1);
    }
}
