//! Typed arguments and results for the structured query tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::error::ToolError;

/// A record held by the structured record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Field value by name; system fields resolve to the record's own metadata
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "collection" => Some(Value::String(self.collection.clone())),
            "created_at" => Some(Value::String(self.created_at.to_rfc3339())),
            "updated_at" => Some(Value::String(self.updated_at.to_rfc3339())),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Short human-readable label, used for provenance
    pub fn label(&self) -> String {
        ["name", "title", "username", "code"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
            .map(|label| format!("{} ({})", label, self.id))
            .unwrap_or_else(|| self.id.clone())
    }

    /// `key: value` pairs on one line, sorted by key
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect();
        parts.sort();
        parts.join(", ")
    }
}

/// Render a JSON value without quotes around plain strings
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A search hit with its term-overlap score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: Record,
    /// Number of query terms found in the record
    pub score: usize,
    /// `score` normalised into [0, 1]
    pub relevance: f32,
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    pub collection: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMetric {
    Count,
    Sum,
    Average,
}

impl FromStr for AggregateMetric {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "sum" | "total" => Ok(Self::Sum),
            "average" | "avg" | "mean" => Ok(Self::Average),
            other => Err(ToolError::InvalidAggregation {
                reason: format!("unknown metric '{other}'; expected count, sum or average"),
            }),
        }
    }
}

fn default_metric() -> String {
    "count".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateArgs {
    pub collection: String,
    #[serde(default)]
    pub group_by: Option<String>,
    /// `count`, `sum` or `average`
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Numeric field for `sum` / `average`
    #[serde(default)]
    pub field: Option<String>,
    /// Exact-match filters applied before grouping
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub key: String,
    pub value: f64,
    /// Records that fell into the group
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub collection: String,
    pub metric: AggregateMetric,
    pub group_by: Option<String>,
    pub field: Option<String>,
    /// Sorted by key
    pub groups: Vec<AggregateGroup>,
}

impl AggregateResult {
    pub fn summary(&self) -> String {
        let measured = match (&self.metric, &self.field) {
            (AggregateMetric::Count, _) => "count".to_string(),
            (AggregateMetric::Sum, Some(field)) => format!("sum of {field}"),
            (AggregateMetric::Average, Some(field)) => format!("average {field}"),
            (metric, None) => format!("{metric:?}").to_lowercase(),
        };
        let groups: Vec<String> = self
            .groups
            .iter()
            .map(|group| format!("{}={}", group.key, format_number(group.value)))
            .collect();
        match &self.group_by {
            Some(by) => format!(
                "{} {} by {}: {}",
                self.collection,
                measured,
                by,
                groups.join(", ")
            ),
            None => format!("{} {}: {}", self.collection, measured, groups.join(", ")),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchArgs {
    pub collection: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditArgs {
    pub collection: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArgs {
    pub collection: String,
    pub fields: Map<String, Value>,
}

/// One invocation of a structured tool, with its typed arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    Search(SearchArgs),
    Aggregate(AggregateArgs),
    FetchById(FetchArgs),
    Edit(EditArgs),
    Create(CreateArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Search(_) => "search",
            ToolCall::Aggregate(_) => "aggregate",
            ToolCall::FetchById(_) => "fetch_by_id",
            ToolCall::Edit(_) => "edit",
            ToolCall::Create(_) => "create",
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            ToolCall::Search(args) => &args.collection,
            ToolCall::Aggregate(args) => &args.collection,
            ToolCall::FetchById(args) => &args.collection,
            ToolCall::Edit(args) => &args.collection,
            ToolCall::Create(args) => &args.collection,
        }
    }
}

/// Result of a [`ToolCall`], one variant per tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "result", rename_all = "snake_case")]
pub enum ToolOutput {
    Search(Vec<ScoredRecord>),
    Aggregate(AggregateResult),
    FetchById(Record),
    Edit(Record),
    Create(Record),
}
