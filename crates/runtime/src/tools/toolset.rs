//! The five structured query operations.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{ToolError, ToolResult};
use super::schema::{is_blank, CollectionRegistry, CollectionSchema, SYSTEM_FIELDS};
use super::store::RecordStore;
use super::types::{
    display_value, AggregateArgs, AggregateGroup, AggregateMetric, AggregateResult, CreateArgs,
    EditArgs, FetchArgs, Record, ScoredRecord, SearchArgs, ToolCall, ToolOutput,
};
use crate::text::{content_terms, tokenize};

/// Relevance given to records returned by a browse (no content terms)
const BROWSE_RELEVANCE: f32 = 0.5;

/// Typed, validated access to the structured record store
#[derive(Clone)]
pub struct StructuredToolSet {
    store: Arc<dyn RecordStore>,
    registry: Arc<CollectionRegistry>,
    /// Serializes read-merge-write edits per collection
    edit_locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StructuredToolSet {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<CollectionRegistry>) -> Self {
        Self {
            store,
            registry,
            edit_locks: Arc::new(DashMap::new()),
        }
    }

    fn edit_lock(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.edit_locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Dispatch a tagged tool call to its typed operation
    pub async fn execute(&self, call: ToolCall) -> ToolResult<ToolOutput> {
        tracing::debug!(tool = call.name(), collection = call.collection(), "Executing tool");
        match call {
            ToolCall::Search(args) => self.search(args).await.map(ToolOutput::Search),
            ToolCall::Aggregate(args) => self.aggregate(args).await.map(ToolOutput::Aggregate),
            ToolCall::FetchById(args) => self.fetch_by_id(args).await.map(ToolOutput::FetchById),
            ToolCall::Edit(args) => self.edit(args).await.map(ToolOutput::Edit),
            ToolCall::Create(args) => self.create(args).await.map(ToolOutput::Create),
        }
    }

    /// Free-text match over field values, ranked by term overlap.
    pub async fn search(&self, args: SearchArgs) -> ToolResult<Vec<ScoredRecord>> {
        let schema = self.registry.get(&args.collection)?;
        if args.limit == 0 {
            return Ok(Vec::new());
        }

        // Words naming the collection itself say nothing about which records
        let alias_tokens: HashSet<String> = schema
            .aliases
            .iter()
            .flat_map(|alias| tokenize(alias))
            .chain(tokenize(&schema.name))
            .collect();
        let terms: Vec<String> = content_terms(&args.query)
            .into_iter()
            .filter(|term| !alias_tokens.contains(term))
            .collect();

        let records = self.store.list(&schema.name).await?;

        if terms.is_empty() {
            return Ok(records
                .into_iter()
                .take(args.limit)
                .map(|record| ScoredRecord {
                    record,
                    score: 0,
                    relevance: BROWSE_RELEVANCE,
                })
                .collect());
        }

        let mut hits: Vec<ScoredRecord> = records
            .into_iter()
            .filter_map(|record| {
                let tokens = record_tokens(&record);
                let score = terms.iter().filter(|term| tokens.contains(*term)).count();
                (score > 0).then(|| ScoredRecord {
                    relevance: score as f32 / terms.len() as f32,
                    score,
                    record,
                })
            })
            .collect();
        // Stable sort keeps store order among equal scores
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(args.limit);
        Ok(hits)
    }

    /// Group filtered records and compute count, sum or average.
    pub async fn aggregate(&self, args: AggregateArgs) -> ToolResult<AggregateResult> {
        let schema = self.registry.get(&args.collection)?;
        let metric: AggregateMetric = args.metric.parse()?;

        if let Some(group_by) = &args.group_by {
            if !schema.has_field(group_by) {
                return Err(ToolError::InvalidAggregation {
                    reason: format!("unknown group_by field '{group_by}' for {}", schema.name),
                });
            }
        }
        if let Some(unknown) = args.filters.keys().find(|key| !schema.has_field(key)) {
            return Err(ToolError::InvalidAggregation {
                reason: format!("unknown filter field '{unknown}' for {}", schema.name),
            });
        }
        let field = match metric {
            AggregateMetric::Count => None,
            AggregateMetric::Sum | AggregateMetric::Average => {
                let field = args.field.as_deref().ok_or_else(|| ToolError::InvalidAggregation {
                    reason: format!("metric {} requires a numeric field", args.metric),
                })?;
                if !schema.is_numeric(field) {
                    return Err(ToolError::InvalidAggregation {
                        reason: format!("field '{field}' of {} is not numeric", schema.name),
                    });
                }
                Some(field.to_string())
            }
        };

        let records = self.store.list(&schema.name).await?;

        #[derive(Default)]
        struct Accumulator {
            count: usize,
            sum: f64,
            numeric: usize,
        }

        let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
        if args.group_by.is_none() {
            groups.insert("all".to_string(), Accumulator::default());
        }

        for record in records.iter().filter(|r| matches_filters(r, &args.filters)) {
            let key = match &args.group_by {
                Some(group_by) => record
                    .field(group_by)
                    .filter(|value| !value.is_null())
                    .map(|value| display_value(&value))
                    .unwrap_or_else(|| "(none)".to_string()),
                None => "all".to_string(),
            };
            let acc = groups.entry(key).or_default();
            acc.count += 1;
            let measured = field.as_deref().and_then(|f| record.field(f));
            if let Some(number) = measured.as_ref().and_then(as_number) {
                acc.sum += number;
                acc.numeric += 1;
            }
        }

        let groups = groups
            .into_iter()
            .map(|(key, acc)| AggregateGroup {
                value: match metric {
                    AggregateMetric::Count => acc.count as f64,
                    AggregateMetric::Sum => acc.sum,
                    AggregateMetric::Average if acc.numeric > 0 => acc.sum / acc.numeric as f64,
                    AggregateMetric::Average => 0.0,
                },
                count: acc.count,
                key,
            })
            .collect();

        Ok(AggregateResult {
            collection: schema.name.clone(),
            metric,
            group_by: args.group_by,
            field,
            groups,
        })
    }

    pub async fn fetch_by_id(&self, args: FetchArgs) -> ToolResult<Record> {
        let schema = self.registry.get(&args.collection)?;
        self.store
            .get(&schema.name, &args.id)
            .await?
            .ok_or_else(|| ToolError::not_found(&schema.name, &args.id))
    }

    /// Partial update. Immutable, unknown and malformed fields are rejected
    /// before the store is touched.
    pub async fn edit(&self, args: EditArgs) -> ToolResult<Record> {
        let schema = self.registry.get(&args.collection)?;
        if args.fields.is_empty() {
            return Err(ToolError::validation("no fields to update", Vec::new()));
        }

        let immutable: Vec<String> = args
            .fields
            .keys()
            .filter(|key| schema.is_immutable(key))
            .cloned()
            .collect();
        if !immutable.is_empty() {
            return Err(ToolError::validation(
                format!("immutable fields cannot be changed: {}", immutable.join(", ")),
                immutable,
            ));
        }
        check_field_values(schema, &args.fields)?;

        let blanked: Vec<String> = schema
            .required_fields
            .iter()
            .filter(|field| args.fields.contains_key(*field) && is_blank(args.fields.get(*field)))
            .cloned()
            .collect();
        if !blanked.is_empty() {
            return Err(ToolError::validation(
                format!("required fields cannot be cleared: {}", blanked.join(", ")),
                blanked,
            ));
        }

        // Held until the merged record is written back
        let lock = self.edit_lock(&schema.name);
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .get(&schema.name, &args.id)
            .await?
            .ok_or_else(|| ToolError::not_found(&schema.name, &args.id))?;

        for (key, value) in args.fields {
            if value.is_null() {
                record.fields.remove(&key);
            } else {
                record.fields.insert(key, value);
            }
        }
        record.updated_at = Utc::now();

        self.store.update(record.clone()).await?;
        tracing::info!(collection = %schema.name, id = %record.id, "Record updated");
        Ok(record)
    }

    /// Insert a new record once every required field is present and valid.
    pub async fn create(&self, args: CreateArgs) -> ToolResult<Record> {
        let schema = self.registry.get(&args.collection)?;

        let system: Vec<String> = args
            .fields
            .keys()
            .filter(|key| SYSTEM_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        if !system.is_empty() {
            return Err(ToolError::validation(
                format!("fields are assigned by the store: {}", system.join(", ")),
                system,
            ));
        }
        check_field_values(schema, &args.fields)?;

        let mut fields = args.fields;
        for (key, value) in &schema.defaults {
            if is_blank(fields.get(key)) {
                fields.insert(key.clone(), value.clone());
            }
        }

        let missing: Vec<String> = schema
            .required_fields
            .iter()
            .filter(|field| is_blank(fields.get(*field)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::validation(
                format!("missing required fields: {}", missing.join(", ")),
                missing,
            ));
        }

        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            collection: schema.name.clone(),
            fields,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;
        tracing::info!(collection = %schema.name, id = %record.id, "Record created");
        Ok(record)
    }
}

/// Unknown field names and non-numeric values for numeric fields
fn check_field_values(schema: &CollectionSchema, fields: &Map<String, Value>) -> ToolResult<()> {
    let unknown: Vec<String> = fields
        .keys()
        .filter(|key| !schema.has_field(key))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ToolError::validation(
            format!("unknown fields for {}: {}", schema.name, unknown.join(", ")),
            unknown,
        ));
    }

    let invalid: Vec<String> = fields
        .iter()
        .filter(|(key, value)| {
            schema.is_numeric(key) && !value.is_null() && as_number(value).is_none()
        })
        .map(|(key, _)| key.clone())
        .collect();
    if !invalid.is_empty() {
        return Err(ToolError::validation(
            format!("fields must be numeric: {}", invalid.join(", ")),
            invalid,
        ));
    }
    Ok(())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn matches_filters(record: &Record, filters: &BTreeMap<String, Value>) -> bool {
    filters.iter().all(|(key, expected)| match record.field(key) {
        Some(actual) if actual == *expected => true,
        Some(actual) => display_value(&actual).eq_ignore_ascii_case(&display_value(expected)),
        None => expected.is_null(),
    })
}

fn record_tokens(record: &Record) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(&record.id).into_iter().collect();
    for value in record.fields.values() {
        tokens.extend(tokenize(&display_value(value)));
    }
    tokens
}
