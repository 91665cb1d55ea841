//! Executes a classification decision against the index and the tools.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::bundle::{merge, BundleItem, ContextBundle, PathStatus};
use super::error::RetrievalError;
use crate::config::RetrievalConfig;
use crate::rag::EmbeddingIndex;
use crate::routing::ClassificationDecision;
use crate::text::tokenize;
use crate::tools::{
    AggregateArgs, AggregateMetric, CollectionSchema, SearchArgs, StructuredToolSet,
};

/// Status words recognised as an exact filter on a `status` field
const STATUS_WORDS: &[&str] = &[
    "pending", "approved", "rejected", "cancelled", "active", "inactive", "present", "absent",
];

/// Aggregates the query named a collection for
const TARGETED_AGGREGATE_RELEVANCE: f32 = 1.0;

/// Aggregates run across every collection because none was named
const UNTARGETED_AGGREGATE_RELEVANCE: f32 = 0.5;

/// Items from one path plus the lookups on it that failed
#[derive(Debug, Default)]
struct PathItems {
    items: Vec<BundleItem>,
    failures: Vec<String>,
}

/// Structured lookup planned for one collection
#[derive(Debug, Clone)]
enum StructuredPlan {
    Search(SearchArgs),
    Aggregate(AggregateArgs),
}

/// Runs the retrieval paths a query was routed to and merges their results.
///
/// The orchestrator only calls the index's and the tool set's contracted
/// operations. It never retries; a failed call is reported in the bundle
/// or, when nothing is usable, as [`RetrievalError::Unavailable`].
pub struct RetrievalOrchestrator {
    index: Arc<EmbeddingIndex>,
    tools: StructuredToolSet,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        tools: StructuredToolSet,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Build the context bundle for one classified query.
    pub async fn retrieve(
        &self,
        decision: &ClassificationDecision,
    ) -> Result<ContextBundle, RetrievalError> {
        let wants_semantic = decision.route.wants_semantic();
        let wants_structured = decision.route.wants_structured();

        // The two paths share nothing, so they run concurrently
        let (semantic, structured) = tokio::join!(
            async {
                if wants_semantic {
                    Some(self.semantic_path(&decision.query).await)
                } else {
                    None
                }
            },
            async {
                if wants_structured {
                    Some(self.structured_path(decision).await)
                } else {
                    None
                }
            }
        );

        let (semantic_items, semantic_status) = Self::settle(semantic);
        let (structured_items, structured_status) = Self::settle(structured);

        let requested = usize::from(wants_semantic) + usize::from(wants_structured);
        let failed =
            usize::from(semantic_status.failed()) + usize::from(structured_status.failed());

        if failed == requested {
            let reason = |status: &PathStatus| match status {
                PathStatus::Failed { reason } => Some(reason.clone()),
                _ => None,
            };
            tracing::warn!(route = %decision.route, "All requested retrieval paths failed");
            return Err(RetrievalError::Unavailable {
                semantic: reason(&semantic_status),
                structured: reason(&structured_status),
            });
        }

        let partial =
            failed > 0 || semantic_status.degraded() || structured_status.degraded();
        if partial {
            tracing::warn!(
                route = %decision.route,
                semantic = ?semantic_status,
                structured = ?structured_status,
                "Degraded to partial retrieval"
            );
        }

        let items = merge(semantic_items, structured_items, self.config.max_bundle_items);
        tracing::debug!(
            route = %decision.route,
            items = items.len(),
            semantic_hits = semantic_status.hits(),
            structured_hits = structured_status.hits(),
            "Assembled context bundle"
        );

        Ok(ContextBundle {
            query: decision.query.clone(),
            route: decision.route,
            items,
            semantic: semantic_status,
            structured: structured_status,
            partial,
        })
    }

    fn settle(outcome: Option<Result<PathItems, String>>) -> (Vec<BundleItem>, PathStatus) {
        match outcome {
            None => (Vec::new(), PathStatus::NotRequested),
            Some(Ok(PathItems { items, failures })) => {
                let hits = items.len();
                if failures.is_empty() {
                    (items, PathStatus::Succeeded { hits })
                } else {
                    (items, PathStatus::Degraded { hits, failures })
                }
            }
            Some(Err(reason)) => (Vec::new(), PathStatus::Failed { reason }),
        }
    }

    async fn semantic_path(&self, query: &str) -> Result<PathItems, String> {
        let hits = self
            .index
            .similarity_search(query, self.config.top_k, self.config.similarity_threshold)
            .await
            .map_err(|e| e.to_string())?;
        Ok(PathItems {
            items: hits.into_iter().map(BundleItem::from_chunk).collect(),
            failures: Vec::new(),
        })
    }

    /// Search (or aggregate) every target collection concurrently. The path
    /// fails only if every call failed; otherwise failed calls are carried
    /// alongside the items.
    async fn structured_path(
        &self,
        decision: &ClassificationDecision,
    ) -> Result<PathItems, String> {
        let registry = self.tools.registry();
        let aggregate_relevance = if decision.target_collections.is_empty() {
            UNTARGETED_AGGREGATE_RELEVANCE
        } else {
            TARGETED_AGGREGATE_RELEVANCE
        };
        let schemas: Vec<&CollectionSchema> = if decision.target_collections.is_empty() {
            registry.schemas().iter().collect()
        } else {
            decision
                .target_collections
                .iter()
                .filter_map(|name| registry.get(name).ok())
                .collect()
        };
        if schemas.is_empty() {
            return Ok(PathItems::default());
        }

        let plans: Vec<StructuredPlan> = schemas
            .iter()
            .map(|schema| self.plan(&decision.query, schema))
            .collect();

        let calls = plans.into_iter().map(|plan| async move {
            match plan {
                StructuredPlan::Search(args) => {
                    let collection = args.collection.clone();
                    self.tools
                        .search(args)
                        .await
                        .map(|hits| {
                            hits.into_iter()
                                .map(|hit| BundleItem::from_record(hit, "search"))
                                .collect::<Vec<_>>()
                        })
                        .map_err(|e| format!("{collection}: {e}"))
                }
                StructuredPlan::Aggregate(args) => {
                    let collection = args.collection.clone();
                    self.tools
                        .aggregate(args)
                        .await
                        .map(|result| {
                            vec![BundleItem::from_aggregate(result, aggregate_relevance)]
                        })
                        .map_err(|e| format!("{collection}: {e}"))
                }
            }
        });

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for outcome in join_all(calls).await {
            match outcome {
                Ok(found) => items.extend(found),
                Err(reason) => {
                    tracing::warn!(%reason, "Structured lookup failed");
                    errors.push(reason);
                }
            }
        }

        if !errors.is_empty() && errors.len() == schemas.len() {
            return Err(errors.join("; "));
        }
        Ok(PathItems {
            items,
            failures: errors,
        })
    }

    /// Aggregation verbs turn a lookup into an aggregate call
    fn plan(&self, query: &str, schema: &CollectionSchema) -> StructuredPlan {
        let tokens = tokenize(query);
        let Some(verb) = aggregation_verb(&tokens) else {
            return StructuredPlan::Search(SearchArgs {
                query: query.to_string(),
                collection: schema.name.clone(),
                limit: self.config.structured_limit,
            });
        };

        let numeric_field = mentioned_field(&schema.numeric_fields, &tokens);
        let (metric, field) = match (verb, numeric_field) {
            (AggregateMetric::Average, Some(field)) => (AggregateMetric::Average, Some(field)),
            (AggregateMetric::Average, None) => match schema.numeric_fields.first() {
                Some(field) => (AggregateMetric::Average, Some(field.clone())),
                None => (AggregateMetric::Count, None),
            },
            (AggregateMetric::Sum, Some(field)) => (AggregateMetric::Sum, Some(field)),
            _ => (AggregateMetric::Count, None),
        };

        // "by <field>" / "per <field>"
        let group_by = tokens
            .windows(2)
            .find(|pair| pair[0] == "by" || pair[0] == "per")
            .and_then(|pair| {
                let word = pair[1].as_str();
                schema
                    .fields
                    .iter()
                    .find(|field| {
                        field.as_str() == word || field.split('_').any(|part| part == word)
                    })
                    .cloned()
            });

        let mut filters = BTreeMap::new();
        if schema.has_field("status") {
            if let Some(status) = tokens.iter().find(|t| STATUS_WORDS.contains(&t.as_str())) {
                filters.insert("status".to_string(), serde_json::Value::String(status.clone()));
            }
        }

        StructuredPlan::Aggregate(AggregateArgs {
            collection: schema.name.clone(),
            group_by,
            metric: match metric {
                AggregateMetric::Count => "count",
                AggregateMetric::Sum => "sum",
                AggregateMetric::Average => "average",
            }
            .to_string(),
            field,
            filters,
        })
    }
}

/// Metric implied by the first aggregation verb in the query, if any
fn aggregation_verb(tokens: &[String]) -> Option<AggregateMetric> {
    tokens.iter().enumerate().find_map(|(i, token)| {
        let next = tokens.get(i + 1).map(String::as_str);
        match (token.as_str(), next) {
            ("average" | "avg" | "mean", _) => Some(AggregateMetric::Average),
            ("total" | "sum", _) => Some(AggregateMetric::Sum),
            ("count", _) | ("how", Some("many")) | ("number", Some("of")) => {
                Some(AggregateMetric::Count)
            }
            _ => None,
        }
    })
}

/// First field whose name words all appear in the query
fn mentioned_field(fields: &[String], tokens: &[String]) -> Option<String> {
    fields
        .iter()
        .find(|field| {
            field
                .split('_')
                .all(|part| tokens.iter().any(|token| token == part))
        })
        .or_else(|| {
            fields.iter().find(|field| {
                field
                    .split('_')
                    .any(|part| tokens.iter().any(|token| token == part))
            })
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{DocumentInput, EmbeddingService, HashingEmbeddingService, IndexError};
    use crate::routing::{ClassificationConfig, QueryClassifier};
    use crate::retrieval::bundle::{BundleContent, Origin};
    use crate::tools::{
        CollectionRegistry, InMemoryRecordStore, Record, RecordStore, ToolError, ToolResult,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingService for DownEmbedder {
        async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>, IndexError> {
            Err(IndexError::EmbeddingUnavailable {
                reason: "embedding service down".into(),
            })
        }

        async fn generate_batch_embeddings(
            &self,
            _texts: Vec<&str>,
        ) -> Result<Vec<Vec<f32>>, IndexError> {
            Err(IndexError::EmbeddingUnavailable {
                reason: "embedding service down".into(),
            })
        }

        fn embedding_dimension(&self) -> usize {
            16
        }
    }

    fn record(collection: &str, id: &str, fields: serde_json::Value) -> Record {
        let now = Utc::now();
        Record {
            id: id.into(),
            collection: collection.into(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn seeded_store() -> InMemoryRecordStore {
        InMemoryRecordStore::with_records(vec![
            record(
                "students",
                "s-1",
                json!({"name": "Asha", "roll_number": "CS001", "department": "CS",
                       "attendance_percentage": 72, "status": "active"}),
            ),
            record(
                "students",
                "s-2",
                json!({"name": "Ravi", "roll_number": "ME002", "department": "ME",
                       "attendance_percentage": 91, "status": "active"}),
            ),
            record(
                "attendance",
                "a-1",
                json!({"student_id": "s-1", "course_code": "CS101", "date": "2024-02-01",
                       "status": "absent"}),
            ),
            record(
                "leave_requests",
                "l-1",
                json!({"student_id": "s-1", "leave_type": "sick", "status": "pending"}),
            ),
            record(
                "leave_requests",
                "l-2",
                json!({"student_id": "s-2", "leave_type": "casual", "status": "approved"}),
            ),
        ])
    }

    fn tools() -> StructuredToolSet {
        StructuredToolSet::new(
            Arc::new(seeded_store()),
            Arc::new(CollectionRegistry::default()),
        )
    }

    /// Fails every read of one collection
    struct BrokenCollectionStore {
        inner: InMemoryRecordStore,
        broken: &'static str,
    }

    impl BrokenCollectionStore {
        fn check(&self, collection: &str) -> ToolResult<()> {
            if collection == self.broken {
                return Err(ToolError::storage(format!("{collection} file unreadable")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecordStore for BrokenCollectionStore {
        async fn list(&self, collection: &str) -> ToolResult<Vec<Record>> {
            self.check(collection)?;
            self.inner.list(collection).await
        }

        async fn get(&self, collection: &str, id: &str) -> ToolResult<Option<Record>> {
            self.check(collection)?;
            self.inner.get(collection, id).await
        }

        async fn insert(&self, record: Record) -> ToolResult<()> {
            self.inner.insert(record).await
        }

        async fn update(&self, record: Record) -> ToolResult<()> {
            self.inner.update(record).await
        }
    }

    async fn healthy_index() -> Arc<EmbeddingIndex> {
        let index = EmbeddingIndex::new(Arc::new(HashingEmbeddingService::new(256)));
        index
            .add_documents(
                vec![
                    DocumentInput::new(
                        "policies/attendance.md",
                        "Attendance Policy",
                        "policy",
                        "The attendance policy requires students to attend 75% of classes.",
                    ),
                    DocumentInput::new(
                        "policies/leave.md",
                        "Leave Policy",
                        "policy",
                        "Sick leave policy: submit a leave request with a medical certificate.",
                    ),
                ],
                500,
                50,
            )
            .await
            .unwrap();
        Arc::new(index)
    }

    fn offline_index() -> Arc<EmbeddingIndex> {
        Arc::new(EmbeddingIndex::new(Arc::new(DownEmbedder)))
    }

    fn classify(query: &str) -> ClassificationDecision {
        QueryClassifier::new(&ClassificationConfig::default(), &CollectionRegistry::default())
            .unwrap()
            .classify(query)
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            top_k: 5,
            similarity_threshold: 0.05,
            structured_limit: 5,
            max_bundle_items: 4,
        }
    }

    #[tokio::test]
    async fn test_combined_bundle_has_both_origins() {
        let orchestrator = RetrievalOrchestrator::new(healthy_index().await, tools(), config());
        let decision = classify("Explain the attendance policy and show me students in CS");
        let bundle = orchestrator.retrieve(&decision).await.unwrap();

        assert!(bundle.has_origin(Origin::Semantic));
        assert!(bundle.has_origin(Origin::Structured));
        assert!(bundle.items.len() <= 4);
        assert!(!bundle.partial);
        assert!(bundle
            .items
            .iter()
            .all(|item| !item.provenance.source.is_empty()));
    }

    #[tokio::test]
    async fn test_structured_route_skips_index() {
        let orchestrator = RetrievalOrchestrator::new(offline_index(), tools(), config());
        let decision = classify("Show me all pending leave requests");
        let bundle = orchestrator.retrieve(&decision).await.unwrap();

        assert_eq!(bundle.semantic, PathStatus::NotRequested);
        assert_eq!(bundle.structured, PathStatus::Succeeded { hits: 1 });
        assert!(!bundle.partial);
        match &bundle.items[0].content {
            BundleContent::Record(record) => assert_eq!(record.id, "l-1"),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades_to_structured() {
        let orchestrator = RetrievalOrchestrator::new(offline_index(), tools(), config());
        let decision = classify("Explain the attendance policy and show me students in CS");
        let bundle = orchestrator.retrieve(&decision).await.unwrap();

        assert!(bundle.partial);
        assert!(bundle.semantic.failed());
        assert!(bundle.has_origin(Origin::Structured));
        assert!(!bundle.has_origin(Origin::Semantic));
    }

    #[tokio::test]
    async fn test_single_failed_path_is_unavailable() {
        let orchestrator = RetrievalOrchestrator::new(offline_index(), tools(), config());
        let decision = classify("What is the leave policy for sick days?");
        let err = orchestrator.retrieve(&decision).await.unwrap_err();
        assert_eq!(err.kind(), "RetrievalUnavailable");
    }

    #[tokio::test]
    async fn test_failed_collection_marks_bundle_partial() {
        let store = BrokenCollectionStore {
            inner: seeded_store(),
            broken: "students",
        };
        let tools =
            StructuredToolSet::new(Arc::new(store), Arc::new(CollectionRegistry::default()));
        let orchestrator = RetrievalOrchestrator::new(healthy_index().await, tools, config());
        let decision = classify("Show me students with pending leave requests");
        assert!(decision.target_collections.contains(&"students".to_string()));
        assert!(decision.target_collections.contains(&"leave_requests".to_string()));

        let bundle = orchestrator.retrieve(&decision).await.unwrap();
        match &bundle.structured {
            PathStatus::Degraded { hits, failures } => {
                assert_eq!(*hits, 1);
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("students"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(bundle.partial);
        assert!(bundle.has_origin(Origin::Structured));
    }

    #[tokio::test]
    async fn test_aggregation_verbs_use_aggregate() {
        let orchestrator = RetrievalOrchestrator::new(healthy_index().await, tools(), config());
        let decision = classify("How many leave requests by status?");
        let bundle = orchestrator.retrieve(&decision).await.unwrap();

        let aggregate = bundle
            .items
            .iter()
            .find_map(|item| match &item.content {
                BundleContent::Aggregate(result) => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(aggregate.collection, "leave_requests");
        assert_eq!(aggregate.group_by.as_deref(), Some("status"));
        assert_eq!(aggregate.groups.len(), 2);
    }

    #[tokio::test]
    async fn test_untargeted_aggregates_rank_below_named_ones() {
        let orchestrator = RetrievalOrchestrator::new(healthy_index().await, tools(), config());

        let untargeted = classify("How many days can I miss before the deadline?");
        assert!(untargeted.target_collections.is_empty());
        assert!(untargeted.route.wants_structured());
        let bundle = orchestrator.retrieve(&untargeted).await.unwrap();
        let aggregates: Vec<f32> = bundle
            .items
            .iter()
            .filter(|item| matches!(item.content, BundleContent::Aggregate(_)))
            .map(|item| item.relevance)
            .collect();
        assert!(!aggregates.is_empty());
        assert!(aggregates.iter().all(|r| (*r - 0.5).abs() < f32::EPSILON));

        let named = classify("How many leave requests by status?");
        let bundle = orchestrator.retrieve(&named).await.unwrap();
        assert!(bundle
            .items
            .iter()
            .filter(|item| matches!(item.content, BundleContent::Aggregate(_)))
            .all(|item| (item.relevance - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_plan_average_picks_mentioned_field() {
        let registry = CollectionRegistry::default();
        let schema = registry.get("students").unwrap();
        let orchestrator = RetrievalOrchestrator::new(offline_index(), tools(), config());
        let query = "average attendance percentage of active students per department";
        match orchestrator.plan(query, schema) {
            StructuredPlan::Aggregate(args) => {
                assert_eq!(args.metric, "average");
                assert_eq!(args.field.as_deref(), Some("attendance_percentage"));
                assert_eq!(args.group_by.as_deref(), Some("department"));
                assert_eq!(args.filters.get("status"), Some(&json!("active")));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }
}
