//! Context bundle: the merged, provenance-tagged retrieval result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::rag::ScoredChunk;
use crate::routing::QueryRoute;
use crate::tools::{AggregateResult, Record, ScoredRecord};

/// Which retrieval path produced an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Semantic,
    Structured,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Semantic => write!(f, "semantic"),
            Origin::Structured => write!(f, "structured"),
        }
    }
}

/// Where an item came from, carried through every merge step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: Origin,
    /// Knowledge source path or collection name
    pub source: String,
    /// Structured tool that produced the item
    pub tool: Option<String>,
    pub title: String,
}

impl Provenance {
    /// `[semantic: policies/leave.md]`, `[structured: leave_requests/search]`
    pub fn tag(&self) -> String {
        match &self.tool {
            Some(tool) => format!("[{}: {}/{}]", self.origin, self.source, tool),
            None => format!("[{}: {}]", self.origin, self.source),
        }
    }
}

/// Chunk payload without its embedding vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkExcerpt {
    pub chunk_id: String,
    pub category: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleContent {
    Chunk(ChunkExcerpt),
    Record(Record),
    Aggregate(AggregateResult),
}

/// One retrieved item with a relevance score on the common 0-1 scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleItem {
    pub provenance: Provenance,
    pub relevance: f32,
    pub content: BundleContent,
}

impl BundleItem {
    pub fn from_chunk(hit: ScoredChunk) -> Self {
        let chunk = hit.chunk;
        Self {
            provenance: Provenance {
                origin: Origin::Semantic,
                source: chunk.source.clone(),
                tool: None,
                title: chunk.title.clone(),
            },
            relevance: hit.similarity.clamp(0.0, 1.0),
            content: BundleContent::Chunk(ChunkExcerpt {
                chunk_id: chunk.id,
                category: chunk.category,
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                text: chunk.text,
            }),
        }
    }

    pub fn from_record(hit: ScoredRecord, tool: &str) -> Self {
        Self {
            provenance: Provenance {
                origin: Origin::Structured,
                source: hit.record.collection.clone(),
                tool: Some(tool.to_string()),
                title: hit.record.label(),
            },
            relevance: hit.relevance.clamp(0.0, 1.0),
            content: BundleContent::Record(hit.record),
        }
    }

    /// `relevance` reflects how directly the query named the collection
    pub fn from_aggregate(result: AggregateResult, relevance: f32) -> Self {
        Self {
            provenance: Provenance {
                origin: Origin::Structured,
                source: result.collection.clone(),
                tool: Some("aggregate".to_string()),
                title: format!("{} summary", result.collection),
            },
            relevance: relevance.clamp(0.0, 1.0),
            content: BundleContent::Aggregate(result),
        }
    }

    pub fn origin(&self) -> Origin {
        self.provenance.origin
    }

    /// Identity used for de-duplication across and within paths
    pub fn dedup_key(&self) -> String {
        match &self.content {
            BundleContent::Chunk(chunk) => format!("chunk:{}", chunk.chunk_id),
            BundleContent::Record(record) => format!("record:{}/{}", record.collection, record.id),
            BundleContent::Aggregate(result) => format!(
                "aggregate:{}:{:?}:{}:{}",
                result.collection,
                result.metric,
                result.group_by.as_deref().unwrap_or("-"),
                result.field.as_deref().unwrap_or("-"),
            ),
        }
    }

    /// Provenance tag followed by the item's text
    pub fn render(&self) -> String {
        let body = match &self.content {
            BundleContent::Chunk(chunk) => chunk.text.trim().to_string(),
            BundleContent::Record(record) => format!("{}: {}", record.label(), record.summary()),
            BundleContent::Aggregate(result) => result.summary(),
        };
        format!("{} {}", self.provenance.tag(), body)
    }
}

/// Outcome of one retrieval path for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathStatus {
    NotRequested,
    Succeeded { hits: usize },
    /// Some lookups on the path failed while others returned results
    Degraded { hits: usize, failures: Vec<String> },
    Failed { reason: String },
}

impl PathStatus {
    pub fn failed(&self) -> bool {
        matches!(self, PathStatus::Failed { .. })
    }

    pub fn degraded(&self) -> bool {
        matches!(self, PathStatus::Degraded { .. })
    }

    pub fn hits(&self) -> usize {
        match self {
            PathStatus::Succeeded { hits } | PathStatus::Degraded { hits, .. } => *hits,
            _ => 0,
        }
    }
}

/// Everything retrieved for one query, ranked and capped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub query: String,
    pub route: QueryRoute,
    pub items: Vec<BundleItem>,
    pub semantic: PathStatus,
    pub structured: PathStatus,
    /// A requested path, or some lookup within one, failed
    pub partial: bool,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_origin(&self, origin: Origin) -> bool {
        self.items.iter().any(|item| item.origin() == origin)
    }

    pub fn max_relevance(&self) -> Option<f32> {
        self.items
            .iter()
            .map(|item| item.relevance)
            .fold(None, |best, r| Some(best.map_or(r, |b: f32| b.max(r))))
    }

    /// Distinct provenance entries in ranking order
    pub fn sources(&self) -> Vec<Provenance> {
        let mut sources: Vec<Provenance> = Vec::new();
        for item in &self.items {
            if !sources.contains(&item.provenance) {
                sources.push(item.provenance.clone());
            }
        }
        sources
    }
}

fn by_relevance(a: &BundleItem, b: &BundleItem) -> std::cmp::Ordering {
    b.relevance
        .partial_cmp(&a.relevance)
        .unwrap_or(std::cmp::Ordering::Equal)
}

/// Keep the highest-scoring copy of each item, best first
fn dedup(items: Vec<BundleItem>) -> Vec<BundleItem> {
    let mut best: HashMap<String, BundleItem> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for item in items {
        let key = item.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.relevance >= item.relevance => {}
            Some(_) => {
                best.insert(key, item);
            }
            None => {
                order.push(key.clone());
                best.insert(key, item);
            }
        }
    }
    let mut unique: Vec<BundleItem> = order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect();
    unique.sort_by(by_relevance);
    unique
}

/// Merge both paths into at most `cap` items.
///
/// When both inputs are non-empty and `cap >= 2`, the best item of each
/// origin is always kept; remaining slots go to the highest relevance.
pub fn merge(
    semantic: Vec<BundleItem>,
    structured: Vec<BundleItem>,
    cap: usize,
) -> Vec<BundleItem> {
    let mut semantic = dedup(semantic);
    let mut structured = dedup(structured);

    let mut merged: Vec<BundleItem> = Vec::with_capacity(cap);
    if cap >= 2 && !semantic.is_empty() && !structured.is_empty() {
        merged.push(semantic.remove(0));
        merged.push(structured.remove(0));
    }

    let mut rest: Vec<BundleItem> = semantic.into_iter().chain(structured).collect();
    rest.sort_by(by_relevance);
    let room = cap.saturating_sub(merged.len());
    merged.extend(rest.into_iter().take(room));

    merged.sort_by(by_relevance);
    merged.truncate(cap);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;

    fn chunk_item(id: &str, relevance: f32) -> BundleItem {
        BundleItem {
            provenance: Provenance {
                origin: Origin::Semantic,
                source: "policies/leave.md".into(),
                tool: None,
                title: "Leave Policy".into(),
            },
            relevance,
            content: BundleContent::Chunk(ChunkExcerpt {
                chunk_id: id.into(),
                category: "policy".into(),
                chunk_index: 0,
                total_chunks: 1,
                text: "Sick leave needs a certificate.".into(),
            }),
        }
    }

    fn record_item(id: &str, relevance: f32) -> BundleItem {
        let now = Utc::now();
        BundleItem::from_record(
            ScoredRecord {
                record: Record {
                    id: id.into(),
                    collection: "leave_requests".into(),
                    fields: Map::new(),
                    created_at: now,
                    updated_at: now,
                },
                score: 1,
                relevance,
            },
            "search",
        )
    }

    #[test]
    fn test_merge_keeps_one_of_each_origin() {
        let semantic = (0..6).map(|i| chunk_item(&format!("c{i}"), 0.9)).collect();
        let structured = vec![record_item("l-1", 0.2)];
        let merged = merge(semantic, structured, 4);
        assert_eq!(merged.len(), 4);
        assert!(merged.iter().any(|i| i.origin() == Origin::Semantic));
        assert!(merged.iter().any(|i| i.origin() == Origin::Structured));
        assert!(merged.windows(2).all(|w| w[0].relevance >= w[1].relevance));
    }

    #[test]
    fn test_merge_deduplicates_by_identity() {
        let semantic = vec![chunk_item("c1", 0.4), chunk_item("c1", 0.7)];
        let structured = vec![record_item("l-1", 0.5), record_item("l-1", 0.5)];
        let merged = merge(semantic, structured, 8);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].relevance, 0.7);
    }

    #[test]
    fn test_merge_with_single_slot_takes_best() {
        let merged = merge(vec![chunk_item("c1", 0.3)], vec![record_item("l-1", 0.8)], 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].origin(), Origin::Structured);
        assert!(merge(vec![chunk_item("c1", 0.3)], Vec::new(), 0).is_empty());
    }

    #[test]
    fn test_render_carries_provenance_tag() {
        let rendered = record_item("l-1", 0.5).render();
        assert!(rendered.starts_with("[structured: leave_requests/search]"));
        let rendered = chunk_item("c1", 0.5).render();
        assert!(rendered.starts_with("[semantic: policies/leave.md]"));
    }
}
