//! Classification outcome types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which retrieval paths a query should take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRoute {
    /// Embedding index only
    Semantic,
    /// Structured record tools only
    Structured,
    /// Both paths, merged by the orchestrator
    Combined,
}

impl QueryRoute {
    pub fn wants_semantic(self) -> bool {
        matches!(self, QueryRoute::Semantic | QueryRoute::Combined)
    }

    pub fn wants_structured(self) -> bool {
        matches!(self, QueryRoute::Structured | QueryRoute::Combined)
    }
}

impl fmt::Display for QueryRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRoute::Semantic => write!(f, "semantic"),
            QueryRoute::Structured => write!(f, "structured"),
            QueryRoute::Combined => write!(f, "combined"),
        }
    }
}

/// Per-request routing decision; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    pub query: String,
    pub route: QueryRoute,
    /// 0.0 - 1.0
    pub confidence: f32,
    /// Collections named in the query, in registry order
    pub target_collections: Vec<String>,
    pub conceptual_matches: Vec<String>,
    pub data_matches: Vec<String>,
}
