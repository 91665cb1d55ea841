//! Configuration types for the routing module

use serde::{Deserialize, Serialize};

/// Trigger phrase tables for the query classifier.
///
/// Patterns are regular expressions, matched case-insensitively against the
/// raw query in the order given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Phrases asking for explanations, answered from the knowledge base
    pub conceptual_patterns: Vec<String>,
    /// Phrases asking for records, answered from the record store
    pub data_patterns: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            conceptual_patterns: [
                r"\bwhat\s+(is|are|does|do)\b",
                r"\bexplain\b",
                r"\bhow\s+(do|can|should)\s+(i|we|you|students?)\b",
                r"\bdescribe\b",
                r"\bwhy\b",
                r"\btell\s+me\s+about\b",
                r"\bmeaning\s+of\b",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            data_patterns: [
                r"\bshow\s+me\b",
                r"\bfind\b",
                r"\blist\b",
                r"\bcount\b",
                r"\bhow\s+many\b",
                r"\ball\s+\w+(\s+\w+)?\s+with\b",
                r"\bdisplay\b",
                r"\blook\s*up\b",
                r"\btotal\s+number\b",
                r"\baverage\b",
                r"\bfetch\b",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}
