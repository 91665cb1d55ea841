//! Rule-table query classifier

use regex::{Regex, RegexBuilder};

use super::config::ClassificationConfig;
use super::decision::{ClassificationDecision, QueryRoute};
use super::error::ClassifierError;
use crate::tools::CollectionRegistry;

/// A compiled trigger pattern, kept alongside its source text
#[derive(Debug, Clone)]
struct Rule {
    source: String,
    regex: Regex,
}

impl Rule {
    fn compile(table: &str, pattern: &str) -> Result<Self, ClassifierError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ClassifierError::InvalidPattern {
                table: table.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }
}

/// Alias patterns that point a query at one collection
#[derive(Debug, Clone)]
struct CollectionMatcher {
    collection: String,
    aliases: Vec<Regex>,
}

/// Maps a free-text query onto a [`QueryRoute`].
///
/// Both rule tables are evaluated in full, so the decision depends only on
/// which patterns matched, never on their order. Classification holds no
/// state between calls.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    conceptual: Vec<Rule>,
    data: Vec<Rule>,
    collections: Vec<CollectionMatcher>,
}

impl QueryClassifier {
    pub fn new(
        config: &ClassificationConfig,
        registry: &CollectionRegistry,
    ) -> Result<Self, ClassifierError> {
        let conceptual = config
            .conceptual_patterns
            .iter()
            .map(|p| Rule::compile("conceptual", p))
            .collect::<Result<Vec<_>, _>>()?;
        let data = config
            .data_patterns
            .iter()
            .map(|p| Rule::compile("data", p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut collections = Vec::new();
        for schema in registry.schemas() {
            let mut aliases = Vec::new();
            for alias in schema.aliases.iter().chain(std::iter::once(&schema.name)) {
                // Multi-word aliases tolerate any run of whitespace or underscores
                let words: Vec<String> = alias
                    .split(|c: char| c.is_whitespace() || c == '_')
                    .filter(|w| !w.is_empty())
                    .map(regex::escape)
                    .collect();
                if words.is_empty() {
                    continue;
                }
                let pattern = format!(r"\b{}\b", words.join(r"[\s_]+"));
                let regex = RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ClassifierError::InvalidAlias {
                        collection: schema.name.clone(),
                        reason: e.to_string(),
                    })?;
                aliases.push(regex);
            }
            collections.push(CollectionMatcher {
                collection: schema.name.clone(),
                aliases,
            });
        }

        Ok(Self {
            conceptual,
            data,
            collections,
        })
    }

    /// Classify a query. Pure: identical input yields an identical decision.
    pub fn classify(&self, query: &str) -> ClassificationDecision {
        let conceptual_matches = Self::matching(&self.conceptual, query);
        let data_matches = Self::matching(&self.data, query);

        let route = match (conceptual_matches.is_empty(), data_matches.is_empty()) {
            (false, true) => QueryRoute::Semantic,
            (true, false) => QueryRoute::Structured,
            // Both or neither: consult everything rather than under-retrieve
            _ => QueryRoute::Combined,
        };

        let confidence = match route {
            QueryRoute::Semantic => Self::one_sided_confidence(conceptual_matches.len()),
            QueryRoute::Structured => Self::one_sided_confidence(data_matches.len()),
            QueryRoute::Combined if conceptual_matches.is_empty() => 0.25,
            QueryRoute::Combined => 0.5,
        };

        let target_collections = if route.wants_structured() {
            self.target_collections(query)
        } else {
            Vec::new()
        };

        tracing::debug!(
            %route,
            confidence,
            collections = ?target_collections,
            "Classified query"
        );

        ClassificationDecision {
            query: query.to_string(),
            route,
            confidence,
            target_collections,
            conceptual_matches,
            data_matches,
        }
    }

    /// Every collection whose name or alias appears in the query
    pub fn target_collections(&self, query: &str) -> Vec<String> {
        self.collections
            .iter()
            .filter(|matcher| matcher.aliases.iter().any(|alias| alias.is_match(query)))
            .map(|matcher| matcher.collection.clone())
            .collect()
    }

    fn matching(rules: &[Rule], query: &str) -> Vec<String> {
        rules
            .iter()
            .filter(|rule| rule.regex.is_match(query))
            .map(|rule| rule.source.clone())
            .collect()
    }

    fn one_sided_confidence(matches: usize) -> f32 {
        if matches >= 2 {
            1.0
        } else {
            0.75
        }
    }
}
