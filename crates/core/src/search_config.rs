//! Per-request retrieval strategy record
//!
//! Resolved from the query subtype by the workflow's strategy table, then
//! adjusted by entity types and query type. Every field is plain data so the
//! resolver can deep-copy the static table entry per call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A physical backend participating in retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Sql,
    Vector,
    Es,
    Graph,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::Sql => "sql",
            SearchSource::Vector => "vector",
            SearchSource::Es => "es",
            SearchSource::Graph => "graph",
        }
    }
}

/// Graph-RAG retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphRagStrategy {
    #[default]
    None,
    VectorOnly,
    GraphOnly,
    GraphEnhanced,
    Hybrid,
}

/// How ES participates in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EsMode {
    #[default]
    Off,
    KeywordBoost,
    Aggregation,
}

/// The per-request strategy record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ordered primary backends
    pub primary_sources: Vec<SearchSource>,
    pub fallback_sources: Vec<SearchSource>,
    pub graph_rag_strategy: GraphRagStrategy,
    pub es_mode: EsMode,
    /// Source name -> priority; lower sorts first in the merger
    pub merge_priority: HashMap<String, u8>,
    pub sql_limit: usize,
    pub rag_limit: usize,
    pub es_limit: usize,
    pub need_vector_enhancement: bool,
    pub use_loader: bool,
    pub loader_name: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            primary_sources: vec![SearchSource::Sql],
            fallback_sources: Vec::new(),
            graph_rag_strategy: GraphRagStrategy::None,
            es_mode: EsMode::Off,
            merge_priority: default_merge_priority(),
            sql_limit: 20,
            rag_limit: 20,
            es_limit: 20,
            need_vector_enhancement: true,
            use_loader: false,
            loader_name: None,
        }
    }
}

pub fn default_merge_priority() -> HashMap<String, u8> {
    HashMap::from([
        ("sql".to_string(), 0),
        ("vector".to_string(), 1),
        ("es".to_string(), 2),
        ("graph".to_string(), 3),
    ])
}

impl SearchConfig {
    pub fn priority_of(&self, source_kind: &str) -> u8 {
        // source kinds seen in SourceRef map onto the four priority keys
        let key = match source_kind {
            "rag" | "vector" => "vector",
            "elasticsearch" | "es" => "es",
            "graph" => "graph",
            "sql" => "sql",
            _ => return 99,
        };
        self.merge_priority.get(key).copied().unwrap_or(99)
    }

    pub fn sql_only(&self) -> bool {
        self.primary_sources == [SearchSource::Sql]
    }

    pub fn vector_only(&self) -> bool {
        self.primary_sources == [SearchSource::Vector]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_ordering() {
        let config = SearchConfig::default();
        assert!(config.priority_of("sql") < config.priority_of("vector"));
        assert!(config.priority_of("vector") < config.priority_of("es"));
        assert!(config.priority_of("es") < config.priority_of("graph"));
        assert_eq!(config.priority_of("unknown"), 99);
    }

    #[test]
    fn test_source_kind_aliases() {
        let config = SearchConfig::default();
        assert_eq!(config.priority_of("rag"), config.priority_of("vector"));
        assert_eq!(
            config.priority_of("elasticsearch"),
            config.priority_of("es")
        );
    }

    #[test]
    fn test_es_mode_ordering() {
        assert!(EsMode::Off < EsMode::KeywordBoost);
        assert!(EsMode::KeywordBoost < EsMode::Aggregation);
    }
}
