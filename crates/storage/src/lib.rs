//! Backend clients for the rndsearch orchestrator
//!
//! Four physically separate backends sit behind trait seams so tests can
//! substitute in-memory mocks: PostgreSQL ([`SqlApi`]), the Qdrant vector
//! store ([`VectorApi`]), Elasticsearch ([`EsApi`]), and the graph analytics
//! service ([`GraphApi`]). All clients are process-wide singletons with
//! reentrant methods; the only mutable state is a handful of read-mostly
//! caches inside the graph client.

pub mod elasticsearch;
pub mod graph;
pub mod mock;
pub mod postgres;
pub mod qdrant;

pub use elasticsearch::EsClient;
pub use graph::GraphClient;
pub use postgres::{validate_sql, PostgresClient};
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use rndsearch_core::{CrosstabTable, RankingRow, Result, SqlResult, StatsBucketSet};
use std::collections::HashMap;

/// One point returned by the vector store
#[derive(Debug, Clone, Default)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl VectorHit {
    /// Concatenated text fields used for keyword extraction and verification
    pub fn payload_text(&self) -> String {
        if let Some(text) = self.payload.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
        ["title", "name", "conts_klang_nm", "sbjt_nm", "abstract"]
            .iter()
            .filter_map(|key| self.payload.get(*key).and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One document returned by ES
#[derive(Debug, Clone, Default)]
pub struct EsHit {
    pub id: String,
    pub score: f32,
    pub source: serde_json::Map<String, serde_json::Value>,
}

impl EsHit {
    pub fn source_str(&self, field: &str) -> &str {
        self.source.get(field).and_then(|v| v.as_str()).unwrap_or("")
    }
}

/// A graph vertex with its PageRank score
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub node_id: String,
    pub pagerank: f64,
}

/// A neighbor reached during graph traversal
#[derive(Debug, Clone)]
pub struct GraphNeighbor {
    pub node_id: String,
    pub depth: usize,
}

/// Resolved display attributes of a graph node
#[derive(Debug, Clone, Default)]
pub struct GraphNodeAttrs {
    pub name: String,
    pub entity_type: String,
    pub description: String,
}

/// Parameterized SQL execution with a per-statement timeout
#[async_trait]
pub trait SqlApi: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<SqlResult>;
}

/// Dense-vector search over named collections
#[async_trait]
pub trait VectorApi: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<HashMap<String, String>>,
    ) -> Result<Vec<VectorHit>>;

    async fn scroll(
        &self,
        collection: &str,
        filter: HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;
}

/// Keyword search and aggregations over ES indices
#[async_trait]
pub trait EsApi: Send + Sync {
    /// Feature flag; disabled ES degrades every caller to empty results
    fn is_enabled(&self) -> bool;

    async fn is_available(&self) -> bool;

    async fn search(
        &self,
        query: &str,
        entity_type: &str,
        limit: usize,
        include_highlight: bool,
    ) -> Result<Vec<EsHit>>;

    async fn multi_search(
        &self,
        query: &str,
        entity_types: &[String],
        limit_per_type: usize,
    ) -> Result<HashMap<String, Vec<EsHit>>>;

    async fn aggregate(
        &self,
        query: &str,
        entity_type: &str,
        aggregations: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Yearly / country / applicant statistics (default window: last 10 years)
    async fn entity_statistics(
        &self,
        entity_type: &str,
        keywords: Option<&str>,
        countries: &[String],
        start_year: Option<i32>,
        end_year: Option<i32>,
        group_by: &str,
    ) -> Result<StatsBucketSet>;

    /// Applicant x year nested aggregation with a total >= 3 post-filter
    async fn crosstab_statistics(
        &self,
        entity_type: &str,
        keywords: Option<&str>,
        countries: &[String],
        years_back: i32,
        top_n: usize,
    ) -> Result<CrosstabTable>;

    /// Terms-aggregation ranking on a group field
    async fn ranking(
        &self,
        query: &str,
        entity_type: &str,
        group_field: &str,
        limit: usize,
    ) -> Result<Vec<RankingRow>>;
}

/// Graph analytics over a named graph id
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn pagerank_top_k(&self, top_k: usize) -> Result<Vec<GraphNode>>;

    /// Full Louvain partition map (vertex -> community)
    async fn communities(&self) -> Result<HashMap<String, i64>>;

    async fn node_community(&self, node_id: &str) -> Result<Option<i64>>;

    async fn neighbors(&self, node_id: &str, depth: usize, limit: usize)
        -> Result<Vec<GraphNeighbor>>;

    async fn statistics(&self) -> Result<serde_json::Value>;

    /// Display attributes for a node (cached, LRU-style)
    async fn resolve_node(&self, node_id: &str) -> Result<Option<GraphNodeAttrs>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vector_hit_payload_text_prefers_text_field() {
        let mut payload = serde_json::Map::new();
        payload.insert("text".to_string(), json!("통합 텍스트"));
        payload.insert("title".to_string(), json!("제목"));
        let hit = VectorHit {
            id: "1".into(),
            score: 0.9,
            payload,
        };
        assert_eq!(hit.payload_text(), "통합 텍스트");
    }

    #[test]
    fn test_vector_hit_payload_text_falls_back_to_fields() {
        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), json!("수소연료전지 스택"));
        payload.insert("sbjt_nm".to_string(), json!("연료전지 과제"));
        let hit = VectorHit {
            id: "1".into(),
            score: 0.9,
            payload,
        };
        let text = hit.payload_text();
        assert!(text.contains("수소연료전지 스택"));
        assert!(text.contains("연료전지 과제"));
    }

    #[test]
    fn test_es_hit_source_str() {
        let mut source = serde_json::Map::new();
        source.insert("conts_klang_nm".to_string(), json!("표면단차 측정 장비"));
        let hit = EsHit {
            id: "e1".into(),
            score: 1.0,
            source,
        };
        assert_eq!(hit.source_str("conts_klang_nm"), "표면단차 측정 장비");
        assert_eq!(hit.source_str("missing"), "");
    }
}
