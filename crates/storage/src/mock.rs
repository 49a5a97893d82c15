//! In-memory mock backends for orchestration tests
//!
//! Each mock records its call count so tests can assert which backends a
//! route actually touched (the greeting fast path must touch none).

use crate::{
    EsApi, EsHit, GraphApi, GraphNeighbor, GraphNode, GraphNodeAttrs, SqlApi, VectorApi, VectorHit,
};
use async_trait::async_trait;
use rndsearch_core::{CrosstabTable, RankingRow, Result, SqlResult, StatsBucketSet};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Build an ES hit from (field, value) pairs
pub fn es_hit(id: &str, score: f32, fields: &[(&str, &str)]) -> EsHit {
    EsHit {
        id: id.to_string(),
        score,
        source: fields
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect(),
    }
}

/// Build a vector hit from (field, value) pairs
pub fn vector_hit(id: &str, score: f32, fields: &[(&str, &str)]) -> VectorHit {
    VectorHit {
        id: id.to_string(),
        score,
        payload: fields
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect(),
    }
}

/// Mock SQL backend returning queued results, then a default
#[derive(Default)]
pub struct MockSql {
    responses: Mutex<VecDeque<SqlResult>>,
    default_result: Mutex<SqlResult>,
    executed: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockSql {
    pub fn new() -> Self {
        Self {
            default_result: Mutex::new(SqlResult {
                success: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_default(self, result: SqlResult) -> Self {
        *self.default_result.lock().unwrap() = result;
        self
    }

    pub fn queue(&self, result: SqlResult) {
        self.responses.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every SQL string passed to execute, in order
    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlApi for MockSql {
    async fn execute(&self, sql: &str) -> Result<SqlResult> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(sql.to_string());
        let queued = self.responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.default_result.lock().unwrap().clone()))
    }
}

/// Mock vector store with per-collection preset hits
#[derive(Default)]
pub struct MockVector {
    hits: Mutex<HashMap<String, Vec<VectorHit>>>,
    call_count: AtomicUsize,
}

impl MockVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hits(&self, collection: &str, hits: Vec<VectorHit>) {
        self.hits.lock().unwrap().insert(collection.to_string(), hits);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorApi for MockVector {
    async fn search(
        &self,
        collection: &str,
        _vector: Vec<f32>,
        limit: usize,
        _filter: Option<HashMap<String, String>>,
    ) -> Result<Vec<VectorHit>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut hits = self
            .hits
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        _filter: HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut hits = self
            .hits
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Mock ES backend with preset hits, statistics, and rankings
pub struct MockEs {
    enabled: bool,
    hits: Mutex<HashMap<String, Vec<EsHit>>>,
    statistics: Mutex<HashMap<String, StatsBucketSet>>,
    crosstab: Mutex<Option<CrosstabTable>>,
    ranking_rows: Mutex<Vec<RankingRow>>,
    call_count: AtomicUsize,
}

impl Default for MockEs {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MockEs {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: Mutex::new(HashMap::new()),
            statistics: Mutex::new(HashMap::new()),
            crosstab: Mutex::new(None),
            ranking_rows: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn set_hits(&self, domain: &str, hits: Vec<EsHit>) {
        self.hits.lock().unwrap().insert(domain.to_string(), hits);
    }

    pub fn set_statistics(&self, entity_type: &str, stats: StatsBucketSet) {
        self.statistics
            .lock()
            .unwrap()
            .insert(entity_type.to_string(), stats);
    }

    pub fn set_crosstab(&self, table: CrosstabTable) {
        *self.crosstab.lock().unwrap() = Some(table);
    }

    pub fn set_ranking(&self, rows: Vec<RankingRow>) {
        *self.ranking_rows.lock().unwrap() = rows;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EsApi for MockEs {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn is_available(&self) -> bool {
        self.enabled
    }

    async fn search(
        &self,
        _query: &str,
        entity_type: &str,
        limit: usize,
        _include_highlight: bool,
    ) -> Result<Vec<EsHit>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut hits = self
            .hits
            .lock()
            .unwrap()
            .get(entity_type)
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn multi_search(
        &self,
        _query: &str,
        entity_types: &[String],
        limit_per_type: usize,
    ) -> Result<HashMap<String, Vec<EsHit>>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let hits = self.hits.lock().unwrap();
        Ok(entity_types
            .iter()
            .map(|entity| {
                let mut entity_hits = hits.get(entity).cloned().unwrap_or_default();
                entity_hits.truncate(limit_per_type);
                (entity.clone(), entity_hits)
            })
            .collect())
    }

    async fn aggregate(
        &self,
        _query: &str,
        _entity_type: &str,
        _aggregations: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
    }

    async fn entity_statistics(
        &self,
        entity_type: &str,
        _keywords: Option<&str>,
        _countries: &[String],
        _start_year: Option<i32>,
        _end_year: Option<i32>,
        _group_by: &str,
    ) -> Result<StatsBucketSet> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statistics
            .lock()
            .unwrap()
            .get(entity_type)
            .cloned()
            .unwrap_or_else(|| StatsBucketSet {
                entity_type: entity_type.to_string(),
                ..Default::default()
            }))
    }

    async fn crosstab_statistics(
        &self,
        entity_type: &str,
        _keywords: Option<&str>,
        _countries: &[String],
        _years_back: i32,
        _top_n: usize,
    ) -> Result<CrosstabTable> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .crosstab
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| CrosstabTable {
                keywords: entity_type.to_string(),
                ..Default::default()
            }))
    }

    async fn ranking(
        &self,
        _query: &str,
        _entity_type: &str,
        _group_field: &str,
        limit: usize,
    ) -> Result<Vec<RankingRow>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.ranking_rows.lock().unwrap().clone();
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Mock graph backend with preset partitions and neighbors
#[derive(Default)]
pub struct MockGraph {
    communities: Mutex<HashMap<String, i64>>,
    pagerank: Mutex<Vec<GraphNode>>,
    neighbors: Mutex<HashMap<String, Vec<GraphNeighbor>>>,
    attrs: Mutex<HashMap<String, GraphNodeAttrs>>,
    call_count: AtomicUsize,
}

impl MockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_community(&self, node_id: &str, community: i64) {
        self.communities
            .lock()
            .unwrap()
            .insert(node_id.to_string(), community);
    }

    pub fn set_pagerank(&self, nodes: Vec<GraphNode>) {
        *self.pagerank.lock().unwrap() = nodes;
    }

    pub fn set_neighbors(&self, node_id: &str, neighbors: Vec<GraphNeighbor>) {
        self.neighbors
            .lock()
            .unwrap()
            .insert(node_id.to_string(), neighbors);
    }

    pub fn set_attrs(&self, node_id: &str, attrs: GraphNodeAttrs) {
        self.attrs.lock().unwrap().insert(node_id.to_string(), attrs);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn pagerank_top_k(&self, top_k: usize) -> Result<Vec<GraphNode>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut nodes = self.pagerank.lock().unwrap().clone();
        nodes.truncate(top_k);
        Ok(nodes)
    }

    async fn communities(&self) -> Result<HashMap<String, i64>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.communities.lock().unwrap().clone())
    }

    async fn node_community(&self, node_id: &str) -> Result<Option<i64>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.communities.lock().unwrap().get(node_id).copied())
    }

    async fn neighbors(
        &self,
        node_id: &str,
        _depth: usize,
        limit: usize,
    ) -> Result<Vec<GraphNeighbor>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut neighbors = self
            .neighbors
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_default();
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn statistics(&self) -> Result<serde_json::Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "vertices": self.communities.lock().unwrap().len() }))
    }

    async fn resolve_node(&self, node_id: &str) -> Result<Option<GraphNodeAttrs>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.attrs.lock().unwrap().get(node_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sql_queue_and_default() {
        let mock = MockSql::new();
        mock.queue(SqlResult {
            success: true,
            row_count: 3,
            ..Default::default()
        });
        let first = mock.execute("SELECT 1").await.unwrap();
        assert_eq!(first.row_count, 3);
        let second = mock.execute("SELECT 2").await.unwrap();
        assert_eq!(second.row_count, 0);
        assert_eq!(mock.executed_sql(), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_es_disabled() {
        let mock = MockEs::new(false);
        assert!(!mock.is_enabled());
        assert!(!mock.is_available().await);
    }

    #[tokio::test]
    async fn test_mock_graph_communities() {
        let mock = MockGraph::new();
        mock.set_community("patent_1", 7);
        assert_eq!(mock.node_community("patent_1").await.unwrap(), Some(7));
        assert_eq!(mock.node_community("patent_2").await.unwrap(), None);
    }
}
