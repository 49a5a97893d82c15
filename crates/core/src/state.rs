//! Workflow state and the plan/result records threaded through every node
//!
//! The state is updated functionally: each node takes the state by value and
//! returns the updated state. Nothing here is shared between turns except the
//! conversation history, which is carried per session and capped by
//! [`history_reducer`].

use crate::search_config::SearchConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User literacy level attached to each turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    L1,
    L2,
    #[default]
    L3,
    L4,
    L5,
    L6,
    /// Legacy labels kept for older clients
    Elementary,
    General,
    Expert,
}

impl Level {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "l1" => Level::L1,
            "l2" => Level::L2,
            "l3" => Level::L3,
            "l4" => Level::L4,
            "l5" => Level::L5,
            "l6" => Level::L6,
            "초등" | "elementary" => Level::Elementary,
            "전문가" | "expert" => Level::Expert,
            "일반인" | "general" => Level::General,
            _ => Level::L3,
        }
    }
}

/// Coarse query type decided by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Sql,
    Rag,
    Hybrid,
    #[default]
    Simple,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "sql",
            QueryType::Rag => "rag",
            QueryType::Hybrid => "hybrid",
            QueryType::Simple => "simple",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sql" => QueryType::Sql,
            "rag" => QueryType::Rag,
            "hybrid" => QueryType::Hybrid,
            _ => QueryType::Simple,
        }
    }
}

/// Fine-grained query intent label; drives strategy resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuerySubtype {
    #[default]
    List,
    Aggregation,
    Ranking,
    TrendAnalysis,
    CrosstabAnalysis,
    ImpactRanking,
    NationalityRanking,
    Concept,
    Compound,
    Recommendation,
    Comparison,
    EvalpScore,
    EvalpPref,
}

impl QuerySubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuerySubtype::List => "list",
            QuerySubtype::Aggregation => "aggregation",
            QuerySubtype::Ranking => "ranking",
            QuerySubtype::TrendAnalysis => "trend_analysis",
            QuerySubtype::CrosstabAnalysis => "crosstab_analysis",
            QuerySubtype::ImpactRanking => "impact_ranking",
            QuerySubtype::NationalityRanking => "nationality_ranking",
            QuerySubtype::Concept => "concept",
            QuerySubtype::Compound => "compound",
            QuerySubtype::Recommendation => "recommendation",
            QuerySubtype::Comparison => "comparison",
            QuerySubtype::EvalpScore => "evalp_score",
            QuerySubtype::EvalpPref => "evalp_pref",
        }
    }

    /// Lenient parse: unknown labels collapse to `list`
    pub fn parse(s: &str) -> Self {
        match s {
            "list" => QuerySubtype::List,
            "aggregation" => QuerySubtype::Aggregation,
            "ranking" => QuerySubtype::Ranking,
            "trend_analysis" => QuerySubtype::TrendAnalysis,
            "crosstab_analysis" => QuerySubtype::CrosstabAnalysis,
            "impact_ranking" => QuerySubtype::ImpactRanking,
            "nationality_ranking" => QuerySubtype::NationalityRanking,
            "concept" => QuerySubtype::Concept,
            "compound" => QuerySubtype::Compound,
            "recommendation" => QuerySubtype::Recommendation,
            "comparison" => QuerySubtype::Comparison,
            "evalp_score" => QuerySubtype::EvalpScore,
            "evalp_pref" => QuerySubtype::EvalpPref,
            _ => QuerySubtype::List,
        }
    }

    /// Subtypes whose results are statistics rather than document lists
    pub fn is_statistical(&self) -> bool {
        matches!(
            self,
            QuerySubtype::Aggregation
                | QuerySubtype::Ranking
                | QuerySubtype::ImpactRanking
                | QuerySubtype::NationalityRanking
                | QuerySubtype::TrendAnalysis
                | QuerySubtype::CrosstabAnalysis
        )
    }
}

/// Ranking complexity: simple TOP-N vs. computation-heavy ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankingType {
    #[default]
    Simple,
    Complex,
}

/// Sub-query merge strategy for compound queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Parallel,
    Sequential,
}

/// Structured keyword buckets extracted by the analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredKeywords {
    #[serde(default)]
    pub tech: Vec<String>,
    #[serde(default)]
    pub org: Vec<String>,
    /// Normalised country codes only ("KR", "US", "NOT_KR", ...); country
    /// tokens never remain in the flat keyword list
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub region: Vec<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub metric: Vec<String>,
}

/// One decomposed sub-request of a compound query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubQuery {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub subtype: QuerySubtype,
    #[serde(default)]
    pub query_type: Option<QueryType>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entity_types: Vec<String>,
    /// Index of an earlier sub-query whose result is attached as context
    #[serde(default)]
    pub depends_on: Option<usize>,
    #[serde(default)]
    pub priority: i32,
    /// Result of the dependency, attached before execution
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// Result of one executed sub-query, tagged with its original index
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubQueryResult {
    pub index: usize,
    pub query: String,
    pub query_type: QueryType,
    pub query_subtype: QuerySubtype,
    pub entity_types: Vec<String>,
    pub keywords: Vec<String>,
    pub success: bool,
    pub sql_result: Option<SqlResult>,
    pub generated_sql: Option<String>,
    pub rag_results: Vec<SearchResult>,
    pub sources: Vec<SourceRef>,
    pub error: Option<String>,
}

/// Rows-plus-columns result of a SQL execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlResult {
    pub success: bool,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub generated_sql: Option<String>,
}

impl SqlResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// One retrieval hit from vector, graph, or ES search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub node_id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    pub score: f32,
    #[serde(default)]
    pub related_entities: Vec<serde_json::Value>,
    /// Carries community, pagerank, rrf_source, graph_validated,
    /// cluster_boost, content_preview as they are attached
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One bucket of an ES aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsBucket {
    pub key: String,
    pub count: u64,
}

/// ES statistics result (date-histogram or terms aggregation)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsBucketSet {
    pub entity_type: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub group_by: String,
    #[serde(default)]
    pub period: String,
    pub total: u64,
    #[serde(default)]
    pub buckets: Vec<StatsBucket>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One row of a crosstab (applicant x year) table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosstabRow {
    pub rank: usize,
    pub name: String,
    pub nationality: String,
    pub by_year: HashMap<String, u64>,
    pub total: u64,
}

/// Nested aggregation result: applicant x year crosstab
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrosstabTable {
    pub years: Vec<i32>,
    pub rows: Vec<CrosstabRow>,
    #[serde(default)]
    pub period: String,
    pub total: u64,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub countries: Vec<String>,
}

/// ES statistics attached to the state, keyed by entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EsStatistics {
    Trend(StatsBucketSet),
    Crosstab(CrosstabTable),
}

/// One entry of an ES ranking terms-aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRow {
    pub org: String,
    pub count: u64,
}

/// Provenance marker for one contributed source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRef {
    /// "sql" | "vector" | "es" | "elasticsearch" | "graph" | "rrf_merged"
    pub kind: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub cross_validated: bool,
}

impl SourceRef {
    pub fn sql(sql: impl Into<String>, count: usize) -> Self {
        Self {
            kind: "sql".to_string(),
            sql: Some(sql.into()),
            count: Some(count),
            ..Default::default()
        }
    }

    pub fn rag(node_id: impl Into<String>, title: impl Into<String>, score: f32) -> Self {
        Self {
            kind: "vector".to_string(),
            node_id: Some(node_id.into()),
            title: Some(title.into()),
            score: Some(score),
            ..Default::default()
        }
    }

    /// Dedup key: (type, sql) for SQL sources, (type, node_id) otherwise
    pub fn dedup_key(&self) -> String {
        if self.kind == "sql" {
            let sql: String = self
                .sql
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(100)
                .collect();
            format!("sql:{sql}")
        } else {
            format!("{}:{}", self.kind, self.node_id.as_deref().unwrap_or(""))
        }
    }
}

/// One chat message in the per-session conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Append messages and truncate from the front to `max_len`
pub fn history_reducer(
    mut history: Vec<ChatMessage>,
    new_messages: Vec<ChatMessage>,
    max_len: usize,
) -> Vec<ChatMessage> {
    history.extend(new_messages);
    if history.len() > max_len {
        let excess = history.len() - max_len;
        history.drain(..excess);
    }
    history
}

/// The record threaded through every workflow node
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub query: String,
    pub session_id: String,
    pub level: Level,

    pub query_type: QueryType,
    pub query_subtype: QuerySubtype,
    pub query_intent: String,
    pub ranking_type: RankingType,

    pub keywords: Vec<String>,
    pub synonym_keywords: Vec<String>,
    pub expanded_keywords: Vec<String>,
    pub entity_keywords: HashMap<String, Vec<String>>,
    pub structured_keywords: StructuredKeywords,

    pub entity_types: Vec<String>,
    pub is_aggregation: bool,
    pub is_equipment_query: bool,

    pub is_compound: bool,
    pub sub_queries: Vec<SubQuery>,
    pub merge_strategy: MergeStrategy,

    pub search_config: SearchConfig,
    pub search_strategy: String,

    pub es_doc_ids: HashMap<String, Vec<String>>,
    pub domain_hits: HashMap<String, usize>,

    pub sql_result: Option<SqlResult>,
    pub multi_sql_results: HashMap<String, SqlResult>,
    pub generated_sql: Option<String>,

    pub rag_results: Vec<SearchResult>,
    pub es_ranking_results: Vec<RankingRow>,
    pub es_statistics: HashMap<String, EsStatistics>,
    pub statistics_type: String,

    pub sub_query_results: Vec<SubQueryResult>,
    pub sources: Vec<SourceRef>,

    pub response: String,
    pub conversation_history: Vec<ChatMessage>,
    pub context_quality: f32,

    pub stage_timing: HashMap<String, f64>,
    pub error: Option<String>,
}

impl WorkflowState {
    /// Fresh per-turn state
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        level: Level,
        entity_types: Option<Vec<String>>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            level,
            entity_types: entity_types.unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Append a branch error, ';'-joined with any existing one
    pub fn push_error(&mut self, err: impl Into<String>) {
        let err = err.into();
        self.error = Some(match self.error.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}; {err}"),
            _ => err,
        });
    }

    /// Final keyword set for SQL predicates: keywords plus expansions
    pub fn all_keywords(&self) -> Vec<String> {
        let mut merged = self.keywords.clone();
        for kw in &self.expanded_keywords {
            if !merged.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
                merged.push(kw.clone());
            }
        }
        merged
    }
}
