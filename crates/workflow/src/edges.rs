//! Conditional routing between workflow nodes
//!
//! Pure functions over the state; the engine consults them after each node.

use crate::engine::Node;
use rndsearch_core::{QuerySubtype, QueryType, RankingType, WorkflowState};
use tracing::debug;

const TECH_CLASSIFICATION_CUE: &str = "분류";
const COLLABORATION_CUES: &[&str] = &["협업", "협력", "파트너", "공동연구"];

fn has_sql_priority_entity(state: &WorkflowState) -> bool {
    state
        .entity_types
        .iter()
        .any(|entity| matches!(entity.as_str(), "evalp" | "evalp_detail" | "evalp_pref" | "ancm"))
}

/// After the scout: simple queries exit, statistics go straight to SQL,
/// everything else (compound included) passes through keyword expansion
pub fn route_after_es_scout(state: &WorkflowState) -> Node {
    if state.query_type == QueryType::Simple
        && state.entity_types.is_empty()
        && state.keywords.is_empty()
    {
        debug!("route: es_scout -> generator (simple, no search intent)");
        return Node::Generator;
    }

    if state.query_subtype == QuerySubtype::Concept {
        debug!("route: es_scout -> rag_node (concept)");
        return Node::RagNode;
    }

    if matches!(
        state.query_subtype,
        QuerySubtype::TrendAnalysis | QuerySubtype::CrosstabAnalysis
    ) {
        debug!("route: es_scout -> sql_node (statistics)");
        return Node::SqlNode;
    }

    if state.is_compound && !state.sub_queries.is_empty() {
        // compound queries still need keyword expansion before fan-out
        debug!("route: es_scout -> vector_enhancer (compound)");
        return Node::VectorEnhancer;
    }

    if state.search_config.use_loader && !state.search_config.need_vector_enhancement {
        debug!("route: es_scout -> sql_node (loader)");
        return Node::SqlNode;
    }

    debug!("route: es_scout -> vector_enhancer");
    Node::VectorEnhancer
}

/// After keyword expansion: the main dispatch
pub fn route_query(state: &WorkflowState) -> Node {
    // ranking splits on computed complexity
    if state.query_subtype == QuerySubtype::Ranking {
        return if state.ranking_type == RankingType::Complex {
            debug!("route: complex ranking -> parallel_ranking");
            Node::ParallelRanking
        } else {
            debug!("route: simple ranking -> rag_node");
            Node::RagNode
        };
    }

    if state.is_compound && !state.sub_queries.is_empty() {
        debug!("route: compound -> sub_queries");
        return Node::SubQueries;
    }

    if state.query_subtype == QuerySubtype::Recommendation {
        return route_recommendation(state);
    }

    if has_sql_priority_entity(state) {
        debug!("route: SQL-priority entity -> sql_node");
        return Node::SqlNode;
    }

    if state.search_config.sql_only() {
        return Node::SqlNode;
    }
    if state.search_config.vector_only() {
        return Node::RagNode;
    }

    match state.query_type {
        QueryType::Sql => Node::SqlNode,
        QueryType::Rag => Node::RagNode,
        QueryType::Hybrid => Node::Parallel,
        QueryType::Simple => Node::Generator,
    }
}

/// Recommendation sub-rules: equipment goes to RAG, technology
/// classification and collaboration to SQL, the rest by query type
fn route_recommendation(state: &WorkflowState) -> Node {
    if state.entity_types.iter().any(|entity| entity == "equip") {
        debug!("route: recommendation (equipment) -> rag_node");
        return Node::RagNode;
    }

    let is_tech_classification = state.entity_types.iter().any(|entity| entity == "tech")
        || state.query.contains(TECH_CLASSIFICATION_CUE)
        || state
            .keywords
            .iter()
            .any(|keyword| keyword.contains(TECH_CLASSIFICATION_CUE));
    if is_tech_classification {
        debug!("route: recommendation (tech classification) -> sql_node");
        return Node::SqlNode;
    }

    let is_collaboration = state
        .entity_types
        .iter()
        .any(|entity| entity == "proposal" || entity == "patent")
        || COLLABORATION_CUES.iter().any(|cue| state.query.contains(cue));
    if is_collaboration {
        debug!("route: recommendation (collaboration) -> sql_node");
        return Node::SqlNode;
    }

    match state.query_type {
        QueryType::Hybrid => Node::Parallel,
        QueryType::Rag => Node::RagNode,
        _ => Node::RagNode,
    }
}

/// After SQL: statistics answers skip the merger, hybrid and multi-entity
/// results need it
pub fn route_after_sql(state: &WorkflowState) -> Node {
    if !state.es_statistics.is_empty()
        && matches!(
            state.statistics_type.as_str(),
            "trend_analysis" | "crosstab_analysis"
        )
    {
        debug!("route: sql -> generator (ES statistics)");
        return Node::Generator;
    }

    if state.query_type == QueryType::Hybrid || !state.multi_sql_results.is_empty() {
        debug!("route: sql -> merger");
        return Node::Merger;
    }

    Node::Generator
}

/// After RAG: only hybrid turns pass through the merger
pub fn route_after_rag(state: &WorkflowState) -> Node {
    if state.query_type == QueryType::Hybrid {
        return Node::Merger;
    }
    Node::Generator
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_core::{EsStatistics, Level, SqlResult, StatsBucketSet, SubQuery};

    fn state() -> WorkflowState {
        WorkflowState::new("q", "s", Level::L3, None)
    }

    #[test]
    fn test_simple_greeting_goes_to_generator() {
        let mut s = state();
        s.query_type = QueryType::Simple;
        assert_eq!(route_after_es_scout(&s), Node::Generator);
    }

    #[test]
    fn test_concept_goes_to_rag() {
        let mut s = state();
        s.query_type = QueryType::Rag;
        s.query_subtype = QuerySubtype::Concept;
        s.keywords = vec!["평가표".into()];
        assert_eq!(route_after_es_scout(&s), Node::RagNode);
    }

    #[test]
    fn test_statistics_go_to_sql() {
        let mut s = state();
        s.query_type = QueryType::Sql;
        s.query_subtype = QuerySubtype::TrendAnalysis;
        s.keywords = vec!["딥러닝".into()];
        assert_eq!(route_after_es_scout(&s), Node::SqlNode);

        s.query_subtype = QuerySubtype::CrosstabAnalysis;
        assert_eq!(route_after_es_scout(&s), Node::SqlNode);
    }

    #[test]
    fn test_compound_passes_through_vector_enhancer() {
        let mut s = state();
        s.query_type = QueryType::Hybrid;
        s.query_subtype = QuerySubtype::Compound;
        s.is_compound = true;
        s.sub_queries = vec![SubQuery::default()];
        s.keywords = vec!["AI".into()];
        assert_eq!(route_after_es_scout(&s), Node::VectorEnhancer);
        // then fans out after enhancement
        assert_eq!(route_query(&s), Node::SubQueries);
    }

    #[test]
    fn test_ranking_split() {
        let mut s = state();
        s.query_subtype = QuerySubtype::Ranking;
        s.ranking_type = RankingType::Complex;
        assert_eq!(route_query(&s), Node::ParallelRanking);

        s.ranking_type = RankingType::Simple;
        assert_eq!(route_query(&s), Node::RagNode);
    }

    #[test]
    fn test_recommendation_sub_rules() {
        let mut s = state();
        s.query_subtype = QuerySubtype::Recommendation;
        s.entity_types = vec!["equip".into()];
        assert_eq!(route_query(&s), Node::RagNode);

        s.entity_types = vec!["tech".into()];
        assert_eq!(route_query(&s), Node::SqlNode);

        s.entity_types = vec![];
        s.query = "인공지능 협업 기관 추천".into();
        assert_eq!(route_query(&s), Node::SqlNode);
    }

    #[test]
    fn test_evalp_priority_routes_to_sql() {
        let mut s = state();
        s.query_type = QueryType::Rag;
        s.entity_types = vec!["evalp".into()];
        assert_eq!(route_query(&s), Node::SqlNode);
    }

    #[test]
    fn test_query_type_dispatch() {
        let mut s = state();
        s.query_type = QueryType::Hybrid;
        s.search_config.primary_sources = vec![
            rndsearch_core::SearchSource::Sql,
            rndsearch_core::SearchSource::Vector,
        ];
        assert_eq!(route_query(&s), Node::Parallel);

        s.query_type = QueryType::Sql;
        assert_eq!(route_query(&s), Node::SqlNode);
    }

    #[test]
    fn test_route_after_sql() {
        let mut s = state();
        s.query_type = QueryType::Sql;
        assert_eq!(route_after_sql(&s), Node::Generator);

        s.multi_sql_results
            .insert("patent".into(), SqlResult::default());
        assert_eq!(route_after_sql(&s), Node::Merger);

        let mut s = state();
        s.query_type = QueryType::Sql;
        s.statistics_type = "trend_analysis".into();
        s.es_statistics.insert(
            "patent".into(),
            EsStatistics::Trend(StatsBucketSet::default()),
        );
        assert_eq!(route_after_sql(&s), Node::Generator);
    }

    #[test]
    fn test_route_after_rag() {
        let mut s = state();
        s.query_type = QueryType::Rag;
        assert_eq!(route_after_rag(&s), Node::Generator);
        s.query_type = QueryType::Hybrid;
        assert_eq!(route_after_rag(&s), Node::Merger);
    }
}
