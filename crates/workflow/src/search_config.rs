//! Subtype -> retrieval strategy resolution
//!
//! A static table maps each query subtype to its base strategy; the entry is
//! copied per call and then adjusted by entity types and query type. The
//! loader existence check runs last so a missing loader falls through to the
//! plain SQL executor.

use crate::loaders::LoaderRegistry;
use rndsearch_core::search_config::default_merge_priority;
use rndsearch_core::{
    EsMode, GraphRagStrategy, QuerySubtype, QueryType, RankingType, SearchConfig, SearchSource,
    WorkflowState,
};
use tracing::{debug, info};

fn base_config(subtype: QuerySubtype, ranking_type: RankingType) -> SearchConfig {
    use GraphRagStrategy as G;
    use SearchSource as S;

    let mut config = SearchConfig {
        primary_sources: vec![S::Sql],
        fallback_sources: Vec::new(),
        graph_rag_strategy: G::None,
        es_mode: EsMode::Off,
        merge_priority: default_merge_priority(),
        sql_limit: 20,
        rag_limit: 20,
        es_limit: 20,
        need_vector_enhancement: true,
        use_loader: false,
        loader_name: None,
    };

    match subtype {
        QuerySubtype::List | QuerySubtype::Aggregation => {}
        QuerySubtype::TrendAnalysis | QuerySubtype::CrosstabAnalysis => {
            config.es_mode = EsMode::Aggregation;
            config.need_vector_enhancement = false;
        }
        QuerySubtype::Ranking => match ranking_type {
            RankingType::Simple => {
                config.primary_sources = vec![S::Es, S::Vector];
                config.graph_rag_strategy = G::GraphEnhanced;
                config.es_mode = EsMode::Aggregation;
            }
            RankingType::Complex => {
                config.primary_sources = vec![S::Sql, S::Es];
                config.es_mode = EsMode::KeywordBoost;
                config.use_loader = true;
                config.loader_name = Some("RankingLoader".to_string());
            }
        },
        QuerySubtype::ImpactRanking | QuerySubtype::NationalityRanking => {
            config.primary_sources = vec![S::Sql, S::Graph];
            config.graph_rag_strategy = G::GraphOnly;
        }
        QuerySubtype::Concept => {
            config.primary_sources = vec![S::Vector];
            config.graph_rag_strategy = G::Hybrid;
            config.es_mode = EsMode::KeywordBoost;
        }
        QuerySubtype::Recommendation => {
            config.primary_sources = vec![S::Sql, S::Vector];
            config.graph_rag_strategy = G::GraphEnhanced;
            config.es_mode = EsMode::KeywordBoost;
            config.use_loader = true;
            config.loader_name = Some("CollaborationLoader".to_string());
        }
        QuerySubtype::Comparison | QuerySubtype::Compound => {
            config.primary_sources = vec![S::Sql, S::Vector];
            config.graph_rag_strategy = G::Hybrid;
            config.es_mode = EsMode::KeywordBoost;
        }
        QuerySubtype::EvalpScore => {
            config.need_vector_enhancement = false;
            config.use_loader = true;
            config.loader_name = Some("ScoringLoader".to_string());
        }
        QuerySubtype::EvalpPref => {
            config.need_vector_enhancement = false;
            config.use_loader = true;
            config.loader_name = Some("AdvantageLoader".to_string());
        }
    }

    config
}

/// Resolve the search strategy for the analyzed state
pub fn resolve_search_config(state: &WorkflowState, loaders: &LoaderRegistry) -> SearchConfig {
    use GraphRagStrategy as G;
    use SearchSource as S;

    let mut config = base_config(state.query_subtype, state.ranking_type);

    // --- entity adjustments ---

    let has_entity = |entity: &str| state.entity_types.iter().any(|e| e == entity);

    if has_entity("evalp") || has_entity("evalp_detail") {
        config.primary_sources = vec![S::Sql];
        config.graph_rag_strategy = G::None;
        config.use_loader = true;
        config.loader_name = Some("ScoringLoader".to_string());
    }
    if has_entity("evalp_pref") {
        config.primary_sources = vec![S::Sql];
        config.graph_rag_strategy = G::None;
        config.use_loader = true;
        config.loader_name = Some("AdvantageLoader".to_string());
    }

    if has_entity("equip")
        && matches!(
            state.query_subtype,
            QuerySubtype::List | QuerySubtype::Recommendation
        )
    {
        config.primary_sources = vec![S::Es, S::Vector];
        config.fallback_sources = vec![S::Sql];
        config.es_mode = config.es_mode.max(EsMode::KeywordBoost);
    }

    if has_entity("patent")
        && matches!(state.query_subtype, QuerySubtype::List | QuerySubtype::Ranking)
    {
        config.es_mode = config.es_mode.max(EsMode::KeywordBoost);
    }

    if has_entity("proposal") && state.query_subtype == QuerySubtype::Recommendation {
        config.use_loader = true;
        config.loader_name = Some("CollaborationLoader".to_string());
        if config.graph_rag_strategy == G::None {
            config.graph_rag_strategy = G::GraphEnhanced;
        }
    }

    // --- query-type adjustments ---

    match state.query_type {
        QueryType::Simple => {
            config.primary_sources.clear();
        }
        QueryType::Sql => {
            config.primary_sources = vec![S::Sql];
        }
        QueryType::Rag => {
            config.primary_sources.retain(|s| *s != S::Sql);
            if config.primary_sources.is_empty() {
                config.primary_sources = vec![S::Vector];
            }
            if config.graph_rag_strategy == G::None {
                config.graph_rag_strategy = G::Hybrid;
            }
        }
        QueryType::Hybrid => {
            if !config.primary_sources.contains(&S::Sql) {
                config.primary_sources.insert(0, S::Sql);
            }
            if config.graph_rag_strategy == G::None {
                config.graph_rag_strategy = G::Hybrid;
            }
        }
    }

    // --- loader existence check ---

    if config.use_loader {
        match &config.loader_name {
            Some(name) if loaders.exists(name) => {
                debug!("loader selected: {name}");
            }
            other => {
                info!("loader {:?} not registered, falling back to SQL executor", other);
                config.use_loader = false;
            }
        }
    }

    config
}
