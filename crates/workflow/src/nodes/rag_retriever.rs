//! RAG retrieval node
//!
//! Dispatches on the resolved graph-RAG strategy, applies Louvain
//! cross-validation, and serves the ES aggregation modes (simple-ranking
//! terms aggregation into `es_ranking_results`).

use crate::WorkflowContext;
use rndsearch_core::{
    EsMode, QuerySubtype, RankingType, SourceRef, WorkflowState,
};
use tracing::{info, warn};

pub async fn retrieve_rag(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let strategy = state.search_config.graph_rag_strategy;
    let limit = state.search_config.rag_limit;

    // ranking subtypes pull a terms aggregation: simple rankings use it as
    // their primary source, complex rankings feed it to the RRF merger
    let wants_es_ranking = state.query_subtype == QuerySubtype::Ranking
        && (state.search_config.es_mode == EsMode::Aggregation
            || state.ranking_type == RankingType::Complex);
    if wants_es_ranking && ctx.es.is_enabled() {
        let query = state.all_keywords().join(" ");
        match ctx
            .es
            .ranking(&query, "patent", "patent_frst_appn.keyword", state.search_config.es_limit)
            .await
        {
            Ok(rows) => {
                info!("ES ranking aggregation: {} orgs", rows.len());
                if !rows.is_empty() {
                    state.sources.push(SourceRef {
                        kind: "elasticsearch".to_string(),
                        count: Some(rows.len()),
                        ..Default::default()
                    });
                }
                state.es_ranking_results = rows;
            }
            Err(e) => {
                warn!("ES ranking aggregation failed: {e}");
                state.push_error(format!("ES 랭킹: {e}"));
            }
        }
    }

    let keywords = state.all_keywords();
    let mut results = ctx
        .graph_rag
        .search(
            &state.query,
            &keywords,
            strategy,
            &state.entity_types,
            None,
            limit,
        )
        .await;

    // community co-membership reranking
    ctx.graph_rag.cross_validate(&mut results).await;

    state.search_strategy = format!("{strategy:?}").to_lowercase();
    info!(
        "RAG retrieval ({}): {} results",
        state.search_strategy,
        results.len()
    );

    for result in &results {
        let cross_validated = result
            .metadata
            .get("graph_validated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        state.sources.push(SourceRef {
            cross_validated,
            ..SourceRef::rag(result.node_id.clone(), result.name.clone(), result.score)
        });
    }

    state.rag_results = results;
    state
}
