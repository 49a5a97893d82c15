//! ES scout node
//!
//! Runs right after the analyzer: expands the keywords over the synonym
//! dictionary, probes which domains actually hold matching documents, and
//! fixes the entity types for the rest of the turn.

use crate::WorkflowContext;
use rndsearch_core::catalog;
use rndsearch_core::{QueryType, WorkflowState};
use rndsearch_retrieval::{prune_to_entity_types, resolve_entity_types, scout_domains};
use tracing::info;

pub async fn es_scout(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    if state.query_type == QueryType::Simple || state.keywords.is_empty() {
        info!("ES scout skipped: simple query or no keywords");
        state.synonym_keywords.clear();
        state.es_doc_ids.clear();
        state.domain_hits.clear();
        return state;
    }

    // 1. synonym expansion; originals stay in front
    let original_keywords = state.keywords.clone();
    let expanded = ctx.synonyms.expand(&original_keywords, 3);
    state.synonym_keywords = expanded
        .iter()
        .filter(|kw| !original_keywords.iter().any(|orig| orig.eq_ignore_ascii_case(kw)))
        .cloned()
        .collect();
    state.keywords = expanded;

    if !ctx.es.is_enabled() {
        // without ES the analyzer's entity types or the defaults stand in
        if state.entity_types.is_empty() {
            state.entity_types = ctx.config.workflow.default_entity_types.clone();
        }
        info!(
            "ES scout: ES disabled, entity_types={:?}",
            state.entity_types
        );
        state.es_doc_ids.clear();
        state.domain_hits.clear();
        return state;
    }

    // 2. domain-restricted or full scan
    let domains: Vec<String> = state
        .entity_types
        .iter()
        .map(|entity| catalog::domain_for_entity(entity).to_string())
        .collect();

    let mut scout = scout_domains(
        ctx.es.as_ref(),
        &state.keywords,
        &original_keywords,
        &state.query,
        &domains,
        ctx.config.retrieval.capability_excludes_equipment,
    )
    .await;

    // 3. entity-type policy
    if state.entity_types.is_empty() {
        state.entity_types = resolve_entity_types(
            &state.entity_types,
            &scout,
            &ctx.config.workflow.default_entity_types,
        );
    } else {
        prune_to_entity_types(&mut scout, &state.entity_types);
    }

    state.domain_hits = scout.hits;
    state.es_doc_ids = scout.doc_ids;

    info!(
        "ES scout: domain_hits={:?}, entity_types={:?}",
        state.domain_hits, state.entity_types
    );
    state
}
