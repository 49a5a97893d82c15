//! Compound sub-query executor
//!
//! Independent sub-queries run in a bounded worker pool; dependent ones run
//! sequentially in priority order with the referenced result attached as
//! context. Parent `es_doc_ids` are cleared per sub-state so each entity's
//! SQL retrieval is scoped to its own sub-query. Results are re-sorted by
//! original index before emission, so the user-visible ordering is
//! deterministic regardless of completion order.

use crate::nodes::{rag_retriever, sql_executor};
use crate::WorkflowContext;
use futures::stream::{self, StreamExt};
use rndsearch_core::{
    QuerySubtype, QueryType, SourceRef, SubQuery, SubQueryResult, WorkflowState,
};
use std::collections::HashSet;
use tracing::{info, warn};

/// Sub-query subtype -> executing query type
fn subtype_to_query_type(subtype: QuerySubtype) -> QueryType {
    match subtype {
        QuerySubtype::Concept => QueryType::Rag,
        _ => QueryType::Sql,
    }
}

pub async fn execute_sub_queries(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let sub_queries = std::mem::take(&mut state.sub_queries);
    if sub_queries.is_empty() {
        warn!("no sub-queries, falling through");
        return state;
    }

    info!("compound execution: {} sub-queries", sub_queries.len());

    let mut independents: Vec<(usize, SubQuery)> = Vec::new();
    let mut dependents: Vec<(usize, SubQuery)> = Vec::new();
    for (index, sub_query) in sub_queries.iter().cloned().enumerate() {
        if sub_query.depends_on.is_none() {
            independents.push((index, sub_query));
        } else {
            dependents.push((index, sub_query));
        }
    }

    let concurrency = ctx
        .config
        .workflow
        .sub_query_concurrency
        .min(independents.len().max(1));

    let mut results: Vec<SubQueryResult> = stream::iter(independents)
        .map(|(index, sub_query)| {
            let state_ref = &state;
            async move { execute_single_sub_query(state_ref, ctx, sub_query, index).await }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    // dependents run strictly sequentially in priority order
    dependents.sort_by_key(|(_, sub_query)| sub_query.priority);
    for (index, mut sub_query) in dependents {
        if let Some(dependency_index) = sub_query.depends_on {
            if let Some(dependency) = results.iter().find(|r| r.index == dependency_index) {
                // strictly lexical: the referenced result rides along as
                // context, it is not injected into SQL or vector search
                sub_query.context = serde_json::to_value(SubQueryContextSummary::from(dependency))
                    .ok();
            }
        }
        let result = execute_single_sub_query(&state, ctx, sub_query, index).await;
        results.push(result);
    }

    // concurrency may deliver out of order; restore input order
    results.sort_by_key(|result| result.index);

    let mut all_sources: Vec<SourceRef> = Vec::new();
    let mut all_rag_results = Vec::new();
    let mut sql_results: Vec<(Vec<String>, rndsearch_core::SqlResult)> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for result in &results {
        all_sources.extend(result.sources.clone());
        all_rag_results.extend(result.rag_results.clone());
        if let Some(sql_result) = &result.sql_result {
            sql_results.push((result.entity_types.clone(), sql_result.clone()));
        }
        if let Some(error) = &result.error {
            errors.push(format!("#{}: {error}", result.index));
        }
    }

    // aggregate per-entity results for the merger and generator
    if sql_results.len() == 1 {
        state.sql_result = Some(sql_results[0].1.clone());
    } else if sql_results.len() > 1 {
        for (entities, sql_result) in &sql_results {
            let entity = entities
                .first()
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            state.multi_sql_results.insert(entity, sql_result.clone());
        }
    }

    let mut seen = HashSet::new();
    state.sources = all_sources
        .into_iter()
        .filter(|source| seen.insert(source.dedup_key()))
        .collect();
    state.rag_results = all_rag_results;
    for error in errors {
        state.push_error(error);
    }

    info!("compound execution complete: {} results", results.len());
    state.sub_query_results = results;
    state
}

/// Compact summary of a finished sub-query, attached to dependents
#[derive(serde::Serialize)]
struct SubQueryContextSummary {
    index: usize,
    query: String,
    success: bool,
    row_count: usize,
    rag_count: usize,
}

impl From<&SubQueryResult> for SubQueryContextSummary {
    fn from(result: &SubQueryResult) -> Self {
        Self {
            index: result.index,
            query: result.query.clone(),
            success: result.success,
            row_count: result
                .sql_result
                .as_ref()
                .map(|r| r.row_count)
                .unwrap_or_default(),
            rag_count: result.rag_results.len(),
        }
    }
}

async fn execute_single_sub_query(
    parent: &WorkflowState,
    ctx: &WorkflowContext,
    sub_query: SubQuery,
    index: usize,
) -> SubQueryResult {
    let query = if sub_query.intent.is_empty() {
        parent.query.clone()
    } else {
        sub_query.intent.clone()
    };
    let query_type = sub_query
        .query_type
        .unwrap_or_else(|| subtype_to_query_type(sub_query.subtype));
    let entity_types = if sub_query.entity_types.is_empty() {
        parent.entity_types.clone()
    } else {
        sub_query.entity_types.clone()
    };

    // sub-query keywords first, parent keywords appended
    let mut keywords = sub_query.keywords.clone();
    for keyword in &parent.keywords {
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
            keywords.push(keyword.clone());
        }
    }

    info!(
        "sub-query #{index}: type={query_type:?}, subtype={:?}, entities={entity_types:?}",
        sub_query.subtype
    );

    let mut sub_state = parent.clone();
    sub_state.query = query.clone();
    sub_state.query_type = query_type;
    sub_state.query_subtype = sub_query.subtype;
    sub_state.entity_types = entity_types.clone();
    sub_state.keywords = keywords.clone();
    sub_state.is_compound = false;
    sub_state.sub_queries.clear();
    sub_state.sub_query_results.clear();
    sub_state.sources.clear();
    sub_state.sql_result = None;
    sub_state.multi_sql_results.clear();
    sub_state.rag_results.clear();
    sub_state.error = None;
    // parent scout ids may belong to other entities; each sub-query
    // re-scopes its own retrieval
    sub_state.es_doc_ids.clear();
    sub_state.domain_hits.clear();

    let mut result = SubQueryResult {
        index,
        query,
        query_type,
        query_subtype: sub_query.subtype,
        entity_types: entity_types.clone(),
        keywords,
        ..Default::default()
    };

    match query_type {
        QueryType::Rag => {
            let executed = rag_retriever::retrieve_rag(sub_state, ctx).await;
            result.success = !executed.rag_results.is_empty();
            result.rag_results = executed.rag_results;
            result.sources = executed.sources;
            result.error = executed.error;
        }
        _ => {
            let executed = sql_executor::execute_sql(sub_state, ctx).await;
            let mut sql_result = executed.sql_result;
            // multi-entity executions file under the entity key instead
            if sql_result.is_none() {
                if let Some(entity) = entity_types.first() {
                    sql_result = executed.multi_sql_results.get(entity).cloned();
                }
            }
            result.success = sql_result
                .as_ref()
                .map(|r| r.success)
                .unwrap_or(false);
            result.generated_sql = executed.generated_sql;
            result.sql_result = sql_result;
            result.sources = executed.sources;
            result.error = executed.error;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_to_query_type() {
        assert_eq!(subtype_to_query_type(QuerySubtype::List), QueryType::Sql);
        assert_eq!(subtype_to_query_type(QuerySubtype::Ranking), QueryType::Sql);
        assert_eq!(subtype_to_query_type(QuerySubtype::Concept), QueryType::Rag);
    }
}
