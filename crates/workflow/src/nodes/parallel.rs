//! Parallel fan-out nodes
//!
//! `parallel` runs SQL and RAG concurrently with independent per-branch
//! timeouts; `parallel_ranking` runs SQL ranking and ES ranking for the
//! merger's RRF pass. A failed or timed-out branch never aborts the turn;
//! its error is concatenated and the surviving branch's results are used.
//! The branch futures are joined, not spawned, so dropping the turn cancels
//! them together.

use crate::error::WorkflowError;
use crate::nodes::{rag_retriever, sql_executor};
use crate::WorkflowContext;
use rndsearch_core::WorkflowState;
use std::time::Duration;
use tracing::{info, warn};

/// SQL and RAG concurrently; union of sources, shallow-field merge
pub async fn parallel_execution(state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let timeout = Duration::from_secs(ctx.config.workflow.branch_timeout_secs);

    let sql_branch = tokio::time::timeout(timeout, sql_executor::execute_sql(state.clone(), ctx));
    let rag_branch = tokio::time::timeout(timeout, rag_retriever::retrieve_rag(state.clone(), ctx));

    let (sql_outcome, rag_outcome) = tokio::join!(sql_branch, rag_branch);

    let mut merged = state;
    let mut errors: Vec<String> = Vec::new();

    match sql_outcome {
        Ok(sql_state) => {
            merged.sql_result = sql_state.sql_result;
            merged.multi_sql_results = sql_state.multi_sql_results;
            merged.generated_sql = sql_state.generated_sql;
            merged.sources.extend(sql_state.sources);
            if let Some(error) = sql_state.error {
                errors.push(error);
            }
        }
        Err(_) => {
            warn!("SQL branch timed out");
            errors.push(WorkflowError::SqlExecution("시간 초과".to_string()).to_string());
        }
    }

    match rag_outcome {
        Ok(rag_state) => {
            merged.rag_results = rag_state.rag_results;
            merged.search_strategy = rag_state.search_strategy;
            merged.es_ranking_results = rag_state.es_ranking_results;
            merged.sources.extend(rag_state.sources);
            if let Some(error) = rag_state.error {
                errors.push(error);
            }
        }
        Err(_) => {
            warn!("RAG branch timed out");
            errors.push(WorkflowError::RagRetrieval("시간 초과".to_string()).to_string());
        }
    }

    for error in errors {
        merged.push_error(error);
    }

    info!(
        "parallel execution complete: sql_rows={}, rag_results={}",
        merged
            .sql_result
            .as_ref()
            .map(|r| r.row_count)
            .unwrap_or_default(),
        merged.rag_results.len()
    );
    merged
}

/// SQL ranking and ES ranking concurrently, handed to the merger for RRF
pub async fn parallel_ranking_execution(
    state: WorkflowState,
    ctx: &WorkflowContext,
) -> WorkflowState {
    info!("complex ranking: SQL + ES in parallel");
    let timeout = Duration::from_secs(ctx.config.workflow.branch_timeout_secs);

    let sql_branch = tokio::time::timeout(timeout, sql_executor::execute_sql(state.clone(), ctx));
    let es_branch = tokio::time::timeout(timeout, rag_retriever::retrieve_rag(state.clone(), ctx));

    let (sql_outcome, es_outcome) = tokio::join!(sql_branch, es_branch);

    let mut merged = state;
    let mut errors: Vec<String> = Vec::new();

    match sql_outcome {
        Ok(sql_state) => {
            merged.sql_result = sql_state.sql_result;
            merged.generated_sql = sql_state.generated_sql;
            merged.sources.extend(sql_state.sources);
            if let Some(error) = sql_state.error {
                errors.push(format!("SQL: {error}"));
            }
        }
        Err(_) => errors.push(WorkflowError::SqlExecution("시간 초과".to_string()).to_string()),
    }

    match es_outcome {
        Ok(es_state) => {
            merged.es_ranking_results = es_state.es_ranking_results;
            merged.sources.extend(es_state.sources);
            if let Some(error) = es_state.error {
                errors.push(format!("ES: {error}"));
            }
        }
        Err(_) => errors.push(WorkflowError::RagRetrieval("ES 시간 초과".to_string()).to_string()),
    }

    for error in errors {
        merged.push_error(error);
    }

    info!(
        "parallel ranking complete: sql={}, es={}",
        merged
            .sql_result
            .as_ref()
            .map(|r| r.row_count)
            .unwrap_or_default(),
        merged.es_ranking_results.len()
    );
    merged
}
