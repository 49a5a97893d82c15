//! Result merge node
//!
//! Complex rankings are RRF-merged across SQL, ES, and graph rankings into a
//! fresh five-column table. Everything else gets source deduplication and
//! priority ordering; compound output formatting stays with the generator,
//! which renders one table per sub-query in input order.

use crate::WorkflowContext;
use rndsearch_core::{QuerySubtype, RankingRow, SourceRef, SqlResult, WorkflowState};
use rndsearch_retrieval::rrf_merge_rankings;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

pub async fn merge_results(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let has_ranking_inputs =
        state.sql_result.is_some() || !state.es_ranking_results.is_empty();
    if state.query_subtype == QuerySubtype::Ranking && has_ranking_inputs {
        return merge_ranking_with_rrf(state, ctx);
    }

    let total_sql_rows: usize = state
        .multi_sql_results
        .values()
        .filter(|result| result.success)
        .map(|result| result.row_count)
        .sum();
    debug!(
        "merging: sql_rows={}, multi_entities={}, rag_results={}",
        state
            .sql_result
            .as_ref()
            .map(|result| result.row_count)
            .unwrap_or(total_sql_rows),
        state.multi_sql_results.len(),
        state.rag_results.len()
    );

    state.sources = dedupe_sources(std::mem::take(&mut state.sources));

    let config = state.search_config.clone();
    state
        .sources
        .sort_by_key(|source| config.priority_of(&source.kind));

    state
}

/// RRF-merge SQL / ES / graph rankings into the five-column table
fn merge_ranking_with_rrf(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let sql_ranking = state
        .sql_result
        .as_ref()
        .map(sql_result_to_ranking)
        .unwrap_or_default();
    let es_ranking = state.es_ranking_results.clone();
    let graph_ranking: Vec<RankingRow> = Vec::new();

    let merged = rrf_merge_rankings(
        &sql_ranking,
        &es_ranking,
        &graph_ranking,
        ctx.config.retrieval.rrf_k,
    );

    info!(
        "ranking RRF merge: SQL {} + ES {} -> {}",
        sql_ranking.len(),
        es_ranking.len(),
        merged.len()
    );

    let columns = vec![
        "순위".to_string(),
        "기관명".to_string(),
        "SQL건수".to_string(),
        "ES건수".to_string(),
        "RRF점수".to_string(),
    ];
    let rows: Vec<Vec<serde_json::Value>> = merged
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, org)| {
            vec![
                json!(i + 1),
                json!(org.org),
                json!(org.sql_count),
                json!(org.es_count),
                json!((org.total_rrf * 10_000.0).round() / 10_000.0),
            ]
        })
        .collect();

    let row_count = rows.len();
    state.sources.push(SourceRef {
        kind: "rrf_merged".to_string(),
        count: Some(row_count),
        ..Default::default()
    });
    state.sql_result = Some(SqlResult {
        success: true,
        columns,
        rows,
        row_count,
        error: None,
        execution_time_ms: 0.0,
        generated_sql: state.generated_sql.clone(),
    });

    state
}

/// SQL rows -> {org, count} using column-name heuristics
fn sql_result_to_ranking(result: &SqlResult) -> Vec<RankingRow> {
    if !result.success || result.rows.is_empty() {
        return Vec::new();
    }

    let first_row = &result.rows[0];
    let is_numeric = |i: usize| {
        first_row
            .get(i)
            .map(|value| value.is_u64() || value.is_i64() || value.is_f64())
            .unwrap_or(false)
    };

    // org: first column with an organization-style header
    let org_idx = result
        .columns
        .iter()
        .position(|column| {
            let lower = column.to_lowercase();
            ["기관", "org", "출원인", "수행기관"]
                .iter()
                .any(|marker| lower.contains(marker))
        })
        .unwrap_or(0);

    // count: first *numeric* column with a count-style header, so text
    // columns like 대표특허 cannot steal the slot
    let count_idx = result
        .columns
        .iter()
        .enumerate()
        .position(|(i, column)| {
            let lower = column.to_lowercase();
            i != org_idx
                && is_numeric(i)
                && ["수", "count", "건수", "특허"]
                    .iter()
                    .any(|marker| lower.contains(marker))
        })
        .or_else(|| (0..result.columns.len()).find(|i| *i != org_idx && is_numeric(*i)))
        .unwrap_or(1);

    result
        .rows
        .iter()
        .filter_map(|row| {
            let org = row.get(org_idx)?.as_str()?.to_string();
            let count = row
                .get(count_idx)
                .and_then(|value| value.as_u64())
                .unwrap_or(0);
            Some(RankingRow { org, count })
        })
        .collect()
}

fn dedupe_sources(sources: Vec<SourceRef>) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.dedup_key()))
        .collect()
}
