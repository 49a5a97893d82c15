//! State-graph engine
//!
//! Fixed topology: entry -> analyzer -> es_scout -> (conditional) with
//! parallel fan-out nodes joining at the merger, the generator as terminal
//! node. Every node is wrapped with an elapsed-ms measurement appended to
//! `stage_timing`, and progress events stream out per node.

use crate::edges;
use crate::events::{emit, WorkflowEvent};
use crate::nodes;
use crate::WorkflowContext;
use rndsearch_core::WorkflowState;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc::Sender;
use tracing::info;

/// Workflow nodes; `End` is the terminal marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Analyzer,
    EsScout,
    VectorEnhancer,
    SqlNode,
    RagNode,
    Parallel,
    ParallelRanking,
    SubQueries,
    Merger,
    Generator,
    End,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Analyzer => "analyzer",
            Node::EsScout => "es_scout",
            Node::VectorEnhancer => "vector_enhancer",
            Node::SqlNode => "sql_node",
            Node::RagNode => "rag_node",
            Node::Parallel => "parallel",
            Node::ParallelRanking => "parallel_ranking",
            Node::SubQueries => "sub_queries",
            Node::Merger => "merger",
            Node::Generator => "generator",
            Node::End => "end",
        }
    }
}

/// Static edges plus the conditional routers
fn next_node(current: Node, state: &WorkflowState) -> Node {
    match current {
        Node::Analyzer => Node::EsScout,
        Node::EsScout => edges::route_after_es_scout(state),
        Node::VectorEnhancer => edges::route_query(state),
        Node::SqlNode => edges::route_after_sql(state),
        Node::RagNode => edges::route_after_rag(state),
        Node::Parallel | Node::ParallelRanking | Node::SubQueries => Node::Merger,
        Node::Merger => Node::Generator,
        Node::Generator => Node::End,
        Node::End => Node::End,
    }
}

async fn run_node(node: Node, state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    match node {
        Node::Analyzer => nodes::analyzer::analyze_query(state, ctx).await,
        Node::EsScout => nodes::es_scout::es_scout(state, ctx).await,
        Node::VectorEnhancer => nodes::vector_enhancer::vector_enhance(state, ctx).await,
        Node::SqlNode => nodes::sql_executor::execute_sql(state, ctx).await,
        Node::RagNode => nodes::rag_retriever::retrieve_rag(state, ctx).await,
        Node::Parallel => nodes::parallel::parallel_execution(state, ctx).await,
        Node::ParallelRanking => nodes::parallel::parallel_ranking_execution(state, ctx).await,
        Node::SubQueries => nodes::sub_queries::execute_sub_queries(state, ctx).await,
        Node::Merger => nodes::merger::merge_results(state, ctx).await,
        Node::Generator => nodes::generator::generate_response(state, ctx).await,
        Node::End => state,
    }
}

async fn emit_node_events(
    node: Node,
    state: &WorkflowState,
    events: Option<&Sender<WorkflowEvent>>,
) {
    match node {
        Node::Analyzer => {
            emit(
                events,
                WorkflowEvent::AnalysisComplete {
                    query_type: state.query_type.as_str().to_string(),
                    query_subtype: state.query_subtype.as_str().to_string(),
                    entity_types: state.entity_types.clone(),
                    keywords: state.keywords.clone(),
                    is_compound: state.is_compound,
                },
            )
            .await;
            if state.is_compound && !state.sub_queries.is_empty() {
                emit(
                    events,
                    WorkflowEvent::SubqueryInfo {
                        count: state.sub_queries.len(),
                        intents: state
                            .sub_queries
                            .iter()
                            .map(|sq| sq.intent.clone())
                            .collect(),
                    },
                )
                .await;
            }
        }
        Node::VectorEnhancer => {
            emit(
                events,
                WorkflowEvent::VectorComplete {
                    expanded_keywords: state.expanded_keywords.clone(),
                },
            )
            .await;
        }
        Node::SqlNode | Node::Parallel | Node::ParallelRanking => {
            if !state.multi_sql_results.is_empty() {
                let row_counts: HashMap<String, usize> = state
                    .multi_sql_results
                    .iter()
                    .map(|(entity, result)| (entity.clone(), result.row_count))
                    .collect();
                emit(events, WorkflowEvent::MultiSqlComplete { row_counts }).await;
            } else if let Some(result) = &state.sql_result {
                emit(
                    events,
                    WorkflowEvent::SqlComplete {
                        row_count: result.row_count,
                        success: result.success,
                    },
                )
                .await;
            }
        }
        Node::RagNode => {
            emit(
                events,
                WorkflowEvent::RagComplete {
                    result_count: state.rag_results.len(),
                    strategy: state.search_strategy.clone(),
                },
            )
            .await;
        }
        Node::SubQueries => {
            for result in &state.sub_query_results {
                emit(
                    events,
                    WorkflowEvent::SubqueryProgress {
                        index: result.index,
                        intent: result.query.clone(),
                        success: result.success,
                    },
                )
                .await;
            }
            emit(
                events,
                WorkflowEvent::SubQueryComplete {
                    results: state.sub_query_results.len(),
                },
            )
            .await;
            let succeeded = state
                .sub_query_results
                .iter()
                .filter(|result| result.success)
                .count();
            emit(
                events,
                WorkflowEvent::PerspectiveSummary {
                    summary: format!(
                        "{}개 하위 질의 중 {succeeded}개 성공",
                        state.sub_query_results.len()
                    ),
                },
            )
            .await;
        }
        _ => {}
    }
}

/// Run the graph from entry to exit
pub async fn execute_graph(
    ctx: &WorkflowContext,
    mut state: WorkflowState,
    events: Option<&Sender<WorkflowEvent>>,
) -> WorkflowState {
    let mut node = Node::Analyzer;
    let mut steps = 0usize;

    while node != Node::End {
        // the topology is acyclic; the cap only guards against router bugs
        steps += 1;
        if steps > 16 {
            state.push_error("워크플로우 단계 초과".to_string());
            break;
        }

        emit(events, WorkflowEvent::status(node.name(), "실행 중")).await;

        let start = Instant::now();
        state = run_node(node, state, ctx).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!("[{}] {:.2}ms", node.name(), elapsed_ms);
        state
            .stage_timing
            .insert(format!("{}_ms", node.name()), (elapsed_ms * 100.0).round() / 100.0);

        emit_node_events(node, &state, events).await;
        node = next_node(node, &state);
    }

    emit(
        events,
        WorkflowEvent::StageTiming {
            timing: state.stage_timing.clone(),
        },
    )
    .await;

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_core::{Level, QuerySubtype, QueryType};

    #[test]
    fn test_static_edges() {
        let state = WorkflowState::new("q", "s", Level::L3, None);
        assert_eq!(next_node(Node::Analyzer, &state), Node::EsScout);
        assert_eq!(next_node(Node::Parallel, &state), Node::Merger);
        assert_eq!(next_node(Node::ParallelRanking, &state), Node::Merger);
        assert_eq!(next_node(Node::SubQueries, &state), Node::Merger);
        assert_eq!(next_node(Node::Merger, &state), Node::Generator);
        assert_eq!(next_node(Node::Generator, &state), Node::End);
    }

    #[test]
    fn test_conditional_edge_delegation() {
        let mut state = WorkflowState::new("q", "s", Level::L3, None);
        state.query_type = QueryType::Sql;
        state.query_subtype = QuerySubtype::TrendAnalysis;
        state.keywords = vec!["AI".into()];
        assert_eq!(next_node(Node::EsScout, &state), Node::SqlNode);
    }
}
