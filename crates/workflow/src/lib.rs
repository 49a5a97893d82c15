//! Plan-driven retrieval workflow
//!
//! The public surface is [`WorkflowContext`]: build it once over the backend
//! clients, then call [`WorkflowContext::run_workflow`] per turn or
//! [`stream_workflow`] for node-level progress events. Conversation history
//! is the only state carried across turns, keyed by session id and capped by
//! the history reducer.

pub mod edges;
pub mod engine;
pub mod error;
pub mod events;
pub mod loaders;
pub mod nodes;
pub mod prompts;
pub mod search_config;
pub mod templates;

pub use engine::Node;
pub use error::WorkflowError;
pub use events::WorkflowEvent;
pub use loaders::LoaderRegistry;

use dashmap::DashMap;
use rndsearch_core::{
    ChatMessage, Config, Level, SourceRef, SqlResult, WorkflowState,
};
use rndsearch_embeddings::EmbeddingApi;
use rndsearch_llm::LlmApi;
use rndsearch_retrieval::{GraphRag, SynonymDictionary};
use rndsearch_storage::{EsApi, GraphApi, SqlApi, VectorApi};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

/// Final result of one turn
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub query: String,
    pub query_type: String,
    pub query_subtype: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub generated_sql: Option<String>,
    pub sql_result: Option<SqlResult>,
    pub multi_sql_results: HashMap<String, SqlResult>,
    pub context_quality: f32,
    pub stage_timing: HashMap<String, f64>,
    pub elapsed_ms: f64,
    pub error: Option<String>,
}

/// Process-wide execution context: backend clients, static resources, and
/// per-session conversation history
pub struct WorkflowContext {
    pub config: Config,
    pub llm: Arc<dyn LlmApi>,
    pub embeddings: Arc<dyn EmbeddingApi>,
    pub vector: Arc<dyn VectorApi>,
    pub es: Arc<dyn EsApi>,
    pub graph: Arc<dyn GraphApi>,
    pub sql: Arc<dyn SqlApi>,
    pub synonyms: SynonymDictionary,
    pub loaders: LoaderRegistry,
    pub graph_rag: GraphRag,
    sessions: DashMap<String, Vec<ChatMessage>>,
}

impl WorkflowContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmApi>,
        embeddings: Arc<dyn EmbeddingApi>,
        vector: Arc<dyn VectorApi>,
        es: Arc<dyn EsApi>,
        graph: Arc<dyn GraphApi>,
        sql: Arc<dyn SqlApi>,
    ) -> Self {
        let synonyms = SynonymDictionary::load(Path::new(&config.retrieval.synonyms_path));
        let graph_rag = GraphRag::new(
            vector.clone(),
            graph.clone(),
            embeddings.clone(),
            config.retrieval.rrf_k,
        );

        Self {
            config,
            llm,
            embeddings,
            vector,
            es,
            graph,
            sql,
            synonyms,
            loaders: LoaderRegistry::with_builtins(),
            graph_rag,
            sessions: DashMap::new(),
        }
    }

    /// Synchronous chat entry point: one query in, one result out
    pub async fn run_workflow(
        &self,
        query: &str,
        session_id: &str,
        level: Level,
        entity_types: Option<Vec<String>>,
    ) -> WorkflowResult {
        let start = Instant::now();

        let mut state = WorkflowState::new(query, session_id, level, entity_types);
        state.conversation_history = self
            .sessions
            .get(session_id)
            .map(|history| history.clone())
            .unwrap_or_default();

        let state = engine::execute_graph(self, state, None).await;

        self.sessions
            .insert(session_id.to_string(), state.conversation_history.clone());

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "workflow complete: {:.2}ms, type={:?}",
            elapsed_ms, state.query_type
        );

        result_from_state(state, elapsed_ms)
    }

    /// Conversation history for a session (test and CLI introspection)
    pub fn session_history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .get(session_id)
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

fn result_from_state(state: WorkflowState, elapsed_ms: f64) -> WorkflowResult {
    WorkflowResult {
        query: state.query,
        query_type: state.query_type.as_str().to_string(),
        query_subtype: state.query_subtype.as_str().to_string(),
        response: state.response,
        sources: state.sources,
        generated_sql: state.generated_sql,
        sql_result: state.sql_result,
        multi_sql_results: state.multi_sql_results,
        context_quality: state.context_quality,
        stage_timing: state.stage_timing,
        elapsed_ms: (elapsed_ms * 100.0).round() / 100.0,
        error: state.error,
    }
}

/// Streaming entry point: runs the workflow in the background and yields
/// node-level progress events, ending with `done` (or `error`)
pub fn stream_workflow(
    ctx: Arc<WorkflowContext>,
    query: String,
    session_id: String,
    level: Level,
    entity_types: Option<Vec<String>>,
) -> mpsc::Receiver<WorkflowEvent> {
    let (sender, receiver) = mpsc::channel(64);

    tokio::spawn(async move {
        let start = Instant::now();

        let mut state = WorkflowState::new(&query, &session_id, level, entity_types);
        state.conversation_history = ctx.session_history(&session_id);

        let state = engine::execute_graph(&ctx, state, Some(&sender)).await;

        ctx.sessions
            .insert(session_id.clone(), state.conversation_history.clone());

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let result = result_from_state(state, elapsed_ms);

        if result.response.is_empty() {
            let _ = sender
                .send(WorkflowEvent::Error {
                    message: result
                        .error
                        .unwrap_or_else(|| "응답이 생성되지 않았습니다".to_string()),
                })
                .await;
        } else {
            let _ = sender
                .send(WorkflowEvent::Done {
                    response: result.response,
                    sources: result.sources,
                    context_quality: result.context_quality,
                    generated_sql: result.generated_sql,
                    sql_result: result.sql_result,
                })
                .await;
        }
    });

    receiver
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rndsearch_embeddings::MockEmbeddingProvider;
    use rndsearch_llm::MockLlm;
    use rndsearch_storage::mock::{MockEs, MockGraph, MockSql, MockVector};

    /// Context over mock backends for node-level unit tests
    pub fn test_context() -> WorkflowContext {
        WorkflowContext::new(
            Config::default(),
            Arc::new(MockLlm::new(vec![])),
            Arc::new(MockEmbeddingProvider::new(1024)),
            Arc::new(MockVector::new()),
            Arc::new(MockEs::new(true)),
            Arc::new(MockGraph::new()),
            Arc::new(MockSql::new()),
        )
    }
}
