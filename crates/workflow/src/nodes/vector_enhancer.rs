//! Vector enhancer node
//!
//! Expands the analyzer keywords with vocabulary mined from dense-vector
//! search payloads. Multi-entity states get independent per-entity keyword
//! sets so SQL predicates stay sharp for each entity.

use crate::WorkflowContext;
use rndsearch_core::WorkflowState;
use rndsearch_llm::LlmApi;
use rndsearch_retrieval::enhance_with_vector;
use tracing::info;

pub async fn vector_enhance(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    if state.query.trim().is_empty() {
        return state;
    }

    let llm: Option<&dyn LlmApi> = if ctx.config.retrieval.use_llm_keyword_review {
        Some(ctx.llm.as_ref())
    } else {
        None
    };

    let result = enhance_with_vector(
        ctx.embeddings.as_ref(),
        ctx.vector.as_ref(),
        llm,
        &state.query,
        &state.entity_types,
        &state.keywords,
        &ctx.config.retrieval,
    )
    .await;

    info!(
        "vector enhancement: expanded={:?}, entity_keywords={}",
        result.expanded_keywords,
        result.entity_keywords.len()
    );

    state.expanded_keywords = result.expanded_keywords;
    state.entity_keywords = result.entity_keywords;
    state
}
