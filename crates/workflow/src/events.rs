//! Streaming progress events
//!
//! Emitted over an `mpsc` channel during workflow execution. The event
//! stream is the transport-facing contract; consumers treat unknown events
//! as informational.

use rndsearch_core::{SourceRef, SqlResult};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A node started running
    Status { node: String, message: String },

    AnalysisComplete {
        query_type: String,
        query_subtype: String,
        entity_types: Vec<String>,
        keywords: Vec<String>,
        is_compound: bool,
    },

    SubqueryInfo {
        count: usize,
        intents: Vec<String>,
    },

    SubqueryProgress {
        index: usize,
        intent: String,
        success: bool,
    },

    VectorComplete {
        expanded_keywords: Vec<String>,
    },

    SqlComplete {
        row_count: usize,
        success: bool,
    },

    MultiSqlComplete {
        row_counts: HashMap<String, usize>,
    },

    RagComplete {
        result_count: usize,
        strategy: String,
    },

    SubQueryComplete {
        results: usize,
    },

    PerspectiveSummary {
        summary: String,
    },

    StageTiming {
        timing: HashMap<String, f64>,
    },

    Done {
        response: String,
        sources: Vec<SourceRef>,
        context_quality: f32,
        generated_sql: Option<String>,
        sql_result: Option<SqlResult>,
    },

    Error {
        message: String,
    },
}

impl WorkflowEvent {
    pub fn status(node: &str, message: impl Into<String>) -> Self {
        Self::Status {
            node: node.to_string(),
            message: message.into(),
        }
    }
}

/// Fire-and-forget emit; a dropped receiver never blocks the workflow
pub async fn emit(
    sender: Option<&tokio::sync::mpsc::Sender<WorkflowEvent>>,
    event: WorkflowEvent,
) {
    if let Some(sender) = sender {
        let _ = sender.send(event).await;
    }
}
