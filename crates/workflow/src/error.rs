use thiserror::Error;

/// Workflow-level error taxonomy
///
/// Nodes capture these per branch and concatenate them into the state's
/// error string; the graph never aborts mid-turn on a single-branch error.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("빈 질문입니다")]
    EmptyQuery,

    #[error("쿼리 분류 실패: {0}")]
    QueryAnalysis(String),

    #[error("SQL 실행 실패: {0}")]
    SqlExecution(String),

    #[error("RAG 검색 실패: {0}")]
    RagRetrieval(String),

    #[error("결과 병합 실패: {0}")]
    Merge(String),

    #[error("응답 생성 실패: {0}")]
    ResponseGeneration(String),

    #[error("LLM 연결 실패: {0}")]
    LlmConnection(String),

    #[error("데이터베이스 연결 실패: {0}")]
    DatabaseConnection(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_korean() {
        assert!(WorkflowError::EmptyQuery.to_string().contains("질문"));
        assert!(WorkflowError::SqlExecution("x".into())
            .to_string()
            .contains("SQL"));
    }
}
