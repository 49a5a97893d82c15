use thiserror::Error;

/// Result type for rndsearch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rndsearch operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query analysis errors (LLM call or parse failure in the analyzer)
    #[error("Query analysis error: {0}")]
    QueryAnalysis(String),

    /// SQL generation, validation, or execution errors
    #[error("SQL execution error: {0}")]
    SqlExecution(String),

    /// Vector / graph / ES retrieval errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Backend storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// LLM connection or response errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Result merge errors (all sources failed)
    #[error("Merge error: {0}")]
    Merge(String),

    /// Response generation errors
    #[error("Response generation error: {0}")]
    ResponseGeneration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a query analysis error
    pub fn query_analysis(msg: impl Into<String>) -> Self {
        Self::QueryAnalysis(msg.into())
    }

    /// Creates a SQL execution error
    pub fn sql_execution(msg: impl Into<String>) -> Self {
        Self::SqlExecution(msg.into())
    }

    /// Creates a retrieval error
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Creates an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}
