//! Core types for the rndsearch retrieval orchestrator
//!
//! Home of the error type, configuration, the workflow state record, the
//! per-request search strategy, and the static schema catalog. Everything
//! downstream depends on this crate and nothing here performs I/O.

pub mod catalog;
pub mod config;
pub mod error;
pub mod search_config;
pub mod state;

pub use config::Config;
pub use error::{Error, Result, ResultExt};
pub use search_config::{EsMode, GraphRagStrategy, SearchConfig, SearchSource};
pub use state::{
    ChatMessage, CrosstabRow, CrosstabTable, EsStatistics, Level, MergeStrategy, QuerySubtype,
    QueryType, RankingRow, RankingType, SearchResult, SourceRef, SqlResult, StatsBucket,
    StatsBucketSet, StructuredKeywords, SubQuery, SubQueryResult, WorkflowState,
};
