pub mod analyzer;
pub mod es_scout;
pub mod generator;
pub mod merger;
pub mod parallel;
pub mod rag_retriever;
pub mod sql_executor;
pub mod sub_queries;
pub mod vector_enhancer;
