//! Retrieval layer: keyword expansion, cross-domain scouting, and fusion
//!
//! The pipeline runs in stages: synonym expansion over a static dictionary,
//! an ES scout probing which domains actually contain matching documents,
//! dense-vector keyword enhancement per entity, and finally the RAG
//! strategies (vector / graph / hybrid with RRF fusion and graph
//! cross-validation).

pub mod es_scout;
pub mod graph_rag;
pub mod keyword_extractor;
pub mod rrf;
pub mod stopwords;
pub mod synonyms;
pub mod vector_enhancer;

pub use es_scout::{prune_to_entity_types, resolve_entity_types, scout_domains, ScoutResult};
pub use graph_rag::GraphRag;
pub use keyword_extractor::{KeywordExtraction, KeywordExtractor};
pub use rrf::{rrf_fuse, rrf_merge_rankings, RankedOrg};
pub use synonyms::SynonymDictionary;
pub use vector_enhancer::{enhance_with_vector, EnhancementResult};
