//! Dense-vector keyword enhancement
//!
//! Searches the entity collections with the query embedding and mines the
//! returned payloads for expansion keywords. Multi-entity queries run the
//! pipeline per entity independently so one entity's vocabulary cannot
//! dilute another's.

use crate::keyword_extractor::{KeywordExtraction, KeywordExtractor};
use rndsearch_core::catalog;
use rndsearch_core::config::RetrievalConfig;
use rndsearch_embeddings::EmbeddingApi;
use rndsearch_llm::LlmApi;
use rndsearch_storage::{VectorApi, VectorHit};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Output of the enhancement stage
#[derive(Debug, Clone, Default)]
pub struct EnhancementResult {
    /// Union of originals and per-entity expansions, order-preserving
    pub expanded_keywords: Vec<String>,
    /// Per-entity independent keyword sets (multi-entity only)
    pub entity_keywords: HashMap<String, Vec<String>>,
    pub extraction: Option<KeywordExtraction>,
    pub source_doc_count: usize,
}

/// Collections for the given entity types, defaulting to patents+projects
fn collections_for(entity_types: &[String]) -> Vec<&'static str> {
    let mut collections: Vec<&'static str> = Vec::new();
    for entity in entity_types {
        for collection in catalog::entity_collections(entity) {
            if !collections.contains(collection) {
                collections.push(collection);
            }
        }
    }
    if collections.is_empty() {
        collections.extend_from_slice(catalog::DEFAULT_COLLECTIONS);
    }
    collections
}

/// Embed the query once and search each collection with it
async fn multi_search(
    embeddings: &dyn EmbeddingApi,
    vector: &dyn VectorApi,
    query: &str,
    collections: &[&str],
    limit_per_collection: usize,
) -> HashMap<String, Vec<VectorHit>> {
    let query_vector = match embeddings.embed(query).await {
        Ok(vector) => vector,
        Err(e) => {
            warn!("query embedding failed: {e}");
            return HashMap::new();
        }
    };

    let mut results = HashMap::new();
    for collection in collections {
        match vector
            .search(collection, query_vector.clone(), limit_per_collection, None)
            .await
        {
            Ok(hits) => {
                debug!("vector search {collection}: {} hits", hits.len());
                results.insert(collection.to_string(), hits);
            }
            Err(e) => {
                warn!("vector search {collection} failed: {e}");
                results.insert(collection.to_string(), Vec::new());
            }
        }
    }
    results
}

/// Run the enhancement pipeline.
///
/// With two or more entity types each entity is enhanced independently and
/// `entity_keywords` carries the per-entity sets; `expanded_keywords` is
/// always the order-preserving union starting from the originals.
pub async fn enhance_with_vector(
    embeddings: &dyn EmbeddingApi,
    vector: &dyn VectorApi,
    llm: Option<&dyn LlmApi>,
    query: &str,
    entity_types: &[String],
    llm_keywords: &[String],
    config: &RetrievalConfig,
) -> EnhancementResult {
    if query.trim().is_empty() {
        return EnhancementResult {
            expanded_keywords: llm_keywords.to_vec(),
            ..Default::default()
        };
    }

    let extractor = KeywordExtractor::new();

    if entity_types.len() >= 2 {
        return enhance_multi_entity(
            embeddings,
            vector,
            llm,
            &extractor,
            query,
            entity_types,
            llm_keywords,
            config,
        )
        .await;
    }

    let collections = collections_for(entity_types);
    info!("vector enhancement: collections={collections:?}");

    let hits = multi_search(
        embeddings,
        vector,
        query,
        &collections,
        config.vector_search_limit,
    )
    .await;

    let extraction = extractor
        .extract_and_merge(
            llm,
            query,
            llm_keywords,
            &hits,
            config.keyword_min_frequency,
            config.keyword_max_expansion,
        )
        .await;

    EnhancementResult {
        expanded_keywords: extraction.final_keywords.clone(),
        entity_keywords: HashMap::new(),
        source_doc_count: extraction.source_doc_count,
        extraction: Some(extraction),
    }
}

#[allow(clippy::too_many_arguments)]
async fn enhance_multi_entity(
    embeddings: &dyn EmbeddingApi,
    vector: &dyn VectorApi,
    llm: Option<&dyn LlmApi>,
    extractor: &KeywordExtractor,
    query: &str,
    entity_types: &[String],
    llm_keywords: &[String],
    config: &RetrievalConfig,
) -> EnhancementResult {
    info!("multi-entity vector enhancement: entities={entity_types:?}");

    let mut entity_keywords: HashMap<String, Vec<String>> = HashMap::new();
    let mut all_expanded: Vec<String> = llm_keywords.to_vec();
    let mut total_doc_count = 0usize;

    for entity in entity_types {
        let collections: Vec<&str> = catalog::entity_collections(entity).to_vec();
        if collections.is_empty() {
            debug!("{entity}: no collections, falling back to analyzer keywords");
            entity_keywords.insert(entity.clone(), llm_keywords.to_vec());
            continue;
        }

        let hits = multi_search(
            embeddings,
            vector,
            query,
            &collections,
            config.vector_search_limit,
        )
        .await;

        let extraction = extractor
            .extract_and_merge(
                llm,
                query,
                llm_keywords,
                &hits,
                config.keyword_min_frequency,
                config.keyword_max_expansion,
            )
            .await;

        for keyword in &extraction.final_keywords {
            if !all_expanded.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                all_expanded.push(keyword.clone());
            }
        }
        total_doc_count += extraction.source_doc_count;
        debug!("{entity}: keywords={:?}", extraction.final_keywords);
        entity_keywords.insert(entity.clone(), extraction.final_keywords);
    }

    EnhancementResult {
        expanded_keywords: all_expanded,
        entity_keywords,
        extraction: None,
        source_doc_count: total_doc_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_embeddings::MockEmbeddingProvider;
    use rndsearch_storage::mock::{vector_hit, MockVector};

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            keyword_min_frequency: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_entity_expansion() {
        let embeddings = MockEmbeddingProvider::new(1024);
        let vector = MockVector::new();
        vector.set_hits(
            "patents_v3_collection",
            (0..3)
                .map(|i| vector_hit(&i.to_string(), 0.9, &[("text", "막전극접합체 기반 스택")]))
                .collect(),
        );

        let result = enhance_with_vector(
            &embeddings,
            &vector,
            None,
            "수소연료전지 특허",
            &["patent".to_string()],
            &["수소연료전지".to_string()],
            &config(),
        )
        .await;

        assert_eq!(result.expanded_keywords[0], "수소연료전지");
        assert!(result.expanded_keywords.iter().any(|k| k == "막전극접합체"));
        assert!(result.entity_keywords.is_empty());
        assert_eq!(result.source_doc_count, 3);
    }

    #[tokio::test]
    async fn test_multi_entity_independent_keywords() {
        let embeddings = MockEmbeddingProvider::new(1024);
        let vector = MockVector::new();
        vector.set_hits(
            "patents_v3_collection",
            (0..3)
                .map(|i| vector_hit(&format!("p{i}"), 0.9, &[("text", "막전극접합체 스택")]))
                .collect(),
        );
        vector.set_hits(
            "projects_v3_collection",
            (0..3)
                .map(|i| vector_hit(&format!("r{i}"), 0.9, &[("text", "그린수소 실증")]))
                .collect(),
        );

        let result = enhance_with_vector(
            &embeddings,
            &vector,
            None,
            "수소연료전지 특허와 연구과제",
            &["patent".to_string(), "project".to_string()],
            &["수소연료전지".to_string()],
            &config(),
        )
        .await;

        let patent_keywords = &result.entity_keywords["patent"];
        let project_keywords = &result.entity_keywords["project"];
        assert!(patent_keywords.iter().any(|k| k == "막전극접합체"));
        assert!(!patent_keywords.iter().any(|k| k == "그린수소"));
        assert!(project_keywords.iter().any(|k| k == "그린수소"));
        // the union carries both vocabularies
        assert!(result.expanded_keywords.iter().any(|k| k == "막전극접합체"));
        assert!(result.expanded_keywords.iter().any(|k| k == "그린수소"));
    }

    #[tokio::test]
    async fn test_empty_query_passthrough() {
        let embeddings = MockEmbeddingProvider::new(1024);
        let vector = MockVector::new();
        let result = enhance_with_vector(
            &embeddings,
            &vector,
            None,
            "  ",
            &[],
            &["AI".to_string()],
            &config(),
        )
        .await;
        assert_eq!(result.expanded_keywords, vec!["AI"]);
        assert_eq!(vector.call_count(), 0);
    }
}
