//! Cross-domain existence probe over Elasticsearch
//!
//! Reveals which entity backends actually contain documents matching the
//! synonym-expanded query. ES relevance alone is not trusted: each hit is
//! re-checked for core-keyword vs. synonym-only matches so synonyms that
//! occur in unrelated documents cannot dominate.

use rndsearch_core::catalog;
use rndsearch_storage::EsApi;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Capability cues; equipment is owned, not a capability
const CAPABILITY_CUES: &[&str] = &["역량", "보유", "기술력", "전문성", "개발역량", "연구역량"];

/// Hits fetched per domain before the match filter
const SCOUT_FETCH_LIMIT: usize = 50;

/// Ids kept per domain after filtering
const SCOUT_KEEP_LIMIT: usize = 20;

/// Per-domain scout output
#[derive(Debug, Clone, Default)]
pub struct ScoutResult {
    /// Domain -> filtered hit count
    pub hits: HashMap<String, usize>,
    /// Domain -> document ids in filter-score order
    pub doc_ids: HashMap<String, Vec<String>>,
}

impl ScoutResult {
    pub fn active_domains(&self) -> Vec<String> {
        let mut active: Vec<(String, usize)> = self
            .hits
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(domain, count)| (domain.clone(), *count))
            .collect();
        active.sort_by(|a, b| b.1.cmp(&a.1));
        active.into_iter().map(|(domain, _)| domain).collect()
    }
}

/// Probe the given domains (or the full scout set) with the expanded
/// keywords and collect per-domain doc ids.
///
/// `keywords` is the synonym-expanded set, `original_keywords` the analyzer
/// core set used for the match filter. When `domains` is empty the full
/// domain set is scanned, minus `equipment` for capability-phrased queries
/// when the exclusion is enabled.
pub async fn scout_domains(
    es: &dyn EsApi,
    keywords: &[String],
    original_keywords: &[String],
    query: &str,
    domains: &[String],
    capability_excludes_equipment: bool,
) -> ScoutResult {
    if !es.is_enabled() {
        info!("ES scout skipped: ES disabled");
        return ScoutResult::default();
    }

    let search_text = if keywords.is_empty() {
        query.to_string()
    } else {
        keywords.join(" ")
    };
    if search_text.trim().is_empty() {
        warn!("ES scout skipped: no search keywords");
        return ScoutResult::default();
    }

    let search_domains: Vec<String> = if domains.is_empty() {
        let is_capability_search =
            capability_excludes_equipment && CAPABILITY_CUES.iter().any(|cue| query.contains(cue));
        catalog::ES_SCOUT_DOMAINS
            .iter()
            .filter(|domain| !(is_capability_search && **domain == "equipment"))
            .map(|domain| domain.to_string())
            .collect()
    } else {
        domains.to_vec()
    };

    let core_keywords: Vec<&String> = if original_keywords.is_empty() {
        keywords.iter().take(2).collect()
    } else {
        original_keywords.iter().collect()
    };
    let synonym_keywords: Vec<&String> = keywords
        .iter()
        .filter(|kw| !core_keywords.iter().any(|core| core.eq_ignore_ascii_case(kw)))
        .collect();

    let mut result = ScoutResult::default();

    for domain in &search_domains {
        let hits = match es.search(&search_text, domain, SCOUT_FETCH_LIMIT, false).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("ES scout: {domain} search failed: {e}");
                result.hits.insert(domain.clone(), 0);
                result.doc_ids.insert(domain.clone(), Vec::new());
                continue;
            }
        };

        let title_field = catalog::domain_title_field(domain);
        let desc_field = catalog::domain_description_field(domain);

        // score 3: core + synonym, 2: core only, 1: synonym only
        let mut scored: Vec<(usize, f32, String)> = Vec::new();
        for hit in &hits {
            let combined = format!(
                "{} {}",
                hit.source_str(title_field),
                hit.source_str(desc_field)
            )
            .to_lowercase();

            let core_match = core_keywords
                .iter()
                .filter(|kw| kw.chars().count() >= 2)
                .any(|kw| combined.contains(&kw.to_lowercase()));
            let synonym_match = synonym_keywords
                .iter()
                .filter(|kw| kw.chars().count() >= 2)
                .any(|kw| combined.contains(&kw.to_lowercase()));

            let filter_score = match (core_match, synonym_match) {
                (true, true) => 3,
                (true, false) => 2,
                (false, true) => 1,
                (false, false) => continue,
            };

            let id_field = catalog::domain_id_field(domain);
            let doc_id = {
                let from_source = hit.source_str(id_field);
                if from_source.is_empty() {
                    hit.id.clone()
                } else {
                    from_source.to_string()
                }
            };
            scored.push((filter_score, hit.score, doc_id));
        }

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let hit_count = scored.len();
        let doc_ids: Vec<String> = scored
            .into_iter()
            .take(SCOUT_KEEP_LIMIT)
            .map(|(_, _, id)| id)
            .filter(|id| !id.is_empty())
            .collect();

        debug!(
            "ES scout {domain}: {} raw -> {hit_count} matched, keeping {}",
            hits.len(),
            doc_ids.len()
        );
        result.hits.insert(domain.clone(), hit_count);
        result.doc_ids.insert(domain.clone(), doc_ids);
    }

    let active = result.active_domains();
    info!("ES scout complete: active domains {active:?}");
    result
}

/// Entity-type policy after the scout.
///
/// Analyzer-provided entity types win; otherwise active domains decide,
/// falling back to the configured defaults when the scout found nothing.
pub fn resolve_entity_types(
    analyzer_entity_types: &[String],
    scout: &ScoutResult,
    defaults: &[String],
) -> Vec<String> {
    if !analyzer_entity_types.is_empty() {
        return analyzer_entity_types.to_vec();
    }

    let active: Vec<String> = scout
        .active_domains()
        .iter()
        .map(|domain| catalog::entity_for_domain(domain).to_string())
        .collect();

    if active.is_empty() {
        defaults.to_vec()
    } else {
        active
    }
}

/// Prune scout output to the analyzer's entity types (mapped to domains)
pub fn prune_to_entity_types(scout: &mut ScoutResult, entity_types: &[String]) {
    if entity_types.is_empty() {
        return;
    }
    let allowed: Vec<&str> = entity_types
        .iter()
        .map(|entity| catalog::domain_for_entity(entity))
        .collect();
    scout.hits.retain(|domain, _| allowed.contains(&domain.as_str()));
    scout
        .doc_ids
        .retain(|domain, _| allowed.contains(&domain.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_storage::mock::{es_hit, MockEs};

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_scout_scores_core_over_synonym() {
        let es = MockEs::new(true);
        es.set_hits(
            "patent",
            vec![
                // synonym-only match, lower filter score
                es_hit("syn", 9.0, &[("conts_klang_nm", "연료전지 스택"), ("documentid", "kr002")]),
                // core match, should rank first despite lower ES score
                es_hit("core", 1.0, &[("conts_klang_nm", "수소연료전지 시스템"), ("documentid", "kr001")]),
                // no match at all, dropped
                es_hit("none", 5.0, &[("conts_klang_nm", "디스플레이 패널"), ("documentid", "kr003")]),
            ],
        );

        let result = scout_domains(
            &es,
            &keywords(&["수소연료전지", "연료전지"]),
            &keywords(&["수소연료전지"]),
            "수소연료전지 특허",
            &["patent".to_string()],
            true,
        )
        .await;

        assert_eq!(result.hits["patent"], 2);
        assert_eq!(result.doc_ids["patent"], vec!["kr001", "kr002"]);
    }

    #[tokio::test]
    async fn test_scout_disabled_es_is_empty() {
        let es = MockEs::new(false);
        let result = scout_domains(&es, &keywords(&["AI"]), &[], "AI", &[], true).await;
        assert!(result.hits.is_empty());
        assert_eq!(es.call_count(), 0);
    }

    #[tokio::test]
    async fn test_capability_query_excludes_equipment() {
        let es = MockEs::new(true);
        es.set_hits(
            "equipment",
            vec![es_hit("e1", 1.0, &[("conts_klang_nm", "수소연료전지 시험기"), ("conts_id", "c1")])],
        );

        let result = scout_domains(
            &es,
            &keywords(&["수소연료전지"]),
            &keywords(&["수소연료전지"]),
            "수소연료전지 개발 역량 보유 기관",
            &[],
            true,
        )
        .await;
        assert!(!result.hits.contains_key("equipment"));

        // exclusion disabled -> equipment is scanned
        let result = scout_domains(
            &es,
            &keywords(&["수소연료전지"]),
            &keywords(&["수소연료전지"]),
            "수소연료전지 개발 역량 보유 기관",
            &[],
            false,
        )
        .await;
        assert!(result.hits.contains_key("equipment"));
    }

    #[test]
    fn test_resolve_entity_types_policy() {
        let mut scout = ScoutResult::default();
        scout.hits.insert("project".to_string(), 4);
        scout.hits.insert("equipment".to_string(), 1);
        scout.hits.insert("patent".to_string(), 0);

        let defaults = keywords(&["patent", "project"]);

        // analyzer types win
        let kept = resolve_entity_types(&keywords(&["patent"]), &scout, &defaults);
        assert_eq!(kept, vec!["patent"]);

        // active domains by hit count, mapped back to entity names
        let resolved = resolve_entity_types(&[], &scout, &defaults);
        assert_eq!(resolved, vec!["project", "equip"]);

        // nothing active -> defaults
        let empty = ScoutResult::default();
        assert_eq!(resolve_entity_types(&[], &empty, &defaults), defaults);
    }

    #[test]
    fn test_prune_to_entity_types() {
        let mut scout = ScoutResult::default();
        scout.hits.insert("patent".to_string(), 3);
        scout.hits.insert("project".to_string(), 2);
        scout.doc_ids.insert("patent".to_string(), vec!["a".into()]);
        scout.doc_ids.insert("project".to_string(), vec!["b".into()]);

        prune_to_entity_types(&mut scout, &keywords(&["patent"]));
        assert!(scout.hits.contains_key("patent"));
        assert!(!scout.hits.contains_key("project"));
        assert!(!scout.doc_ids.contains_key("project"));
    }
}
