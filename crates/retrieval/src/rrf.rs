//! Reciprocal Rank Fusion
//!
//! `score(d) = Σ_s 1/(k + rank_s(d) + 1)` with ranks starting at 0.
//! Merges heterogeneous ranked lists by id, keeping the union of metadata.
//!
//! Reference: https://plg.uwaterloo.ca/~gvcormac/cormacksigir09-rrf.pdf

use rndsearch_core::{RankingRow, SearchResult};
use std::collections::HashMap;

/// Fuse named ranked lists of search results.
///
/// Each entry of `sources` is `(source_name, ranked_results)`. The fused
/// score replaces the per-source score; `metadata["rrf_source"]` records
/// which sources contributed ("both" when more than one did).
pub fn rrf_fuse(sources: Vec<(&str, Vec<SearchResult>)>, k: usize) -> Vec<SearchResult> {
    let mut fused: HashMap<String, (SearchResult, f32, Vec<String>)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for (source_name, results) in sources {
        for (rank, result) in results.into_iter().enumerate() {
            let rrf_score = 1.0 / ((k + rank + 1) as f32);
            match fused.get_mut(&result.node_id) {
                Some((existing, score, names)) => {
                    *score += rrf_score;
                    if !names.iter().any(|n| n == source_name) {
                        names.push(source_name.to_string());
                    }
                    // union of metadata; first writer wins on conflicts
                    for (key, value) in result.metadata {
                        existing.metadata.entry(key).or_insert(value);
                    }
                    if existing.description.is_empty() {
                        existing.description = result.description;
                    }
                }
                None => {
                    order.push(result.node_id.clone());
                    fused.insert(
                        result.node_id.clone(),
                        (result, rrf_score, vec![source_name.to_string()]),
                    );
                }
            }
        }
    }

    let mut results: Vec<SearchResult> = order
        .into_iter()
        .filter_map(|node_id| fused.remove(&node_id))
        .map(|(mut result, score, names)| {
            let source_label = if names.len() > 1 {
                "both".to_string()
            } else {
                names.into_iter().next().unwrap_or_default()
            };
            result.score = score;
            result
                .metadata
                .insert("rrf_source".to_string(), serde_json::json!(source_label));
            result
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// One organization entry of a fused ranking
#[derive(Debug, Clone, Default)]
pub struct RankedOrg {
    pub org: String,
    pub sql_count: u64,
    pub es_count: u64,
    pub total_rrf: f64,
}

/// RRF-merge organization rankings from SQL, ES, and graph sources.
///
/// Input rows carry `(org, count)`; ranks follow the input order of each
/// list. Output is sorted by fused score, descending.
pub fn rrf_merge_rankings(
    sql_ranking: &[RankingRow],
    es_ranking: &[RankingRow],
    graph_ranking: &[RankingRow],
    k: usize,
) -> Vec<RankedOrg> {
    let mut merged: HashMap<String, RankedOrg> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    let mut absorb = |rows: &[RankingRow], source: &str| {
        for (rank, row) in rows.iter().enumerate() {
            let rrf_score = 1.0 / ((k + rank + 1) as f64);
            let entry = merged.entry(row.org.clone()).or_insert_with(|| {
                order.push(row.org.clone());
                RankedOrg {
                    org: row.org.clone(),
                    ..Default::default()
                }
            });
            entry.total_rrf += rrf_score;
            match source {
                "sql" => entry.sql_count = row.count,
                "es" => entry.es_count = row.count,
                _ => {}
            }
        }
    };

    absorb(sql_ranking, "sql");
    absorb(es_ranking, "es");
    absorb(graph_ranking, "graph");

    let mut results: Vec<RankedOrg> = order
        .into_iter()
        .filter_map(|org| merged.remove(&org))
        .collect();
    results.sort_by(|a, b| {
        b.total_rrf
            .partial_cmp(&a.total_rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            node_id: id.to_string(),
            name: id.to_string(),
            entity_type: "patent".to_string(),
            score: 1.0,
            ..Default::default()
        }
    }

    fn row(org: &str, count: u64) -> RankingRow {
        RankingRow {
            org: org.to_string(),
            count,
        }
    }

    #[test]
    fn test_rrf_combines_scores_across_sources() {
        let graph = vec![result("2"), result("1"), result("3")];
        let vector = vec![result("2"), result("1"), result("4")];
        let fused = rrf_fuse(vec![("graph", graph), ("vector", vector)], 60);

        assert_eq!(fused.len(), 4);
        assert_eq!(fused[0].node_id, "2");
        assert_eq!(
            fused[0].metadata["rrf_source"],
            serde_json::json!("both")
        );
        let only_vector = fused.iter().find(|r| r.node_id == "4").unwrap();
        assert_eq!(only_vector.metadata["rrf_source"], serde_json::json!("vector"));
    }

    #[test]
    fn test_rrf_score_formula() {
        let fused = rrf_fuse(
            vec![("graph", vec![result("1")]), ("vector", vec![result("1")])],
            60,
        );
        let expected = 2.0 * (1.0 / 61.0f32);
        assert!((fused[0].score - expected).abs() < 1e-6);
    }

    /// Single-source law: with one source, the RRF order equals input order
    #[test]
    fn test_rrf_single_source_preserves_order() {
        let input = vec![result("a"), result("b"), result("c"), result("d")];
        let fused = rrf_fuse(vec![("vector", input.clone())], 60);
        let fused_ids: Vec<&str> = fused.iter().map(|r| r.node_id.as_str()).collect();
        let input_ids: Vec<&str> = input.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(fused_ids, input_ids);
    }

    #[test]
    fn test_rrf_empty_sources() {
        assert!(rrf_fuse(vec![("graph", vec![]), ("vector", vec![])], 60).is_empty());
    }

    #[test]
    fn test_ranking_merge_tracks_per_source_counts() {
        let sql = vec![row("삼성전자", 120), row("LG화학", 80)];
        let es = vec![row("LG화학", 95), row("삼성전자", 90)];
        let merged = rrf_merge_rankings(&sql, &es, &[], 60);

        assert_eq!(merged.len(), 2);
        let samsung = merged.iter().find(|r| r.org == "삼성전자").unwrap();
        assert_eq!(samsung.sql_count, 120);
        assert_eq!(samsung.es_count, 90);
        // rank 0 + rank 1 across two lists ties both orgs; both present
        assert!(merged.iter().all(|r| r.total_rrf > 0.0));
    }

    #[test]
    fn test_ranking_merge_single_source_order() {
        let sql = vec![row("A", 10), row("B", 5), row("C", 1)];
        let merged = rrf_merge_rankings(&sql, &[], &[], 60);
        let orgs: Vec<&str> = merged.iter().map(|r| r.org.as_str()).collect();
        assert_eq!(orgs, vec!["A", "B", "C"]);
    }
}
