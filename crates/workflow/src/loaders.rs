//! Loader registry
//!
//! A loader is a precompiled, non-LLM SQL-generation strategy for
//! ranking/evalp-style subtypes. The resolver only selects a loader that
//! actually exists here; anything else falls through to the SQL executor.

use crate::templates;
use rndsearch_core::WorkflowState;
use tracing::debug;

/// One SQL statement produced by a loader, labeled for the merger
#[derive(Debug, Clone)]
pub struct LoaderQuery {
    pub entity: String,
    pub label: String,
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderRegistry {
    names: Vec<&'static str>,
}

impl LoaderRegistry {
    pub fn with_builtins() -> Self {
        Self {
            names: vec![
                "RankingLoader",
                "ScoringLoader",
                "AdvantageLoader",
                "CollaborationLoader",
            ],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.contains(&name)
    }

    /// Generate the loader's SQL for the analyzed state, or None when the
    /// loader is unknown
    pub fn generate(&self, name: &str, state: &WorkflowState) -> Option<Vec<LoaderQuery>> {
        if !self.exists(name) {
            return None;
        }

        let keywords = state.all_keywords();
        let country_clause = state
            .structured_keywords
            .country
            .first()
            .and_then(|code| rndsearch_core::catalog::country_filter_clause(code, "p"));

        let queries = match name {
            "RankingLoader" => vec![LoaderQuery {
                entity: "patent".to_string(),
                label: "특허 출원기관 순위".to_string(),
                sql: templates::patent_ranking_sql(&keywords, country_clause.as_deref()),
            }],
            "ScoringLoader" => vec![LoaderQuery {
                entity: "evalp".to_string(),
                label: "평가표 배점".to_string(),
                sql: templates::evalp_score_sql(&keywords),
            }],
            "AdvantageLoader" => vec![LoaderQuery {
                entity: "evalp_pref".to_string(),
                label: "우대/감점 조건".to_string(),
                sql: templates::evalp_pref_sql(&keywords),
            }],
            "CollaborationLoader" => vec![
                LoaderQuery {
                    entity: "proposal".to_string(),
                    label: "과제 수행기관".to_string(),
                    sql: templates::proposal_orgs_sql(&keywords),
                },
                LoaderQuery {
                    entity: "patent".to_string(),
                    label: "특허 보유기관".to_string(),
                    sql: templates::patent_orgs_sql(&keywords),
                },
            ],
            _ => return None,
        };

        debug!("loader {name}: {} queries", queries.len());
        Some(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_core::Level;

    #[test]
    fn test_builtin_names() {
        let registry = LoaderRegistry::with_builtins();
        assert!(registry.exists("RankingLoader"));
        assert!(registry.exists("CollaborationLoader"));
        assert!(!registry.exists("NopeLoader"));
        assert!(!LoaderRegistry::empty().exists("RankingLoader"));
    }

    #[test]
    fn test_collaboration_loader_emits_two_queries() {
        let registry = LoaderRegistry::with_builtins();
        let mut state = WorkflowState::new("협업 기관 추천", "s", Level::L3, None);
        state.keywords = vec!["인공지능".to_string()];

        let queries = registry.generate("CollaborationLoader", &state).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].entity, "proposal");
        assert_eq!(queries[1].entity, "patent");
        for query in &queries {
            assert!(query.sql.contains("인공지능"));
        }
    }

    #[test]
    fn test_ranking_loader_applies_country_filter() {
        let registry = LoaderRegistry::with_builtins();
        let mut state = WorkflowState::new("q", "s", Level::L3, None);
        state.keywords = vec!["반도체".to_string()];
        state.structured_keywords.country = vec!["KR".to_string()];

        let queries = registry.generate("RankingLoader", &state).unwrap();
        assert!(queries[0].sql.contains("p.ntcd = 'KR'"));
    }
}
