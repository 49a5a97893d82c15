//! Bidirectional synonym dictionary
//!
//! File format: UTF-8 text, one comma-separated synonym group per line,
//! lines beginning with `#` are comments, empty tokens are skipped. Every
//! term of a group maps to the full group, so expansion is direction-free.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct SynonymDictionary {
    /// lowercased term -> full synonym group (original casing preserved)
    map: HashMap<String, BTreeSet<String>>,
}

impl SynonymDictionary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the dictionary; a missing file yields an empty dictionary
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("synonym dictionary not loaded ({}): {e}", path.display());
                return Self::default();
            }
        };
        let dictionary = Self::parse(&content);
        info!(
            "synonym dictionary loaded: {} terms from {}",
            dictionary.map.len(),
            path.display()
        );
        dictionary
    }

    pub fn parse(content: &str) -> Self {
        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let terms: Vec<&str> = line
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if terms.len() < 2 {
                continue;
            }

            let group: BTreeSet<String> = terms.iter().map(|t| t.to_string()).collect();
            for term in &terms {
                map.entry(term.to_lowercase())
                    .or_default()
                    .extend(group.iter().cloned());
            }
        }

        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Expand keywords with synonym-group members.
    ///
    /// Exact matches contribute up to `max_per_keyword` members, partial
    /// matches (keyword inside a term or vice versa) up to 2. Originals come
    /// first; duplicates are removed case-insensitively preserving order, so
    /// running the expansion twice yields the same set.
    pub fn expand(&self, keywords: &[String], max_per_keyword: usize) -> Vec<String> {
        if keywords.is_empty() || self.map.is_empty() {
            return keywords.to_vec();
        }

        let mut expanded: Vec<String> = keywords.to_vec();

        for keyword in keywords {
            let keyword_lower = keyword.to_lowercase();

            if let Some(group) = self.map.get(&keyword_lower) {
                let synonyms: Vec<&String> = group
                    .iter()
                    .filter(|term| !term.eq_ignore_ascii_case(keyword))
                    .take(max_per_keyword)
                    .collect();
                expanded.extend(synonyms.into_iter().cloned());
            }

            for (term, group) in &self.map {
                if term != &keyword_lower
                    && (keyword_lower.contains(term.as_str()) || term.contains(&keyword_lower))
                {
                    let partials: Vec<&String> = group
                        .iter()
                        .filter(|t| !t.eq_ignore_ascii_case(keyword))
                        .take(2)
                        .collect();
                    expanded.extend(partials.into_iter().cloned());
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        expanded
            .into_iter()
            .filter(|term| seen.insert(term.to_lowercase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# 기술 동의어
수소연료전지, hydrogen fuel cell, 연료전지, 수소전지
인공지능, AI, 머신러닝
,,,
단독어
";

    #[test]
    fn test_parse_skips_comments_and_short_lines() {
        let dict = SynonymDictionary::parse(SAMPLE);
        // "단독어" and the empty line contribute nothing
        assert!(dict.map.contains_key("수소연료전지"));
        assert!(dict.map.contains_key("ai"));
        assert!(!dict.map.contains_key("단독어"));
    }

    #[test]
    fn test_expand_appends_group_members() {
        let dict = SynonymDictionary::parse(SAMPLE);
        let expanded = dict.expand(&["인공지능".to_string()], 3);
        assert_eq!(expanded[0], "인공지능");
        assert!(expanded.iter().any(|t| t == "AI"));
        assert!(expanded.iter().any(|t| t == "머신러닝"));
    }

    #[test]
    fn test_expand_partial_match() {
        let dict = SynonymDictionary::parse(SAMPLE);
        // "수소연료" is a prefix of the dictionary term "수소연료전지"
        let expanded = dict.expand(&["수소연료".to_string()], 3);
        assert!(expanded.len() > 1);
        assert_eq!(expanded[0], "수소연료");
    }

    #[test]
    fn test_expand_is_idempotent() {
        let dict = SynonymDictionary::parse(SAMPLE);
        let once = dict.expand(&["수소연료전지".to_string(), "인공지능".to_string()], 3);
        let twice = dict.expand(&once, 3);
        let once_set: std::collections::HashSet<String> =
            once.iter().map(|t| t.to_lowercase()).collect();
        let twice_set: std::collections::HashSet<String> =
            twice.iter().map(|t| t.to_lowercase()).collect();
        assert_eq!(once_set, twice_set);
    }

    #[test]
    fn test_empty_dictionary_passthrough() {
        let dict = SynonymDictionary::empty();
        let keywords = vec!["그래핀".to_string()];
        assert_eq!(dict.expand(&keywords, 3), keywords);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dict = SynonymDictionary::load(Path::new("/nonexistent/synonyms.txt"));
        assert!(dict.is_empty());
    }
}
