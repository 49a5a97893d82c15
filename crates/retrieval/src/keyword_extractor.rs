//! Vector-search-based keyword expansion
//!
//! Candidate keywords are noun-like tokens extracted from search payloads,
//! filtered by frequency, verified against the payloads that produced them,
//! and optionally reviewed by the LLM. Original compound keywords are never
//! split: a candidate that is a strict substring of an original is dropped.

use crate::stopwords::is_stopword;
use regex::Regex;
use rndsearch_llm::LlmApi;
use rndsearch_storage::VectorHit;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Review prompt for the LLM keyword filter
const KEYWORD_REVIEW_PROMPT: &str = "사용자 질문: {query}
원본 키워드: {llm_keywords}
벡터 확장 후보: {vector_keywords}

위 벡터 확장 후보 중 검색에 유용한 관련 키워드를 선택하세요.

## 반드시 포함
- 동의어/유사어: \"수소연료\" → \"연료전지\", \"수소연료전지\"
- 상위/하위 개념: \"AI\" → \"인공지능\", \"머신러닝\"
- 영문/한글 변환: \"fuel cell\" ↔ \"연료전지\"

## 제외 기준
- 원본 키워드의 단순 분해 (예: \"수소연료전지\" → \"수소\", \"전지\")
- 무관한 일반어, 너무 범용적인 단어

## 출력 형식
JSON 배열로만 출력:
[\"키워드1\", \"키워드2\"]
";

/// Result of one extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordExtraction {
    pub original_keywords: Vec<String>,
    pub expanded_keywords: Vec<String>,
    pub final_keywords: Vec<String>,
    pub source_doc_count: usize,
    pub extraction_time_ms: f64,
}

/// Hard cap on expansion keywords regardless of caller configuration
const MAX_EXPANDED_CAP: usize = 3;

/// Minimum token length in characters
const MIN_WORD_CHARS: usize = 2;

fn particle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(에서|에게|으로|까지|부터|을|를|이|가|은|는|에|로|와|과|도|만|의)$")
            .expect("static pattern")
    })
}

/// Strip a trailing Korean particle when enough of the word survives
fn strip_particle(word: &str) -> &str {
    if let Some(matched) = particle_regex().find(word) {
        let stem = &word[..matched.start()];
        if stem.chars().count() >= 2 && word.chars().count() >= 3 {
            return stem;
        }
    }
    word
}

#[derive(Debug, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Noun-like token extraction: unicode word segmentation, particle
    /// stripping, length and stopword filtering. The contract is
    /// frequency-over-payloads, not any particular morphological analyzer.
    pub fn extract_nouns(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(strip_particle)
            .filter(|word| word.chars().count() >= MIN_WORD_CHARS)
            .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
            .filter(|word| !is_stopword(word))
            .map(str::to_string)
            .collect()
    }

    /// Frequency-filtered candidates from vector-search payloads
    pub fn extract_from_hits(
        &self,
        hits_by_collection: &HashMap<String, Vec<VectorHit>>,
        min_frequency: usize,
        max_keywords: usize,
    ) -> Vec<String> {
        let start = Instant::now();
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut doc_count = 0usize;

        for hits in hits_by_collection.values() {
            for hit in hits {
                let text = hit.payload_text();
                if text.is_empty() {
                    continue;
                }
                doc_count += 1;
                for noun in self.extract_nouns(&text) {
                    *counts.entry(noun).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let expanded: Vec<String> = ranked
            .into_iter()
            .filter(|(_, count)| *count >= min_frequency)
            .take(max_keywords)
            .map(|(word, _)| word)
            .collect();

        debug!(
            "keyword candidates: {} docs analysed, {} kept, {:.1}ms",
            doc_count,
            expanded.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        expanded
    }

    /// Does the keyword appear as a substring in at least one payload?
    fn appears_in_payloads(
        keyword: &str,
        hits_by_collection: &HashMap<String, Vec<VectorHit>>,
    ) -> bool {
        let keyword_lower = keyword.to_lowercase();
        hits_by_collection.values().flatten().any(|hit| {
            hit.payload_text().to_lowercase().contains(&keyword_lower)
        })
    }

    /// Merge originals with candidates, preserving compound keywords: any
    /// candidate that is a strict substring of an original is a decomposition
    /// of it and gets dropped.
    pub fn merge_keywords(llm_keywords: &[String], vector_keywords: &[String]) -> Vec<String> {
        let mut result: Vec<String> = llm_keywords.to_vec();
        let llm_lower: Vec<String> = llm_keywords.iter().map(|k| k.to_lowercase()).collect();

        for candidate in vector_keywords {
            let candidate_lower = candidate.to_lowercase();
            if llm_lower.contains(&candidate_lower) {
                continue;
            }
            let is_component = llm_lower.iter().any(|original| {
                original.contains(&candidate_lower) && candidate_lower.len() < original.len()
            });
            if is_component {
                debug!("compound split dropped: '{candidate}'");
                continue;
            }
            result.push(candidate.clone());
        }

        result
    }

    /// LLM review over candidates; falls back to the rule-based merge on any
    /// failure. Originals always survive.
    pub async fn review_with_llm(
        &self,
        llm: &dyn LlmApi,
        query: &str,
        llm_keywords: &[String],
        vector_keywords: &[String],
    ) -> Vec<String> {
        if vector_keywords.is_empty() {
            return llm_keywords.to_vec();
        }

        let prompt = KEYWORD_REVIEW_PROMPT
            .replace("{query}", query)
            .replace("{llm_keywords}", &format!("{llm_keywords:?}"))
            .replace("{vector_keywords}", &format!("{vector_keywords:?}"));

        let selected = match llm.generate(&prompt, None, 256, 0.0).await {
            Ok(response) => match parse_json_array(&response) {
                Some(selected) => selected,
                None => {
                    warn!("keyword review returned no JSON array, using rule-based merge");
                    return Self::merge_keywords(llm_keywords, vector_keywords);
                }
            },
            Err(e) => {
                warn!("keyword review failed ({e}), using rule-based merge");
                return Self::merge_keywords(llm_keywords, vector_keywords);
            }
        };

        // the reviewer only filters candidates; the merge still enforces
        // compound preservation over its output
        let reviewed: Vec<String> = selected
            .into_iter()
            .filter(|kw| vector_keywords.iter().any(|v| v.eq_ignore_ascii_case(kw)))
            .collect();
        Self::merge_keywords(llm_keywords, &reviewed)
    }

    /// Full pipeline: frequency candidates -> payload verification ->
    /// (LLM review | rule-based merge)
    pub async fn extract_and_merge(
        &self,
        llm: Option<&dyn LlmApi>,
        query: &str,
        llm_keywords: &[String],
        hits_by_collection: &HashMap<String, Vec<VectorHit>>,
        min_frequency: usize,
        max_expanded: usize,
    ) -> KeywordExtraction {
        let start = Instant::now();
        let max_expanded = max_expanded.min(MAX_EXPANDED_CAP);

        let candidates =
            self.extract_from_hits(hits_by_collection, min_frequency, max_expanded);

        let verified: Vec<String> = candidates
            .into_iter()
            .filter(|kw| {
                let ok = Self::appears_in_payloads(kw, hits_by_collection);
                if !ok {
                    debug!("payload verification dropped '{kw}'");
                }
                ok
            })
            .collect();

        let final_keywords = match llm {
            Some(llm) => {
                self.review_with_llm(llm, query, llm_keywords, &verified)
                    .await
            }
            None => Self::merge_keywords(llm_keywords, &verified),
        };

        let source_doc_count = hits_by_collection.values().map(Vec::len).sum();
        let extraction_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            "keyword extraction: original={llm_keywords:?}, expanded={verified:?}, final={final_keywords:?}"
        );

        KeywordExtraction {
            original_keywords: llm_keywords.to_vec(),
            expanded_keywords: verified,
            final_keywords,
            source_doc_count,
            extraction_time_ms,
        }
    }
}

/// First JSON array in the response, if any
fn parse_json_array(response: &str) -> Option<Vec<String>> {
    let start = response.find('[')?;
    let end = response[start..].find(']')? + start;
    serde_json::from_str(&response[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_storage::mock::vector_hit;

    fn hits(texts: &[&str]) -> HashMap<String, Vec<VectorHit>> {
        let hits = texts
            .iter()
            .enumerate()
            .map(|(i, text)| vector_hit(&i.to_string(), 0.9, &[("text", text)]))
            .collect();
        HashMap::from([("patents_v3_collection".to_string(), hits)])
    }

    #[test]
    fn test_extract_nouns_strips_particles_and_stopwords() {
        let extractor = KeywordExtractor::new();
        let nouns = extractor.extract_nouns("수소연료전지를 연구 PEMFC 스택과 12");
        assert!(nouns.contains(&"수소연료전지".to_string()));
        assert!(nouns.contains(&"PEMFC".to_string()));
        assert!(nouns.contains(&"스택".to_string()));
        // "연구" is a stopword, "12" is numeric
        assert!(!nouns.contains(&"연구".to_string()));
        assert!(!nouns.iter().any(|n| n == "12"));
    }

    #[test]
    fn test_frequency_floor() {
        let extractor = KeywordExtractor::new();
        let mut texts = vec!["막전극접합체 스택"; 5];
        texts.push("그래핀");
        let candidates = extractor.extract_from_hits(&hits(&texts), 5, 3);
        assert!(candidates.contains(&"막전극접합체".to_string()));
        assert!(!candidates.contains(&"그래핀".to_string()));
    }

    #[test]
    fn test_merge_preserves_compounds() {
        let originals = vec!["수소연료전지".to_string()];
        let candidates = vec![
            "수소".to_string(),    // strict substring -> dropped
            "전지".to_string(),    // strict substring -> dropped
            "PEMFC".to_string(),   // kept
        ];
        let merged = KeywordExtractor::merge_keywords(&originals, &candidates);
        assert_eq!(merged, vec!["수소연료전지", "PEMFC"]);
    }

    /// Compound-preservation law: no output keyword is a strict substring of
    /// any original keyword
    #[test]
    fn test_compound_preservation_law() {
        let originals = vec!["수질예측".to_string(), "AI".to_string()];
        let candidates = vec![
            "수질".to_string(),
            "예측".to_string(),
            "인공지능".to_string(),
            "a".to_string(),
        ];
        let merged = KeywordExtractor::merge_keywords(&originals, &candidates);
        for kw in &merged {
            if originals.contains(kw) {
                continue;
            }
            for original in &originals {
                let is_strict_substring = original.to_lowercase().contains(&kw.to_lowercase())
                    && kw.len() < original.len();
                assert!(!is_strict_substring, "'{kw}' splits '{original}'");
            }
        }
    }

    #[tokio::test]
    async fn test_payload_verification_law() {
        let extractor = KeywordExtractor::new();
        let payload_hits = hits(&["막전극접합체 스택", "막전극접합체 스택", "막전극접합체 스택"]);
        let extraction = extractor
            .extract_and_merge(None, "연료전지", &["연료전지".to_string()], &payload_hits, 3, 3)
            .await;
        // every expanded keyword must appear in at least one payload
        for kw in &extraction.expanded_keywords {
            let found = payload_hits
                .values()
                .flatten()
                .any(|h| h.payload_text().contains(kw.as_str()));
            assert!(found, "'{kw}' not found in any payload");
        }
    }

    #[tokio::test]
    async fn test_llm_review_filters_candidates() {
        use rndsearch_llm::MockLlm;
        let extractor = KeywordExtractor::new();
        let llm = MockLlm::new(vec![r#"["PEMFC"]"#]);
        let reviewed = extractor
            .review_with_llm(
                &llm,
                "수소연료전지",
                &["수소연료전지".to_string()],
                &["PEMFC".to_string(), "발전".to_string()],
            )
            .await;
        assert_eq!(reviewed, vec!["수소연료전지", "PEMFC"]);
    }

    #[tokio::test]
    async fn test_llm_review_failure_falls_back() {
        use rndsearch_llm::MockLlm;
        let extractor = KeywordExtractor::new();
        let llm = MockLlm::failing();
        let reviewed = extractor
            .review_with_llm(
                &llm,
                "q",
                &["원본".to_string()],
                &["후보키워드".to_string()],
            )
            .await;
        assert_eq!(reviewed, vec!["원본", "후보키워드"]);
    }

    #[test]
    fn test_parse_json_array() {
        assert_eq!(
            parse_json_array("선택: [\"a\", \"b\"] 끝"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(parse_json_array("없음"), None);
    }
}
