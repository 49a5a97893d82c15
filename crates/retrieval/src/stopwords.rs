//! Domain stopwords filtered out of extracted keywords

use std::collections::HashSet;
use std::sync::OnceLock;

const DOMAIN_STOPWORDS: &[&str] = &[
    // generic R&D vocabulary that carries no search signal
    "연구", "개발", "기술", "사업", "과제", "특허", "장비", "시스템", "방법",
    "장치", "제조", "이용", "활용", "관련", "기반", "분야", "기관", "기업",
    "대상", "수행", "결과", "목적", "방안", "현황", "분석", "평가", "관리",
    "지원", "구축", "개선", "적용", "확보", "보유", "제공", "처리", "통합",
    "발생", "발전", "인용", "문헌", "정보", "자료", "데이터", "내용",
    // English fillers that survive tokenization
    "the", "and", "for", "with", "from", "system", "method", "apparatus",
    "device", "using", "based",
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| DOMAIN_STOPWORDS.iter().copied().collect())
}

pub fn is_stopword(word: &str) -> bool {
    stopword_set().contains(word.to_lowercase().as_str()) || stopword_set().contains(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords() {
        assert!(is_stopword("연구"));
        assert!(is_stopword("system"));
        assert!(is_stopword("System"));
        assert!(!is_stopword("수소연료전지"));
        assert!(!is_stopword("PEMFC"));
    }
}
