//! Query analysis node
//!
//! Classifies the user query into a typed plan: rule-based fast paths for
//! greetings and equipment queries, an LLM structured-JSON classification
//! for everything else, followed by deterministic post-processing passes
//! (country scrub, entity-noun scrub, explicit-entity override, subtype
//! regex overrides, ranking complexity). Each pass is a named function so it
//! can be tested on its own.

use crate::prompts::{
    format_prompt, CLASSIFICATION_SYSTEM_PROMPT, QUERY_CLASSIFICATION_PROMPT, REASONING_PREAMBLE,
};
use crate::search_config::resolve_search_config;
use crate::WorkflowContext;
use regex::Regex;
use rndsearch_core::catalog;
use rndsearch_core::{
    MergeStrategy, QuerySubtype, QueryType, RankingType, StructuredKeywords, SubQuery,
    WorkflowState,
};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

// --- rule tables ---

const GREETINGS: &[&str] = &["안녕", "hello", "hi", "반갑", "안녕하세요"];
const HELP_WORDS: &[&str] = &["도움", "help", "사용법", "가이드"];

const EQUIP_NOUNS: &[&str] = &[
    "장비", "측정기", "시험기", "분석기", "시스템", "기기", "스캐너", "현미경",
];
const SEARCH_VERBS: &[&str] = &["보유", "찾", "추천", "검색", "알려", "있는", "가진", "갖고"];

/// Generic purpose-phrase words excluded from the equipment keyword fallback
const PURPOSE_STOPWORDS: &[&str] = &[
    "만들", "어떤", "무슨", "위해", "위한", "활용", "필요", "가능", "사용", "제작",
    "제조", "저희", "해당", "하고자", "진행", "연구개발", "기술개발",
];

const COMPLEX_RANKING_CALC: &[&str] = &[
    "등록률", "비율", "증가율", "점유율", "피인용", "인용수", "성장률", "평균",
];
const COMPLEX_RANKING_AGG: &[&str] = &[
    "연도별", "연간", "추이", "변화", "분포", "현황", "통계",
];

const TREND_KEYWORDS: &[&str] = &[
    "동향", "기술동향", "연구동향", "특허동향", "시장동향", "추이", "출원추이",
    "등록추이", "통계", "현황", "분포", "연도별", "년도별", "연간",
];

const IMPACT_KEYWORDS: &[&str] = &["영향력", "피인용", "citation", "인용"];
const NATIONALITY_KEYWORDS: &[&str] = &["국적별", "자국", "타국", "국내외", "구분해서", "국적으로"];
const EVALP_SCORE_KEYWORDS: &[&str] = &["배점표", "배점", "평가표", "평가항목", "평가기준"];
const EVALP_PREF_KEYWORDS: &[&str] = &["우대", "가점", "우대조건", "감점"];
const COLLABORATION_KEYWORDS: &[&str] = &["협업", "협력", "파트너", "공동연구", "협력기관", "협업기관"];

fn equip_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([가-힣a-zA-Z]+(?:측정기|시험기|분석기|스캐너|현미경|시스템|기기|장비))")
            .expect("static pattern")
    })
}

fn equip_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(측정기|시험기|분석기|스캐너|현미경|시스템|기기|장비)$").expect("static pattern")
    })
}

fn top_n_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)top\s*\d+").expect("static pattern"))
}

fn year_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}년.*\d{4}년").expect("static pattern"))
}

fn josa_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(을|를|이|가|은|는|에|에서|에게|으로|로|와|과|도|만|까지|부터|의)$")
            .expect("static pattern")
    })
}

// --- LLM wire shape ---

#[derive(Debug, Default, Deserialize)]
struct ClassificationResponse {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    query_subtype: Option<String>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    entity_types: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    is_aggregation: bool,
    #[serde(default)]
    is_compound: bool,
    #[serde(default)]
    sub_queries: Vec<SubQueryResponse>,
    #[serde(default)]
    structured_keywords: Option<StructuredKeywords>,
}

#[derive(Debug, Default, Deserialize)]
struct SubQueryResponse {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    entity_types: Vec<String>,
    #[serde(default)]
    depends_on: Option<usize>,
    #[serde(default)]
    priority: i32,
}

/// Analyze the query into a typed plan
pub async fn analyze_query(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let query = state.query.trim().to_string();

    if query.is_empty() {
        state.query_type = QueryType::Simple;
        state.query_intent = "빈 질문".to_string();
        state.push_error("질문이 비어있습니다.");
        state.search_config = resolve_search_config(&state, &ctx.loaders);
        return state;
    }

    if let Some(intent) = check_simple_query(&query) {
        info!("simple fast path: {intent}");
        state.query_type = QueryType::Simple;
        state.query_intent = intent.to_string();
        state.entity_types.clear();
        state.keywords.clear();
        state.search_config = resolve_search_config(&state, &ctx.loaders);
        return state;
    }

    if let Some(equip) = check_equipment_query(&query) {
        info!("equipment fast path: keywords={:?}", equip.keywords);
        state.query_type = QueryType::Sql;
        state.query_subtype = QuerySubtype::List;
        state.query_intent = "장비 검색 또는 보유 기관 조회".to_string();
        state.entity_types = vec!["equip".to_string()];
        state.structured_keywords = StructuredKeywords {
            tech: equip.keywords.clone(),
            region: equip.regions.clone(),
            ..Default::default()
        };
        state.keywords = equip.keywords;
        state.is_equipment_query = true;
        state.search_config = resolve_search_config(&state, &ctx.loaders);
        return state;
    }

    match classify_with_llm(&state, &query, ctx).await {
        Ok(new_state) => new_state,
        Err(e) => {
            warn!("query classification failed: {e}");
            state.query_type = QueryType::Simple;
            state.query_intent = "분류 실패".to_string();
            state.entity_types.clear();
            state.keywords.clear();
            state.push_error(
                crate::error::WorkflowError::QueryAnalysis(e.to_string()).to_string(),
            );
            state.search_config = resolve_search_config(&state, &ctx.loaders);
            state
        }
    }
}

/// Greeting / help pre-classification
fn check_simple_query(query: &str) -> Option<&'static str> {
    let query_lower = query.to_lowercase();
    if GREETINGS.iter().any(|g| query_lower.contains(g)) {
        return Some("인사");
    }
    if HELP_WORDS.iter().any(|h| query_lower.contains(h)) {
        return Some("도움말 요청");
    }
    None
}

struct EquipmentMatch {
    keywords: Vec<String>,
    regions: Vec<String>,
}

/// Equipment-query rule: equipment noun plus a search verb or region
fn check_equipment_query(query: &str) -> Option<EquipmentMatch> {
    let query_lower = query.to_lowercase();
    let regions = catalog::detect_regions(query);

    let has_equip = EQUIP_NOUNS.iter().any(|noun| query_lower.contains(noun));
    let has_action = SEARCH_VERBS.iter().any(|verb| query_lower.contains(verb));
    if !has_equip || !(has_action || !regions.is_empty()) {
        return None;
    }

    let mut keywords = Vec::new();
    for capture in equip_name_regex().find_iter(query) {
        let full_name = capture.as_str().to_string();
        // full device name plus the suffix-stripped core term
        let core = equip_suffix_regex().replace(&full_name, "").to_string();
        if !keywords.contains(&full_name) {
            keywords.push(full_name.clone());
        }
        if core.chars().count() >= 2 && core != full_name && !keywords.contains(&core) {
            debug!("equipment core keyword: {full_name} -> {core}");
            keywords.push(core);
        }
    }

    if keywords.is_empty() {
        // purpose keywords for phrasings like "시제품 제작을 위한 장비"
        for word in query.split_whitespace() {
            let hangul: String = word.chars().filter(|c| ('가'..='힣').contains(c)).collect();
            if hangul.chars().count() < 2 {
                continue;
            }
            let stripped = josa_regex().replace(&hangul, "").to_string();
            if stripped.chars().count() >= 2
                && !EQUIP_NOUNS.contains(&stripped.as_str())
                && !catalog::ENTITY_TYPE_STOPWORDS.contains(&stripped.as_str())
                && !SEARCH_VERBS.iter().any(|verb| stripped.contains(verb))
                && !PURPOSE_STOPWORDS.iter().any(|word| stripped.contains(word))
                && !keywords.contains(&stripped)
            {
                keywords.push(stripped);
                if keywords.len() >= 3 {
                    break;
                }
            }
        }
    }

    Some(EquipmentMatch { keywords, regions })
}

async fn classify_with_llm(
    state: &WorkflowState,
    query: &str,
    ctx: &WorkflowContext,
) -> rndsearch_core::Result<WorkflowState> {
    let prompt = format_prompt(QUERY_CLASSIFICATION_PROMPT, &[("query", query)]);

    let response = if ctx.config.llm.use_reasoning_mode {
        let enhanced = format!("{}{prompt}", REASONING_PREAMBLE.replace("{query}", query));
        let result = ctx
            .llm
            .generate_with_reasoning(&enhanced, CLASSIFICATION_SYSTEM_PROMPT, 2000)
            .await?;
        if let Some(thinking) = &result.thinking {
            debug!("classification reasoning: {} chars", thinking.len());
        }
        result.answer
    } else {
        ctx.llm
            .generate(&prompt, Some(CLASSIFICATION_SYSTEM_PROMPT), 500, 0.3)
            .await?
    };

    let parsed = parse_classification_response(&response);
    Ok(apply_post_passes(state.clone(), query, parsed, ctx))
}

/// Three-stage parse: direct JSON -> brace-matched substring -> field regex
fn parse_classification_response(response: &str) -> ClassificationResponse {
    let cleaned = response
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    if let Ok(parsed) = serde_json::from_str::<ClassificationResponse>(&cleaned) {
        return parsed;
    }

    if let Some(candidate) = extract_braced_json(&cleaned) {
        if let Ok(parsed) = serde_json::from_str::<ClassificationResponse>(&candidate) {
            return parsed;
        }
    }

    // last resort: pull individual fields out with regexes
    let mut fallback = ClassificationResponse::default();
    let field = |name: &str| -> Option<String> {
        Regex::new(&format!(r#""{name}"\s*:\s*"([^"]+)""#))
            .ok()?
            .captures(&cleaned)
            .map(|c| c[1].to_string())
    };
    fallback.query_type = field("query_type");
    fallback.query_subtype = field("query_subtype");
    fallback.intent = field("intent");
    if let Some(captures) = Regex::new(r#""keywords"\s*:\s*\[([^\]]*)\]"#)
        .ok()
        .and_then(|re| re.captures(&cleaned))
    {
        fallback.keywords = Regex::new(r#""([^"]+)""#)
            .map(|re| {
                re.captures_iter(&captures[1])
                    .map(|c| c[1].to_string())
                    .collect()
            })
            .unwrap_or_default();
    }
    fallback
}

/// Outermost balanced `{ ... }` block
fn extract_braced_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Deterministic post-processing over the LLM output
fn apply_post_passes(
    mut state: WorkflowState,
    query: &str,
    parsed: ClassificationResponse,
    ctx: &WorkflowContext,
) -> WorkflowState {
    let query_lower = query.to_lowercase();
    let initial_entity_types = state.entity_types.clone();

    state.query_type = QueryType::parse(parsed.query_type.as_deref().unwrap_or("rag"));
    state.query_subtype = QuerySubtype::parse(parsed.query_subtype.as_deref().unwrap_or("list"));
    state.query_intent = parsed.intent.unwrap_or_default();
    state.is_aggregation = parsed.is_aggregation;
    state.is_compound = parsed.is_compound;
    state.keywords = parsed.keywords;
    // the LLM's entity guess is a starting point; the override pass and the
    // scout have the final say
    state.entity_types = parsed.entity_types;
    state.structured_keywords = parsed.structured_keywords.unwrap_or_default();
    state.sub_queries = parsed
        .sub_queries
        .into_iter()
        .map(|sq| SubQuery {
            intent: sq.intent,
            subtype: QuerySubtype::parse(sq.subtype.as_deref().unwrap_or("list")),
            query_type: None,
            keywords: sq.keywords,
            entity_types: sq.entity_types,
            depends_on: sq.depends_on,
            priority: sq.priority,
            context: None,
        })
        .collect();

    apply_subtype_overrides(&mut state, &query_lower);
    classify_ranking_type(&mut state, query);
    detect_special_rankings(&mut state, &query_lower);
    detect_evalp_subtypes(&mut state, &query_lower);
    sync_aggregation_flag(&mut state);
    scrub_country_keywords(&mut state, query);
    scrub_entity_type_keywords(&mut state);
    apply_entity_override(&mut state, &query_lower, &initial_entity_types);
    sync_compound(&mut state);

    info!(
        "analysis: type={:?}, subtype={:?}, ranking={:?}, compound={}, keywords={:?}, entities={:?}",
        state.query_type,
        state.query_subtype,
        state.ranking_type,
        state.is_compound,
        state.keywords,
        state.entity_types
    );

    state.search_config = resolve_search_config(&state, &ctx.loaders);
    state
}

/// Trend / crosstab / TOP-N subtype overrides from the raw query
fn apply_subtype_overrides(state: &mut WorkflowState, query_lower: &str) {
    let has_top_n = top_n_regex().is_match(query_lower)
        || query_lower.contains("상위")
        || query_lower.contains("주요");
    let has_applicant = ["출원기관", "권리자", "출원인", "기관별"]
        .iter()
        .any(|kw| query_lower.contains(kw));
    let has_yearly = ["연도별", "년도별", "연간", "추이", "현황"]
        .iter()
        .any(|kw| query_lower.contains(kw));

    if has_top_n && has_applicant && has_yearly {
        debug!("crosstab pattern (TOP + applicant + yearly)");
        state.query_subtype = QuerySubtype::CrosstabAnalysis;
        state.query_type = QueryType::Sql;
        return;
    }

    if has_top_n && has_applicant {
        debug!("ranking pattern (TOP + applicant, no yearly)");
        state.query_subtype = QuerySubtype::Ranking;
        state.query_type = QueryType::Sql;
        return;
    }

    if TREND_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        debug!("trend keyword detected");
        state.query_subtype = QuerySubtype::TrendAnalysis;
        state.query_type = QueryType::Sql;
        return;
    }

    if top_n_regex().is_match(query_lower)
        && !matches!(
            state.query_subtype,
            QuerySubtype::Ranking | QuerySubtype::TrendAnalysis | QuerySubtype::CrosstabAnalysis
        )
    {
        debug!("TOP N pattern forces ranking");
        state.query_subtype = QuerySubtype::Ranking;
    }
}

/// Simple vs. complex ranking
fn classify_ranking_type(state: &mut WorkflowState, query: &str) {
    if state.query_subtype != QuerySubtype::Ranking {
        return;
    }

    let calc = COMPLEX_RANKING_CALC.iter().any(|kw| query.contains(kw));
    let agg = COMPLEX_RANKING_AGG.iter().any(|kw| query.contains(kw));
    let year_range = year_range_regex().is_match(query);
    let multi_country = state.structured_keywords.country.len() >= 2;
    let multi_filter = state.structured_keywords.filter.len() >= 2;

    if calc || agg || year_range || multi_country || multi_filter {
        debug!("complex ranking (calc={calc}, agg={agg}, range={year_range})");
        state.ranking_type = RankingType::Complex;
        state.query_type = QueryType::Hybrid;
    } else {
        state.ranking_type = RankingType::Simple;
        state.query_type = QueryType::Rag;
    }
}

/// Impact and nationality ranking detection
fn detect_special_rankings(state: &mut WorkflowState, query_lower: &str) {
    let has_top_n = top_n_regex().is_match(query_lower);
    if has_top_n && IMPACT_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        debug!("impact ranking detected");
        state.query_subtype = QuerySubtype::ImpactRanking;
        state.query_type = QueryType::Sql;
    }
    if NATIONALITY_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        debug!("nationality ranking detected");
        state.query_subtype = QuerySubtype::NationalityRanking;
        state.query_type = QueryType::Sql;
    }
}

/// Evaluation scoring / advantage condition detection
fn detect_evalp_subtypes(state: &mut WorkflowState, query_lower: &str) {
    if EVALP_SCORE_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        if !matches!(
            state.query_subtype,
            QuerySubtype::EvalpScore | QuerySubtype::EvalpPref
        ) {
            state.query_subtype = QuerySubtype::EvalpScore;
        }
        if !state.entity_types.iter().any(|e| e == "evalp") {
            state.entity_types.insert(0, "evalp".to_string());
        }
        state.query_type = QueryType::Sql;
    } else if EVALP_PREF_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        if !matches!(
            state.query_subtype,
            QuerySubtype::EvalpScore | QuerySubtype::EvalpPref
        ) {
            state.query_subtype = QuerySubtype::EvalpPref;
        }
        state.entity_types.retain(|e| e != "evalp");
        if !state.entity_types.iter().any(|e| e == "evalp_pref") {
            state.entity_types.insert(0, "evalp_pref".to_string());
        }
        state.query_type = QueryType::Sql;
    }
}

fn sync_aggregation_flag(state: &mut WorkflowState) {
    if state.query_subtype.is_statistical() {
        state.is_aggregation = true;
    }
}

/// Country tokens leave the keyword list; only codes survive in the
/// structured bucket
fn scrub_country_keywords(state: &mut WorkflowState, query: &str) {
    if state.structured_keywords.country.is_empty() {
        if let Some(code) = catalog::detect_country_code(query) {
            debug!("country fallback from raw query: {code}");
            state.structured_keywords.country = vec![code.to_string()];
        }
    }

    let country_tokens = catalog::all_country_tokens();
    let before = state.keywords.len();
    state
        .keywords
        .retain(|kw| !country_tokens.contains(&kw.as_str()));
    if state.keywords.len() < before {
        debug!("country tokens scrubbed from keywords");
    }
}

/// Entity-type nouns are never search keywords
fn scrub_entity_type_keywords(state: &mut WorkflowState) {
    state
        .keywords
        .retain(|kw| !catalog::ENTITY_TYPE_STOPWORDS.contains(&kw.as_str()));
}

/// Explicit entity nouns in the raw query override the LLM's entity types;
/// two or more explicit entities promote the query to compound
fn apply_entity_override(
    state: &mut WorkflowState,
    query_lower: &str,
    initial_entity_types: &[String],
) {
    if matches!(
        state.query_subtype,
        QuerySubtype::EvalpScore | QuerySubtype::EvalpPref
    ) {
        return;
    }

    if COLLABORATION_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        // collaboration recommendations let the scout decide the domains
        debug!("collaboration cue: deferring entity types to the scout");
        state.entity_types.clear();
        return;
    }

    let mut explicit: Vec<String> = Vec::new();
    for (entity, nouns) in catalog::EXPLICIT_ENTITY_KEYWORDS {
        if nouns.iter().any(|noun| query_lower.contains(&noun.to_lowercase())) {
            explicit.push(entity.to_string());
        }
    }

    if !explicit.is_empty() {
        debug!("explicit entities: {explicit:?}");
        state.entity_types = explicit.clone();

        if explicit.len() >= 2 && state.sub_queries.is_empty() {
            state.sub_queries = explicit
                .iter()
                .map(|entity| SubQuery {
                    intent: format!("{} 검색", catalog::entity_label(entity)),
                    subtype: QuerySubtype::List,
                    query_type: None,
                    keywords: state.keywords.clone(),
                    entity_types: vec![entity.clone()],
                    depends_on: None,
                    priority: 0,
                    context: None,
                })
                .collect();
            state.is_compound = true;
            debug!("synthesized {} sub-queries from explicit entities", explicit.len());
        }
    } else if !initial_entity_types.is_empty() {
        // caller-provided entity types survive when nothing explicit appears
        state.entity_types = initial_entity_types.to_vec();
    } else {
        // leave empty; the scout decides from actual data
        state.entity_types.clear();
    }
}

fn sync_compound(state: &mut WorkflowState) {
    if state.is_compound && !state.sub_queries.is_empty() {
        state.query_subtype = QuerySubtype::Compound;
        state.merge_strategy = MergeStrategy::Parallel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_core::Level;

    fn base_state(query: &str) -> WorkflowState {
        WorkflowState::new(query, "test", Level::L3, None)
    }

    fn passes(query: &str, parsed: ClassificationResponse) -> WorkflowState {
        let ctx = crate::test_support::test_context();
        apply_post_passes(base_state(query), query, parsed, &ctx)
    }

    #[test]
    fn test_greeting_fast_path_detection() {
        assert_eq!(check_simple_query("안녕하세요"), Some("인사"));
        assert_eq!(check_simple_query("hello there"), Some("인사"));
        assert_eq!(check_simple_query("사용법 알려줘"), Some("도움말 요청"));
        assert_eq!(check_simple_query("수소연료전지 특허"), None);
    }

    #[test]
    fn test_equipment_fast_path_strips_suffix() {
        let matched = check_equipment_query("표면단차측정기 보유 기관").unwrap();
        assert!(matched.keywords.contains(&"표면단차측정기".to_string()));
        assert!(matched.keywords.contains(&"표면단차".to_string()));
    }

    #[test]
    fn test_equipment_fast_path_region_only() {
        let matched = check_equipment_query("경기 지역 광탄성시험기").unwrap();
        assert!(matched.keywords.contains(&"광탄성시험기".to_string()));
        assert!(matched.keywords.contains(&"광탄성".to_string()));
        assert_eq!(matched.regions, vec!["경기"]);
    }

    #[test]
    fn test_equipment_purpose_fallback() {
        let matched =
            check_equipment_query("시제품을 만들려면 어떤 장비가 있는지 알려줘").unwrap();
        assert!(matched.keywords.contains(&"시제품".to_string()));
        assert!(!matched.keywords.iter().any(|k| k.contains("만들")));
    }

    #[test]
    fn test_non_equipment_query_passes_through() {
        assert!(check_equipment_query("수소연료전지 특허 알려줘").is_none());
    }

    #[test]
    fn test_parse_direct_json() {
        let parsed = parse_classification_response(
            r#"{"query_type": "sql", "query_subtype": "ranking", "keywords": ["AI"]}"#,
        );
        assert_eq!(parsed.query_type.as_deref(), Some("sql"));
        assert_eq!(parsed.keywords, vec!["AI"]);
    }

    #[test]
    fn test_parse_fenced_and_surrounded_json() {
        let parsed = parse_classification_response(
            "분석 결과입니다:\n```json\n{\"query_type\": \"rag\", \"keywords\": [\"그래핀\"]}\n```\n이상입니다.",
        );
        assert_eq!(parsed.query_type.as_deref(), Some("rag"));
        assert_eq!(parsed.keywords, vec!["그래핀"]);
    }

    #[test]
    fn test_parse_field_regex_fallback() {
        let parsed = parse_classification_response(
            "\"query_type\": \"hybrid\" 그리고 \"keywords\": [\"반도체\", \"공정\"] (JSON 아님",
        );
        assert_eq!(parsed.query_type.as_deref(), Some("hybrid"));
        assert_eq!(parsed.keywords, vec!["반도체", "공정"]);
    }

    #[test]
    fn test_country_scrub_invariant() {
        let query = "미국 수소연료전지 특허";
        let state = passes(
            query,
            ClassificationResponse {
                query_type: Some("sql".into()),
                keywords: vec!["미국".into(), "수소연료전지".into()],
                ..Default::default()
            },
        );
        // invariant: no country token survives in keywords
        for token in catalog::all_country_tokens() {
            assert!(!state.keywords.iter().any(|k| k == token));
        }
        assert_eq!(state.structured_keywords.country, vec!["US"]);
        assert!(state.keywords.contains(&"수소연료전지".to_string()));
    }

    #[test]
    fn test_entity_noun_scrub_invariant() {
        let state = passes(
            "수소연료전지 특허 알려줘",
            ClassificationResponse {
                query_type: Some("sql".into()),
                keywords: vec!["특허".into(), "수소연료전지".into(), "목록".into()],
                ..Default::default()
            },
        );
        for noun in catalog::ENTITY_TYPE_STOPWORDS {
            assert!(!state.keywords.iter().any(|k| k == noun));
        }
        assert_eq!(state.keywords, vec!["수소연료전지"]);
    }

    #[test]
    fn test_trend_override() {
        let state = passes(
            "딥러닝 연구 동향",
            ClassificationResponse {
                query_type: Some("rag".into()),
                query_subtype: Some("concept".into()),
                keywords: vec!["딥러닝".into()],
                ..Default::default()
            },
        );
        assert_eq!(state.query_subtype, QuerySubtype::TrendAnalysis);
        assert_eq!(state.query_type, QueryType::Sql);
        assert!(state.is_aggregation);
    }

    #[test]
    fn test_crosstab_override_needs_all_three_cues() {
        let state = passes(
            "한국 특허 출원기관 TOP 5 연도별 현황 최근 5년",
            ClassificationResponse {
                query_type: Some("sql".into()),
                query_subtype: Some("ranking".into()),
                keywords: vec![],
                ..Default::default()
            },
        );
        assert_eq!(state.query_subtype, QuerySubtype::CrosstabAnalysis);
        assert_eq!(state.structured_keywords.country, vec!["KR"]);

        // without the yearly cue the same pattern is a ranking
        let state = passes(
            "수소연료전지 특허 TOP 10 출원기관",
            ClassificationResponse {
                query_type: Some("sql".into()),
                query_subtype: Some("list".into()),
                keywords: vec!["수소연료전지".into()],
                ..Default::default()
            },
        );
        assert_eq!(state.query_subtype, QuerySubtype::Ranking);
    }

    #[test]
    fn test_ranking_complexity_classifier() {
        // plain TOP N -> simple, routed to rag
        let state = passes(
            "수소연료전지 특허 TOP 10 출원기관",
            ClassificationResponse {
                query_type: Some("sql".into()),
                query_subtype: Some("ranking".into()),
                keywords: vec!["수소연료전지".into()],
                ..Default::default()
            },
        );
        assert_eq!(state.ranking_type, RankingType::Simple);
        assert_eq!(state.query_type, QueryType::Rag);

        // calculation cue -> complex, routed to hybrid
        let state = passes(
            "수소연료전지 특허 등록률 TOP 10 기관",
            ClassificationResponse {
                query_type: Some("sql".into()),
                query_subtype: Some("ranking".into()),
                keywords: vec!["수소연료전지".into()],
                ..Default::default()
            },
        );
        assert_eq!(state.ranking_type, RankingType::Complex);
        assert_eq!(state.query_type, QueryType::Hybrid);
    }

    #[test]
    fn test_impact_and_nationality_detection() {
        let state = passes(
            "피인용 기준 특허 영향력 TOP 10 기관",
            ClassificationResponse {
                query_subtype: Some("ranking".into()),
                ..Default::default()
            },
        );
        assert_eq!(state.query_subtype, QuerySubtype::ImpactRanking);

        let state = passes(
            "자국과 타국 구분해서 출원 순위",
            ClassificationResponse {
                query_subtype: Some("ranking".into()),
                ..Default::default()
            },
        );
        assert_eq!(state.query_subtype, QuerySubtype::NationalityRanking);
    }

    #[test]
    fn test_explicit_entity_override_synthesizes_sub_queries() {
        let state = passes(
            "AI 특허와 연구과제",
            ClassificationResponse {
                query_type: Some("hybrid".into()),
                keywords: vec!["AI".into()],
                is_compound: true,
                ..Default::default()
            },
        );
        assert!(state.is_compound);
        assert_eq!(state.query_subtype, QuerySubtype::Compound);
        assert_eq!(state.entity_types, vec!["patent", "project"]);
        assert_eq!(state.sub_queries.len(), 2);
        assert_eq!(state.sub_queries[0].entity_types, vec!["patent"]);
        assert_eq!(state.sub_queries[1].entity_types, vec!["project"]);
        assert_eq!(state.sub_queries[0].keywords, vec!["AI"]);
    }

    #[test]
    fn test_evalp_detection() {
        let state = passes(
            "기술혁신개발사업 평가표 알려줘",
            ClassificationResponse::default(),
        );
        assert_eq!(state.query_subtype, QuerySubtype::EvalpScore);
        assert_eq!(state.entity_types[0], "evalp");

        let state = passes("우대 조건이 있는 공고", ClassificationResponse::default());
        assert_eq!(state.query_subtype, QuerySubtype::EvalpPref);
        assert_eq!(state.entity_types[0], "evalp_pref");
    }
}
