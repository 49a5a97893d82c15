//! Prompt templates
//!
//! Simple `{placeholder}` substitution, no templating engine.

/// Replace `{key}` placeholders in order
pub fn format_prompt(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Query classification prompt. The output contract is a single JSON object;
/// the analyzer parses it with a three-stage cascade.
pub const QUERY_CLASSIFICATION_PROMPT: &str = r#"질문의 **의도**를 분석하여 JSON으로 응답하세요.

## 핵심 원칙
키워드가 아닌 **문맥과 의도**로 분류:
- "출원인별 현황 분석해줘" → 그룹별 통계 = **aggregation**
- "국내 vs 해외 비교 분석해줘" → 두 대상 비교 = **comparison**
- "딥러닝 연구 동향" / "AI 특허 동향" → **trend_analysis**

```json
{
    "query_type": "sql|rag|hybrid|simple",
    "query_subtype": "list|aggregation|trend_analysis|ranking|concept|compound|recommendation|comparison",
    "intent": "의도 설명",
    "entity_types": [],
    "keywords": ["핵심_키워드"],
    "is_aggregation": false,
    "is_compound": false,
    "sub_queries": [],
    "structured_keywords": {"tech":[],"org":[],"country":[],"region":[],"filter":[],"metric":[]}
}
```

## entity_types 결정
질문에서 언급된 데이터 유형을 추론하세요:
- 특허/발명/출원/IP → "patent"
- 과제/연구/프로젝트/R&D → "project"
- 장비/기자재/설비/분석기기 → "equip"
- 공고/제안/RFP/사업공고 → "proposal"
- 여러 유형이 언급되면 모두 포함 (예: ["patent", "project"])
- 불명확하면 빈 배열 [] (검색 단계에서 실제 데이터 존재 여부로 결정)

## query_subtype 분류

| 유형 | 의도 | 패턴 |
|------|------|------|
| list | 목록 조회 | "알려줘/N개/목록" |
| aggregation | 통계/집계 | "~별 현황/분포" |
| trend_analysis | 동향 분석 | "~동향/추이/연도별" → 반드시 sql |
| ranking | 순위 | "TOP N/가장/상위" |
| recommendation | 추천 | "추천/매칭/적합한" |
| comparison | 비교 | "A vs B/비교/차이" (대상 2개 이상) |
| concept | 개념 | "~란/설명해줘/뭐야/종류/유형" |
| compound | 복합 | 2개 이상 독립적 요청 |

## is_compound 판단
**다른 엔티티 유형(특허+과제+제안서 등)**을 검색하면 compound=true:
- "AI 특허와 연구과제" → compound=true, sub_queries로 분해
```json
"sub_queries": [
    {"intent": "특허 검색", "subtype": "list", "keywords": ["AI"], "entity_types": ["patent"]},
    {"intent": "연구과제 검색", "subtype": "list", "keywords": ["AI"], "entity_types": ["project"]}
]
```
compound가 아닌 경우:
- "삼성과 LG 비교" → comparison 1건
- "특허 목록과 출원인 정보" → JOIN으로 해결되는 1건

## 키워드 추출
- 기술 용어는 분리 금지: "수소연료전지" (O), "수소"+"연료전지" (X)
- 기관/기업명도 핵심 키워드로 추출: "삼성전자 특허" → keywords: ["삼성전자"]
- 일반 단어 제외: 장비, 리스트, 목록, 보유, 추천, 시험, 측정
- 복잡한 용어는 핵심 개념으로 추상화: "이미지 기반 특허맵 저작 엔진" → ["특허맵"]
- structured_keywords.country: 반드시 코드로 변환하고 keywords에서 제외
  - "한국/국내/자국" → ["KR"], "미국" → ["US"], "일본" → ["JP"],
    "중국" → ["CN"], "유럽" → ["EU"], "해외/타국" → ["NOT_KR"]

질문: {query}
"#;

/// Reasoning-mode preamble prepended to the classification prompt
pub const REASONING_PREAMBLE: &str = r#"<think>
사용자 질의를 단계별로 분석합니다:

1단계: 핵심 의도 파악 - 사용자가 원하는 정보 유형 (목록, 통계, 개념, 추천)
2단계: 쿼리 유형 결정 - sql(데이터 조회) / rag(개념·의미 검색) / hybrid(둘 다) / simple(인사)
3단계: 세부 유형 결정 - list, aggregation, trend_analysis, ranking, concept, compound, recommendation, comparison
4단계: 엔티티 타입 추론 - patent / project / equip / proposal, 다중이면 compound
5단계: 핵심 키워드 추출 - 기술 용어와 고유명사만, 복합어는 분리 금지
6단계: 복합 질의 분해 - 다른 엔티티 타입 검색이면 sub_queries로 분해

분석 완료.
</think>

"#;

pub const CLASSIFICATION_SYSTEM_PROMPT: &str =
    "당신은 정확한 질의 분석 전문가입니다. JSON 형식으로만 응답하세요. 다른 텍스트는 포함하지 마세요.";

/// SQL generation prompt for subtypes with no direct template
pub const SQL_GENERATION_SYSTEM_PROMPT: &str = r#"당신은 PostgreSQL 전문가입니다. 사용자 질문을 하나의 SELECT 쿼리로 변환하세요.

규칙:
- SELECT 또는 WITH(CTE)로 시작하는 단일 쿼리만 생성 (세미콜론 2개 금지)
- DML/DDL 금지, SQL 주석 금지
- 날짜 컬럼은 TEXT 형식(yyyyMMdd)이므로 EXTRACT 대신 LEFT() 사용
- 컬럼 별칭은 한글로
- 결과만 출력하고 설명은 생략"#;

pub const SQL_GENERATION_PROMPT: &str = r#"## 스키마
{schema}

## 힌트
{hints}

## 질문
{question}

SQL:"#;

/// Answer generation system prompt; the no-hallucination rule is embedded
pub const GENERATOR_SYSTEM_PROMPT: &str = r#"당신은 R&D 데이터 전문 분석 어시스턴트입니다.

규칙:
1. 제공된 컨텍스트에 있는 정보만 사용하세요. 컨텍스트에 없는 사실을 만들어내지 마세요.
2. 표 형태의 데이터는 마크다운 표로 정리하세요.
3. 복합 질의는 엔티티별로 표를 분리하고(특허 표, 과제 표 순서) 마지막에 종합 결론을 작성하세요.
4. 수치는 컨텍스트의 값을 그대로 인용하세요.
5. 사용자 수준({level})에 맞는 어조로 작성하세요.
"#;

pub const GENERATOR_USER_PROMPT: &str = r#"## 질문
{query}

## 컨텍스트
{context}

위 컨텍스트만 근거로 질문에 답하세요."#;

/// Fixed apology used when every upstream source failed
pub const APOLOGY_TEMPLATE: &str =
    "죄송합니다. 요청하신 정보를 찾지 못했습니다. 질문을 조금 더 구체적으로 다시 시도해 주세요.";

/// Greeting response for the simple fast path
pub const GREETING_RESPONSE: &str = "안녕하세요! R&D 특허·과제·장비 검색 어시스턴트입니다. \
    궁금하신 기술 분야나 기관에 대해 질문해 주세요.";

/// Help response for the simple fast path
pub const HELP_RESPONSE: &str = "다음과 같은 질문을 할 수 있습니다:\n\
    - \"수소연료전지 특허 TOP 10 출원기관\"\n\
    - \"AI 특허와 연구과제\"\n\
    - \"표면단차측정기 보유 기관\"\n\
    - \"딥러닝 연구 동향\"";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prompt_substitution() {
        let out = format_prompt("{a} and {b}", &[("a", "1"), ("b", "2")]);
        assert_eq!(out, "1 and 2");
    }

    #[test]
    fn test_classification_prompt_has_query_slot() {
        assert!(QUERY_CLASSIFICATION_PROMPT.contains("{query}"));
        let formatted = format_prompt(QUERY_CLASSIFICATION_PROMPT, &[("query", "AI 특허")]);
        assert!(formatted.contains("질문: AI 특허"));
    }
}
