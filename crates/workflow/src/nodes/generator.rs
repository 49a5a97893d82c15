//! Answer generation node
//!
//! Assembles the merged context into Markdown, scores its quality, and asks
//! the LLM for the final answer under a no-hallucination system prompt.
//! Simple queries and total-failure turns are answered from fixed templates
//! without an LLM call.

use crate::prompts::{
    format_prompt, APOLOGY_TEMPLATE, GENERATOR_SYSTEM_PROMPT, GENERATOR_USER_PROMPT,
    GREETING_RESPONSE, HELP_RESPONSE,
};
use crate::WorkflowContext;
use rndsearch_core::state::history_reducer;
use rndsearch_core::{
    catalog, ChatMessage, CrosstabTable, EsStatistics, Level, QueryType, SearchResult, SqlResult,
    StatsBucketSet, SubQueryResult, WorkflowState,
};
use tracing::{info, warn};

const NO_CONTEXT_MESSAGE: &str = "관련 정보를 찾지 못했습니다.";

pub async fn generate_response(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    // simple fast path: fixed templates, no LLM, no retrieval
    if state.query_type == QueryType::Simple {
        state.response = if state.error.is_some() {
            format!(
                "{APOLOGY_TEMPLATE}\n(오류: {})",
                state.error.as_deref().unwrap_or("")
            )
        } else if state.query_intent.contains("도움말") {
            HELP_RESPONSE.to_string()
        } else {
            GREETING_RESPONSE.to_string()
        };
        append_history(&mut state, ctx);
        return state;
    }

    let context = build_merged_context(&state);
    state.context_quality = calculate_context_quality(&context, &state);

    if state.context_quality < 0.3 {
        warn!(
            "low context quality ({:.2}), hallucination risk",
            state.context_quality
        );
    }

    if !is_context_meaningful(&context) {
        // total source failure surfaces here and only here
        state.response = match &state.error {
            Some(error) => format!("{APOLOGY_TEMPLATE}\n(오류: {error})"),
            None => APOLOGY_TEMPLATE.to_string(),
        };
        append_history(&mut state, ctx);
        return state;
    }

    // multi-table answers get a larger token budget
    let structural_complexity = state.multi_sql_results.len().max(state.sub_query_results.len());
    let max_tokens: u32 = if structural_complexity > 1 || !state.es_statistics.is_empty() {
        2048
    } else {
        1024
    };

    let system_prompt =
        GENERATOR_SYSTEM_PROMPT.replace("{level}", level_label(state.level));
    let user_prompt = format_prompt(
        GENERATOR_USER_PROMPT,
        &[("query", state.query.as_str()), ("context", context.as_str())],
    );

    state.response = match ctx
        .llm
        .generate(&user_prompt, Some(&system_prompt), max_tokens, 0.3)
        .await
    {
        Ok(response) if !response.trim().is_empty() => response,
        Ok(_) => APOLOGY_TEMPLATE.to_string(),
        Err(e) => {
            warn!("response generation failed: {e}");
            state.push_error(
                crate::error::WorkflowError::ResponseGeneration(e.to_string()).to_string(),
            );
            format!("{APOLOGY_TEMPLATE}\n(오류: {e})")
        }
    };

    info!(
        "response generated: {} chars, quality {:.2}",
        state.response.len(),
        state.context_quality
    );

    append_history(&mut state, ctx);
    state
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::L1 | Level::L2 | Level::Elementary => "초등",
        Level::L3 | Level::L4 | Level::General => "일반인",
        Level::L5 | Level::L6 | Level::Expert => "전문가",
    }
}

fn append_history(state: &mut WorkflowState, ctx: &WorkflowContext) {
    let new_messages = vec![
        ChatMessage::user(state.query.clone()),
        ChatMessage::assistant(state.response.clone()),
    ];
    state.conversation_history = history_reducer(
        std::mem::take(&mut state.conversation_history),
        new_messages,
        ctx.config.workflow.max_history_length,
    );
}

/// Assemble the merged context, most structured source first
pub fn build_merged_context(state: &WorkflowState) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !state.es_statistics.is_empty() {
        match state.statistics_type.as_str() {
            "crosstab_analysis" => {
                for stats in state.es_statistics.values() {
                    if let EsStatistics::Crosstab(table) = stats {
                        parts.push(build_crosstab_context(table));
                    }
                }
            }
            _ => {
                let mut entities: Vec<&String> = state.es_statistics.keys().collect();
                entities.sort();
                for entity in entities {
                    if let Some(EsStatistics::Trend(stats)) = state.es_statistics.get(entity) {
                        parts.push(build_statistics_context(entity, stats));
                    }
                }
            }
        }
    }

    if !state.sub_query_results.is_empty() {
        parts.push(format_sub_query_results(&state.sub_query_results));
    } else if !state.multi_sql_results.is_empty() {
        parts.push(format_multi_sql_results(state));
    } else if let Some(sql_result) = &state.sql_result {
        if sql_result.success && !sql_result.rows.is_empty() {
            parts.push("## 데이터베이스 조회 결과".to_string());
            parts.push(format_sql_table(sql_result, 20));
            if let Some(sql) = &state.generated_sql {
                parts.push(format!("사용된 SQL: {sql}"));
            }
        }
    }

    if state.sub_query_results.is_empty() && !state.rag_results.is_empty() {
        parts.push("## 관련 정보".to_string());
        parts.push(format_rag_results(&state.rag_results, 10));
    }

    if parts.is_empty() {
        NO_CONTEXT_MESSAGE.to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Markdown table for a SQL result, capped at `max_rows`
pub fn format_sql_table(result: &SqlResult, max_rows: usize) -> String {
    let mut lines = Vec::new();
    if !result.columns.is_empty() {
        lines.push(format!("| {} |", result.columns.join(" | ")));
        lines.push(format!(
            "|{}|",
            result.columns.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        ));
    }
    for row in result.rows.iter().take(max_rows) {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s.chars().take(200).collect(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    if result.rows.len() > max_rows {
        lines.push(format!("... 외 {}건", result.rows.len() - max_rows));
    }
    lines.join("\n")
}

fn format_rag_results(results: &[SearchResult], max_results: usize) -> String {
    results
        .iter()
        .take(max_results)
        .enumerate()
        .map(|(i, result)| {
            let description: String = result.description.chars().take(300).collect();
            format!(
                "{}. {} ({})\n{}",
                i + 1,
                result.name,
                result.entity_type,
                description
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One section per entity; entity tables never interleave
fn format_multi_sql_results(state: &WorkflowState) -> String {
    let mut parts = Vec::new();
    let mut entities: Vec<&String> = state.multi_sql_results.keys().collect();
    entities.sort();

    for entity in entities {
        let result = &state.multi_sql_results[entity];
        let label = catalog::entity_label(entity);

        if !result.success {
            parts.push(format!(
                "## {label} 검색 결과\n검색 실패: {}",
                result.error.as_deref().unwrap_or("알 수 없는 오류")
            ));
            continue;
        }
        if result.rows.is_empty() {
            parts.push(format!("## {label} 검색 결과 (0건)\n조회된 데이터가 없습니다."));
            continue;
        }
        parts.push(format!("## {label} 검색 결과 ({}건)", result.row_count));
        parts.push(format_sql_table(result, 20));
    }

    parts.join("\n\n")
}

/// Sections in sub-query input order; callers sorted by index upstream
fn format_sub_query_results(results: &[SubQueryResult]) -> String {
    let mut parts = Vec::new();

    for result in results {
        let label = result
            .entity_types
            .first()
            .map(|entity| catalog::entity_label(entity))
            .unwrap_or("기타");
        parts.push(format!(
            "## 하위 질의 {}: {} ({})",
            result.index + 1,
            result.query,
            label
        ));

        match &result.sql_result {
            Some(sql_result) if sql_result.success && !sql_result.rows.is_empty() => {
                parts.push(format!("### 조회 결과 ({}건)", sql_result.row_count));
                parts.push(format_sql_table(sql_result, 20));
            }
            Some(sql_result) if !sql_result.success => {
                parts.push(format!(
                    "검색 실패: {}",
                    sql_result.error.as_deref().unwrap_or("알 수 없는 오류")
                ));
            }
            _ => {}
        }

        if !result.rag_results.is_empty() {
            parts.push(format!("### 관련 정보 ({}건)", result.rag_results.len()));
            parts.push(format_rag_results(&result.rag_results, 10));
        }

        if result.sql_result.is_none() && result.rag_results.is_empty() {
            parts.push("조회된 결과가 없습니다.".to_string());
        }
    }

    parts.join("\n\n")
}

/// Yearly statistics as a Markdown table with a small trend summary
fn build_statistics_context(entity: &str, stats: &StatsBucketSet) -> String {
    let label = catalog::entity_label(entity);
    let mut lines = vec![
        format!("### {label} 연도별 통계 ({})", stats.period),
        format!("- 총 {}건", stats.total),
        String::new(),
    ];

    if !stats.buckets.is_empty() {
        lines.push("| 연도 | 건수 |".to_string());
        lines.push("|------|------|".to_string());

        let mut sorted = stats.buckets.clone();
        sorted.sort_by(|a, b| b.key.cmp(&a.key));
        for bucket in &sorted {
            lines.push(format!("| {} | {} |", bucket.key, bucket.count));
        }

        let counts: Vec<u64> = sorted.iter().map(|b| b.count).filter(|c| *c > 0).collect();
        if counts.len() >= 2 {
            let recent: Vec<u64> = counts.iter().take(3).copied().collect();
            let older: Vec<u64> = counts.iter().skip(3).take(3).copied().collect();
            let recent_avg = recent.iter().sum::<u64>() as f64 / recent.len() as f64;
            lines.push(String::new());
            lines.push(format!("최근 {}년 평균: {recent_avg:.0}건", recent.len()));
            if !older.is_empty() {
                let older_avg = older.iter().sum::<u64>() as f64 / older.len() as f64;
                if older_avg > 0.0 {
                    let change = (recent_avg - older_avg) / older_avg * 100.0;
                    lines.push(format!("이전 {}년 평균 대비 변화율: {change:+.1}%", older.len()));
                }
            }
        }
    }

    lines.join("\n")
}

/// Crosstab table: one row per applicant, one column per year, totals last
fn build_crosstab_context(table: &CrosstabTable) -> String {
    let country = if table.countries.is_empty() {
        "전체".to_string()
    } else {
        table.countries.join(", ")
    };
    let mut lines = vec![
        format!("### 특허 출원기관 TOP {} ({})", table.rows.len(), table.period),
        format!("- 검색 키워드: {}", table.keywords),
        format!("- 국가: {country}"),
        format!("- 총 {}건 중 3건 이상 출원 기관", table.total),
        String::new(),
    ];

    if table.rows.is_empty() {
        lines.push("해당 조건에 맞는 출원기관이 없습니다.".to_string());
        return lines.join("\n");
    }

    let mut header = "| 순위 | 출원기관 | 국적 |".to_string();
    for year in &table.years {
        header.push_str(&format!(" {year} |"));
    }
    header.push_str(" 합계 |");
    lines.push(header);

    let mut separator = "|------|---------|------|".to_string();
    for _ in &table.years {
        separator.push_str("------:|");
    }
    separator.push_str("------:|");
    lines.push(separator);

    for row in &table.rows {
        let mut line = format!("| {} | {} | {} |", row.rank, row.name, row.nationality);
        for year in &table.years {
            let count = row.by_year.get(&year.to_string()).copied().unwrap_or(0);
            line.push_str(&format!(" {count} |"));
        }
        line.push_str(&format!(" {} |", row.total));
        lines.push(line);
    }

    lines.join("\n")
}

/// Does the context hold actual content, not just ids and separators?
fn is_context_meaningful(context: &str) -> bool {
    if context.is_empty() || context == NO_CONTEXT_MESSAGE {
        return false;
    }

    let content_lines = context
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.replace(['-', '|', ':'], "").trim().is_empty())
        .filter(|line| {
            let cleaned = line.replace(['|', '[', ']'], "");
            !cleaned.trim().chars().all(|c| c.is_ascii_digit())
        })
        .filter(|line| line.chars().count() > 10)
        .count();

    content_lines >= 2
}

/// Context quality in [0,1]: source count, cross-validation rate, mean
/// source confidence, information density
fn calculate_context_quality(context: &str, state: &WorkflowState) -> f32 {
    if context.is_empty() || context == NO_CONTEXT_MESSAGE {
        return 0.0;
    }

    let sources = &state.sources;
    let source_count = sources.len();
    let mut score = (source_count as f32 / 8.0).min(0.25);

    if source_count > 0 {
        let validated = sources.iter().filter(|s| s.cross_validated).count();
        score += validated as f32 / source_count as f32 * 0.30;

        let average_score: f32 = sources
            .iter()
            .map(|s| s.score.unwrap_or(0.0).clamp(0.0, 1.0))
            .sum::<f32>()
            / source_count as f32;
        score += average_score * 0.25;
    }

    let meaningful_lines = context
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 30)
        .filter(|line| !line.replace(['-', '|'], "").trim().is_empty())
        .count();
    score += (meaningful_lines as f32 / 15.0).min(0.20);

    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_core::StatsBucket;
    use serde_json::json;

    #[test]
    fn test_sql_table_formatting() {
        let result = SqlResult {
            success: true,
            columns: vec!["기관명".to_string(), "특허수".to_string()],
            rows: vec![
                vec![json!("삼성전자"), json!(12)],
                vec![json!("LG화학"), json!(7)],
            ],
            row_count: 2,
            ..Default::default()
        };
        let table = format_sql_table(&result, 20);
        assert!(table.contains("| 기관명 | 특허수 |"));
        assert!(table.contains("| 삼성전자 | 12 |"));
    }

    #[test]
    fn test_context_meaningfulness() {
        assert!(!is_context_meaningful(""));
        assert!(!is_context_meaningful(NO_CONTEXT_MESSAGE));
        assert!(!is_context_meaningful("| 1 |\n| 2 |\n|---|"));
        let real = "## 데이터베이스 조회 결과\n| 기관명 | 특허수 |\n|---|---|\n| 삼성전자 주식회사 | 120 |";
        assert!(is_context_meaningful(real));
    }

    #[test]
    fn test_quality_scoring_bounds() {
        let mut state = WorkflowState::default();
        assert_eq!(calculate_context_quality(NO_CONTEXT_MESSAGE, &state), 0.0);

        state.sources = (0..8)
            .map(|i| rndsearch_core::SourceRef {
                kind: "vector".to_string(),
                node_id: Some(i.to_string()),
                score: Some(0.9),
                cross_validated: true,
                ..Default::default()
            })
            .collect();
        let context = "아주 길고 의미 있는 내용이 들어 있는 컨텍스트 라인입니다 하나\n".repeat(20);
        let quality = calculate_context_quality(&context, &state);
        assert!(quality > 0.8);
        assert!(quality <= 1.0);
    }

    #[test]
    fn test_crosstab_context_row_sums() {
        let table = CrosstabTable {
            years: vec![2023, 2024],
            rows: vec![rndsearch_core::CrosstabRow {
                rank: 1,
                name: "삼성전자".into(),
                nationality: "KR".into(),
                by_year: [("2023".to_string(), 2u64), ("2024".to_string(), 3u64)]
                    .into_iter()
                    .collect(),
                total: 5,
            }],
            period: "2020-2024".into(),
            total: 5,
            keywords: "반도체".into(),
            countries: vec!["KR".into()],
        };
        let context = build_crosstab_context(&table);
        assert!(context.contains("| 1 | 삼성전자 | KR | 2 | 3 | 5 |"));
        assert!(context.contains("국가: KR"));
    }

    #[test]
    fn test_statistics_context_table() {
        let stats = StatsBucketSet {
            entity_type: "patent".into(),
            period: "2015-2025".into(),
            total: 100,
            buckets: vec![
                StatsBucket { key: "2024".into(), count: 40 },
                StatsBucket { key: "2023".into(), count: 60 },
            ],
            ..Default::default()
        };
        let context = build_statistics_context("patent", &stats);
        assert!(context.contains("특허 연도별 통계"));
        assert!(context.contains("| 2024 | 40 |"));
    }

    #[test]
    fn test_sub_query_sections_preserve_order() {
        let results = vec![
            SubQueryResult {
                index: 0,
                query: "특허 검색".into(),
                entity_types: vec!["patent".into()],
                success: true,
                sql_result: Some(SqlResult {
                    success: true,
                    columns: vec!["특허명".into()],
                    rows: vec![vec![json!("특허A")]],
                    row_count: 1,
                    ..Default::default()
                }),
                ..Default::default()
            },
            SubQueryResult {
                index: 1,
                query: "과제 검색".into(),
                entity_types: vec!["project".into()],
                success: true,
                sql_result: Some(SqlResult {
                    success: true,
                    columns: vec!["과제명".into()],
                    rows: vec![vec![json!("과제B")]],
                    row_count: 1,
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        let context = format_sub_query_results(&results);
        let patent_pos = context.find("특허A").unwrap();
        let project_pos = context.find("과제B").unwrap();
        assert!(patent_pos < project_pos);
    }
}
