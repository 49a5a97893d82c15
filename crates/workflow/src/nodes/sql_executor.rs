//! SQL execution node
//!
//! Per-entity path selection: ES-validated direct SQL when the scout found
//! document ids, compiled templates for the statistically-typed subtypes,
//! keyword list templates, and an LLM-generated statement as the last
//! resort. Every LLM-generated statement passes the safety guard before it
//! reaches the database. Multiple entities execute concurrently.

use crate::templates;
use crate::WorkflowContext;
use futures::future::join_all;
use rndsearch_core::catalog;
use rndsearch_core::{
    EsStatistics, QuerySubtype, RankingRow, SourceRef, SqlResult, WorkflowState,
};
use rndsearch_llm::LlmApi;
use rndsearch_storage::validate_sql;
use serde_json::json;
use tracing::{debug, info, warn};

/// Meta words excluded from ranking keyword predicates
const RANKING_EXCLUDE: &[&str] = &[
    "출원기관", "출원인", "수행기관", "참여기관", "주요", "TOP", "top", "순위", "분야",
    "기관", "역량",
];

/// Additional exclusions for impact rankings
const IMPACT_EXCLUDE: &[&str] = &["영향력", "피인용", "citation", "인용"];

#[derive(Debug)]
struct EntityExecution {
    entity: String,
    result: SqlResult,
    generated_sql: Option<String>,
    source: &'static str,
}

pub async fn execute_sql(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    // loader strategies bypass everything else
    if state.search_config.use_loader {
        if let Some(name) = state.search_config.loader_name.clone() {
            if let Some(queries) = ctx.loaders.generate(&name, &state) {
                return execute_loader_queries(state, ctx, queries).await;
            }
        }
    }

    // statistics subtypes are served from ES aggregations when possible
    if matches!(
        state.query_subtype,
        QuerySubtype::TrendAnalysis | QuerySubtype::CrosstabAnalysis
    ) && ctx.es.is_enabled()
    {
        return execute_es_statistics(state, ctx).await;
    }

    let entity_types = if state.entity_types.is_empty() {
        ctx.config.workflow.default_entity_types.clone()
    } else {
        state.entity_types.clone()
    };

    let executions: Vec<EntityExecution> = join_all(
        entity_types
            .iter()
            .map(|entity| execute_single_entity(&state, ctx, entity.clone())),
    )
    .await;

    let multi_entity = executions.len() > 1;
    for execution in executions {
        if execution.result.success && execution.result.row_count > 0 {
            if let Some(sql) = &execution.generated_sql {
                state
                    .sources
                    .push(SourceRef::sql(sql.clone(), execution.result.row_count));
            }
        }
        if let Some(error) = &execution.result.error {
            state.push_error(format!("SQL[{}]: {error}", execution.entity));
        }
        if execution.source == "elasticsearch" {
            state.sources.push(SourceRef {
                kind: "elasticsearch".to_string(),
                count: Some(execution.result.row_count),
                ..Default::default()
            });
        }

        if multi_entity {
            state
                .multi_sql_results
                .insert(execution.entity.clone(), execution.result);
        } else {
            state.generated_sql = execution.generated_sql.clone();
            state.sql_result = Some(execution.result);
        }
    }

    state
}

async fn execute_loader_queries(
    mut state: WorkflowState,
    ctx: &WorkflowContext,
    queries: Vec<crate::loaders::LoaderQuery>,
) -> WorkflowState {
    info!("executing {} loader queries", queries.len());
    let single = queries.len() == 1;

    for query in queries {
        let mut result = match ctx.sql.execute(&query.sql).await {
            Ok(result) => result,
            Err(e) => SqlResult::failure(e.to_string()),
        };
        result.generated_sql = Some(query.sql.clone());

        if result.success && result.row_count > 0 {
            state
                .sources
                .push(SourceRef::sql(query.sql.clone(), result.row_count));
        }
        if let Some(error) = &result.error {
            state.push_error(format!("SQL[{}]: {error}", query.entity));
        }

        if single {
            state.generated_sql = Some(query.sql);
            state.sql_result = Some(result);
        } else {
            state.multi_sql_results.insert(query.entity, result);
        }
    }

    state
}

/// Trend / crosstab statistics straight from ES aggregations; SQL is skipped
async fn execute_es_statistics(mut state: WorkflowState, ctx: &WorkflowContext) -> WorkflowState {
    let keywords = state.keywords.join(" ");
    let keywords_opt = (!keywords.is_empty()).then_some(keywords.as_str());
    let countries = state.structured_keywords.country.clone();

    if state.query_subtype == QuerySubtype::CrosstabAnalysis {
        // window from the filter bucket ("최근 5년") when present
        let years_back = detect_years_back(&state).unwrap_or(5);
        match ctx
            .es
            .crosstab_statistics("patent", keywords_opt, &countries, years_back, 5)
            .await
        {
            Ok(table) => {
                info!("crosstab statistics: {} rows", table.rows.len());
                state
                    .es_statistics
                    .insert("patent".to_string(), EsStatistics::Crosstab(table));
                state.statistics_type = "crosstab_analysis".to_string();
            }
            Err(e) => {
                warn!("crosstab statistics failed: {e}");
                state.push_error(format!("ES 통계: {e}"));
            }
        }
        return state;
    }

    let entity_types = if state.entity_types.is_empty() {
        ctx.config.workflow.default_entity_types.clone()
    } else {
        state.entity_types.clone()
    };

    for entity in &entity_types {
        match ctx
            .es
            .entity_statistics(entity, keywords_opt, &countries, None, None, "year")
            .await
        {
            Ok(stats) => {
                state
                    .es_statistics
                    .insert(entity.clone(), EsStatistics::Trend(stats));
            }
            Err(e) => {
                warn!("trend statistics for {entity} failed: {e}");
                state.push_error(format!("ES 통계[{entity}]: {e}"));
            }
        }
    }
    if !state.es_statistics.is_empty() {
        state.statistics_type = "trend_analysis".to_string();
    }
    state
}

/// "최근 N년" filter hint, if the analyzer captured one
fn detect_years_back(state: &WorkflowState) -> Option<i32> {
    let pattern = regex::Regex::new(r"(\d+)\s*년").ok()?;
    for filter in &state.structured_keywords.filter {
        if let Some(captures) = pattern.captures(filter) {
            if filter.contains("최근") {
                return captures[1].parse().ok();
            }
        }
    }
    if state.query.contains("최근") {
        if let Some(captures) = pattern.captures(&state.query) {
            return captures[1].parse().ok();
        }
    }
    None
}

async fn execute_single_entity(
    state: &WorkflowState,
    ctx: &WorkflowContext,
    entity: String,
) -> EntityExecution {
    let keywords = entity_keywords_for(state, &entity);
    let domain = catalog::domain_for_entity(&entity);
    let doc_ids = state.es_doc_ids.get(domain).cloned().unwrap_or_default();

    // 1. ES-driven direct path: the result set stays a subset of
    //    ES-validated documents
    if !doc_ids.is_empty() && !state.is_aggregation {
        let sql = templates::es_direct_sql(&entity, &doc_ids);
        debug!("[{entity}] ES-direct SQL over {} ids", doc_ids.len().min(50));
        let result = run_template(ctx, &sql).await;
        return EntityExecution {
            entity,
            result,
            generated_sql: Some(sql),
            source: "es_scout",
        };
    }

    // 2. direct templates for statistically-typed subtypes
    match (state.query_subtype, entity.as_str()) {
        (QuerySubtype::ImpactRanking, "patent") => {
            let search_keywords = filter_keywords(&keywords, &[RANKING_EXCLUDE, IMPACT_EXCLUDE]);
            let sql = templates::impact_ranking_sql(&search_keywords, country_clause(state).as_deref());
            let result = run_template(ctx, &sql).await;
            return EntityExecution {
                entity,
                result,
                generated_sql: Some(sql),
                source: "sql",
            };
        }
        (QuerySubtype::NationalityRanking, "patent") => {
            return execute_nationality_ranking(state, ctx, entity, &keywords).await;
        }
        (QuerySubtype::Ranking, "patent") => {
            return execute_patent_ranking(state, ctx, entity, &keywords).await;
        }
        (QuerySubtype::Ranking, "project") => {
            let search_keywords = filter_keywords(&keywords, &[RANKING_EXCLUDE]);
            let sql = templates::project_ranking_sql(&search_keywords);
            let result = run_template(ctx, &sql).await;
            return EntityExecution {
                entity,
                result,
                generated_sql: Some(sql),
                source: "sql",
            };
        }
        _ => {}
    }

    // 3. keyword list template
    if matches!(state.query_subtype, QuerySubtype::List | QuerySubtype::Compound) {
        let country = state.structured_keywords.country.first().map(String::as_str);
        let regions: Vec<&str> = state
            .structured_keywords
            .region
            .iter()
            .filter_map(|region| catalog::region_code(region))
            .collect();
        let sql = templates::list_sql(
            &entity,
            &keywords,
            country,
            &regions,
            state.search_config.sql_limit,
        );
        let result = run_template(ctx, &sql).await;
        return EntityExecution {
            entity,
            result,
            generated_sql: Some(sql),
            source: "sql",
        };
    }

    // 4. LLM-generated SQL fallback
    execute_llm_sql(state, ctx, entity, &keywords).await
}

async fn execute_patent_ranking(
    state: &WorkflowState,
    ctx: &WorkflowContext,
    entity: String,
    keywords: &[String],
) -> EntityExecution {
    let search_keywords = filter_keywords(keywords, &[RANKING_EXCLUDE]);
    let sql = templates::patent_ranking_sql(&search_keywords, country_clause(state).as_deref());
    let result = run_template(ctx, &sql).await;

    // empty ranking falls back to an ES terms aggregation
    if result.success && result.row_count == 0 {
        warn!("[{entity}] ranking SQL returned 0 rows, trying ES fallback");
        if let Some(es_result) = es_ranking_fallback(ctx, &search_keywords).await {
            return EntityExecution {
                entity,
                result: es_result,
                generated_sql: Some(format!("-- ES fallback for: {}", first_line(&sql))),
                source: "elasticsearch",
            };
        }
    }

    EntityExecution {
        entity,
        result,
        generated_sql: Some(sql),
        source: "sql",
    }
}

async fn execute_nationality_ranking(
    state: &WorkflowState,
    ctx: &WorkflowContext,
    entity: String,
    keywords: &[String],
) -> EntityExecution {
    let search_keywords = filter_keywords(keywords, &[RANKING_EXCLUDE]);
    let country = country_clause(state);
    let domestic_sql =
        templates::nationality_ranking_sql(&search_keywords, country.as_deref(), true);
    let foreign_sql =
        templates::nationality_ranking_sql(&search_keywords, country.as_deref(), false);

    let domestic = run_template(ctx, &domestic_sql).await;
    let foreign = run_template(ctx, &foreign_sql).await;

    if !domestic.success && !foreign.success {
        return EntityExecution {
            entity,
            result: SqlResult::failure(
                domestic.error.unwrap_or_else(|| "국적별 순위 조회 실패".to_string()),
            ),
            generated_sql: Some(domestic_sql),
            source: "sql",
        };
    }

    // union with a 구분 (domestic/foreign) discriminator column
    let mut columns = vec!["구분".to_string()];
    columns.extend(if domestic.success {
        domestic.columns.clone()
    } else {
        foreign.columns.clone()
    });

    let mut rows = Vec::new();
    if domestic.success {
        for row in &domestic.rows {
            let mut combined = vec![json!("자국기업")];
            combined.extend(row.clone());
            rows.push(combined);
        }
    }
    if foreign.success {
        for row in &foreign.rows {
            let mut combined = vec![json!("타국기업")];
            combined.extend(row.clone());
            rows.push(combined);
        }
    }

    let row_count = rows.len();
    EntityExecution {
        entity,
        result: SqlResult {
            success: true,
            columns,
            rows,
            row_count,
            error: None,
            execution_time_ms: domestic.execution_time_ms + foreign.execution_time_ms,
            generated_sql: None,
        },
        generated_sql: Some(format!("-- 자국기업\n{domestic_sql}\n\n-- 타국기업\n{foreign_sql}")),
        source: "sql",
    }
}

/// LLM SQL generation with schema snippet and structured hints
async fn execute_llm_sql(
    state: &WorkflowState,
    ctx: &WorkflowContext,
    entity: String,
    keywords: &[String],
) -> EntityExecution {
    let tables = catalog::related_tables(&[entity.clone()]);
    let schema = catalog::format_schema_for_llm(&tables);
    let hints = build_sql_hints(state, &entity, keywords);
    let question = format!(
        "{} {}를 검색해줘",
        keywords.join(" "),
        catalog::entity_label(&entity)
    );

    let prompt = crate::prompts::format_prompt(
        crate::prompts::SQL_GENERATION_PROMPT,
        &[
            ("schema", schema.as_str()),
            ("hints", hints.as_str()),
            ("question", question.as_str()),
        ],
    );

    let raw = match ctx
        .llm
        .generate(&prompt, Some(crate::prompts::SQL_GENERATION_SYSTEM_PROMPT), 1024, 0.3)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            return EntityExecution {
                entity,
                result: SqlResult::failure(format!("SQL 생성 실패: {e}")),
                generated_sql: None,
                source: "sql",
            };
        }
    };

    let sql = clean_sql(&raw);

    if let Err(reason) = validate_sql(&sql) {
        warn!("[{entity}] unsafe SQL rejected: {reason}");
        return EntityExecution {
            entity,
            result: SqlResult::failure(format!("안전하지 않은 SQL: {reason}")),
            generated_sql: Some(sql),
            source: "sql",
        };
    }

    let result = match ctx.sql.execute(&sql).await {
        Ok(result) => result,
        Err(e) => SqlResult::failure(e.to_string()),
    };

    EntityExecution {
        entity,
        result,
        generated_sql: Some(sql),
        source: "sql",
    }
}

async fn run_template(ctx: &WorkflowContext, sql: &str) -> SqlResult {
    match ctx.sql.execute(sql).await {
        Ok(result) => result,
        Err(e) => SqlResult::failure(e.to_string()),
    }
}

async fn es_ranking_fallback(ctx: &WorkflowContext, keywords: &[String]) -> Option<SqlResult> {
    if !ctx.es.is_enabled() {
        return None;
    }
    let query = keywords.join(" ");
    let rankings: Vec<RankingRow> = ctx
        .es
        .ranking(&query, "patent", "patent_frst_appn.keyword", 10)
        .await
        .ok()?;
    if rankings.is_empty() {
        return None;
    }

    let rows: Vec<Vec<serde_json::Value>> = rankings
        .iter()
        .map(|row| vec![json!(row.org), json!(row.count)])
        .collect();
    Some(SqlResult {
        success: true,
        columns: vec!["출원기관".to_string(), "특허수".to_string()],
        row_count: rows.len(),
        rows,
        error: None,
        execution_time_ms: 0.0,
        generated_sql: None,
    })
}

/// Per-entity keywords: independent entity set when present, else the
/// merged keywords; entity-type nouns are stripped either way
fn entity_keywords_for(state: &WorkflowState, entity: &str) -> Vec<String> {
    let base = state
        .entity_keywords
        .get(entity)
        .cloned()
        .unwrap_or_else(|| state.all_keywords());
    base.into_iter()
        .filter(|kw| !catalog::ENTITY_TYPE_STOPWORDS.contains(&kw.as_str()))
        .collect()
}

fn filter_keywords(keywords: &[String], exclusion_sets: &[&[&str]]) -> Vec<String> {
    let filtered: Vec<String> = keywords
        .iter()
        .filter(|kw| kw.chars().count() > 1)
        .filter(|kw| {
            !exclusion_sets.iter().any(|set| {
                set.iter()
                    .any(|excluded| kw.as_str() == *excluded || kw.contains(*excluded))
            })
        })
        .cloned()
        .collect();
    if filtered.is_empty() {
        keywords.iter().take(3).cloned().collect()
    } else {
        filtered
    }
}

fn country_clause(state: &WorkflowState) -> Option<String> {
    state
        .structured_keywords
        .country
        .first()
        .and_then(|code| catalog::country_filter_clause(code, "p"))
}

fn build_sql_hints(state: &WorkflowState, entity: &str, keywords: &[String]) -> String {
    let mut hints = Vec::new();
    let search_column = catalog::entity_search_column(entity);
    let clause = templates::ilike_disjunction(keywords, search_column, 6);
    hints.push(format!("검색 조건: WHERE ({clause})"));

    if state.is_aggregation {
        hints.push("통계/집계 쿼리: 전체 데이터 대상 GROUP BY + COUNT, 중간 LIMIT 금지".to_string());
    }
    if let Some(clause) = country_clause(state) {
        hints.push(format!("등록국가 필터 필수: {clause}"));
    }
    if !state.structured_keywords.filter.is_empty() {
        hints.push(format!(
            "필터 조건: {:?} ('TOP N' -> LIMIT N, '최근 N년' -> 날짜 조건)",
            state.structured_keywords.filter
        ));
    }
    if !state.structured_keywords.metric.is_empty() {
        hints.push(format!(
            "분석 지표: {:?} ('추이' -> 시계열 GROUP BY)",
            state.structured_keywords.metric
        ));
    }

    hints.join("\n")
}

/// Strip markdown fences and collapse to one line
fn clean_sql(raw: &str) -> String {
    let cleaned = raw.replace("```sql", "").replace("```", "");
    cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or(sql)
}
