//! End-to-end workflow scenarios over mock backends
//!
//! Each test wires the full graph with scripted mocks and checks both the
//! user-visible result and which backends were actually touched.

use rndsearch_core::state::EsStatistics;
use rndsearch_core::{Config, CrosstabRow, CrosstabTable, Level, RankingRow, SqlResult, WorkflowState};
use rndsearch_embeddings::MockEmbeddingProvider;
use rndsearch_llm::MockLlm;
use rndsearch_storage::mock::{es_hit, MockEs, MockGraph, MockSql, MockVector};
use rndsearch_workflow::{engine, WorkflowContext};
use serde_json::json;
use std::sync::Arc;

struct Mocks {
    llm: Arc<MockLlm>,
    sql: Arc<MockSql>,
    es: Arc<MockEs>,
    vector: Arc<MockVector>,
    graph: Arc<MockGraph>,
}

fn build_context(llm: MockLlm) -> (WorkflowContext, Mocks) {
    let llm = Arc::new(llm);
    let sql = Arc::new(MockSql::new());
    let es = Arc::new(MockEs::new(true));
    let vector = Arc::new(MockVector::new());
    let graph = Arc::new(MockGraph::new());

    let ctx = WorkflowContext::new(
        Config::default(),
        llm.clone(),
        Arc::new(MockEmbeddingProvider::new(1024)),
        vector.clone(),
        es.clone(),
        graph.clone(),
        sql.clone(),
    );

    (
        ctx,
        Mocks {
            llm,
            sql,
            es,
            vector,
            graph,
        },
    )
}

/// Scenario 1: greeting fast path issues no backend calls at all
#[tokio::test]
async fn greeting_fast_path_touches_no_backends() {
    let (ctx, mocks) = build_context(MockLlm::new(vec![]));

    let result = ctx
        .run_workflow("안녕하세요", "session-1", Level::L3, None)
        .await;

    assert_eq!(result.query_type, "simple");
    assert!(!result.response.is_empty());
    assert_eq!(mocks.llm.call_count(), 0);
    assert_eq!(mocks.sql.call_count(), 0);
    assert_eq!(mocks.es.call_count(), 0);
    assert_eq!(mocks.vector.call_count(), 0);
    assert_eq!(mocks.graph.call_count(), 0);

    // history carries the turn
    let history = ctx.session_history("session-1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "안녕하세요");
}

/// Scenario 2: complex patent ranking fuses SQL and ES rankings with RRF
#[tokio::test]
async fn complex_patent_ranking_produces_rrf_table() {
    let classification = r#"{
        "query_type": "sql",
        "query_subtype": "ranking",
        "intent": "출원기관 순위",
        "keywords": ["수소연료전지"],
        "structured_keywords": {"tech": ["수소연료전지"], "org": [], "country": [], "region": [], "filter": ["TOP 10"], "metric": []}
    }"#;
    let (ctx, mocks) = build_context(MockLlm::new(vec![
        classification,
        "수소연료전지 특허 출원기관 순위입니다.",
    ]));

    // SQL ranking rows
    mocks.sql.queue(SqlResult {
        success: true,
        columns: vec!["출원기관".into(), "특허수".into(), "대표특허".into()],
        rows: vec![
            vec![json!("삼성전자"), json!(120), json!("특허A")],
            vec![json!("LG화학"), json!(80), json!("특허B")],
        ],
        row_count: 2,
        ..Default::default()
    });
    // ES terms-aggregation ranking
    mocks.es.set_ranking(vec![
        RankingRow {
            org: "LG화학".into(),
            count: 95,
        },
        RankingRow {
            org: "삼성전자".into(),
            count: 90,
        },
    ]);

    // the calculation cue makes this a complex ranking
    let result = ctx
        .run_workflow(
            "수소연료전지 특허 등록률 TOP 10 출원기관",
            "session-2",
            Level::L3,
            None,
        )
        .await;

    assert_eq!(result.query_subtype, "ranking");
    let table = result.sql_result.expect("merged ranking table");
    assert_eq!(
        table.columns,
        vec!["순위", "기관명", "SQL건수", "ES건수", "RRF점수"]
    );
    assert!(!table.rows.is_empty());
    // row #1 carries counts from at least one source
    let sql_count = table.rows[0][2].as_u64().unwrap_or(0);
    let es_count = table.rows[0][3].as_u64().unwrap_or(0);
    assert!(sql_count + es_count > 0);
    assert!(!result.response.is_empty());
}

/// Scenario 3: crosstab analysis skips SQL and reads ES nested aggregations
#[tokio::test]
async fn crosstab_skips_sql_and_uses_es_statistics() {
    let classification = r#"{
        "query_type": "sql",
        "query_subtype": "ranking",
        "keywords": ["특허"]
    }"#;
    let (ctx, mocks) = build_context(MockLlm::new(vec![
        classification,
        "출원기관 TOP 5 연도별 현황입니다.",
    ]));

    let years = vec![2020, 2021, 2022, 2023, 2024];
    let rows: Vec<CrosstabRow> = (0..5)
        .map(|i| {
            let by_year: std::collections::HashMap<String, u64> =
                years.iter().map(|y| (y.to_string(), (i + 1) as u64)).collect();
            let total: u64 = by_year.values().sum();
            CrosstabRow {
                rank: i + 1,
                name: format!("기관{i}"),
                nationality: "KR".into(),
                by_year,
                total,
            }
        })
        .collect();

    // invariant: per-row year counts sum to the row total
    for row in &rows {
        assert_eq!(row.by_year.values().sum::<u64>(), row.total);
    }

    mocks.es.set_crosstab(CrosstabTable {
        years,
        rows,
        period: "2020-2024".into(),
        total: 75,
        keywords: "특허".into(),
        countries: vec!["KR".into()],
    });

    let state = WorkflowState::new(
        "한국 특허 출원기관 TOP 5 연도별 현황 최근 5년",
        "session-3",
        Level::L3,
        None,
    );
    let final_state = engine::execute_graph(&ctx, state, None).await;

    assert_eq!(final_state.statistics_type, "crosstab_analysis");
    assert!(matches!(
        final_state.es_statistics.get("patent"),
        Some(EsStatistics::Crosstab(table)) if table.rows.len() == 5
    ));
    // SQL was never consulted
    assert_eq!(mocks.sql.call_count(), 0);
    assert!(!final_state.response.is_empty());
}

/// Scenario 4: compound patent+project query splits, executes both, and
/// emits patent results before project results
#[tokio::test]
async fn compound_query_orders_sub_results_by_index() {
    let classification = r#"{
        "query_type": "hybrid",
        "query_subtype": "compound",
        "is_compound": true,
        "keywords": ["AI", "특허"]
    }"#;
    let (ctx, mocks) = build_context(MockLlm::new(vec![
        classification,
        "특허와 연구과제 검색 결과입니다.",
    ]));

    // both domains exist according to the scout
    mocks.es.set_hits(
        "patent",
        vec![es_hit("p1", 2.0, &[("conts_klang_nm", "AI 특허"), ("documentid", "kr1")])],
    );
    mocks.es.set_hits(
        "project",
        vec![es_hit("r1", 2.0, &[("conts_klang_nm", "AI 과제"), ("conts_id", "S1")])],
    );
    // both sub-queries succeed with one row each
    mocks.sql.queue(SqlResult {
        success: true,
        columns: vec!["이름".into()],
        rows: vec![vec![json!("row")]],
        row_count: 1,
        ..Default::default()
    });
    mocks.sql.queue(SqlResult {
        success: true,
        columns: vec!["이름".into()],
        rows: vec![vec![json!("row")]],
        row_count: 1,
        ..Default::default()
    });

    let state = WorkflowState::new("AI 특허와 연구과제", "session-4", Level::L3, None);
    let final_state = engine::execute_graph(&ctx, state, None).await;

    assert!(final_state.is_compound);
    assert_eq!(final_state.sub_query_results.len(), 2);
    // ordering law: results come back in input-index order
    assert_eq!(final_state.sub_query_results[0].index, 0);
    assert_eq!(final_state.sub_query_results[0].entity_types, vec!["patent"]);
    assert_eq!(final_state.sub_query_results[1].index, 1);
    assert_eq!(final_state.sub_query_results[1].entity_types, vec!["project"]);
    // per-entity aggregation for the generator
    assert!(final_state.multi_sql_results.contains_key("patent"));
    assert!(final_state.multi_sql_results.contains_key("project"));
    // shared keywords survive entity-noun stripping
    assert_eq!(final_state.sub_query_results[0].keywords[0], "AI");
    assert!(!final_state.response.is_empty());
}

/// Scenario 5: equipment fast path classifies without the LLM
#[tokio::test]
async fn equipment_fast_path_extracts_core_keyword() {
    let (ctx, mocks) = build_context(MockLlm::new(vec!["보유 기관 목록입니다."]));

    mocks.sql.queue(SqlResult {
        success: true,
        columns: vec!["장비명".into(), "보유기관".into()],
        rows: vec![vec![json!("표면단차측정기"), json!("나노센터")]],
        row_count: 1,
        ..Default::default()
    });

    let state = WorkflowState::new("표면단차측정기 보유 기관", "session-5", Level::L3, None);
    let final_state = engine::execute_graph(&ctx, state, None).await;

    assert!(final_state.is_equipment_query);
    assert_eq!(final_state.entity_types, vec!["equip"]);
    assert_eq!(final_state.query_type.as_str(), "sql");
    assert_eq!(final_state.query_subtype.as_str(), "list");
    assert!(final_state.keywords.contains(&"표면단차측정기".to_string()));
    assert!(final_state.keywords.contains(&"표면단차".to_string()));
    // classification never reached the LLM; only the generator did
    assert_eq!(mocks.llm.call_count(), 1);
    // the executed SQL searches by the device name
    assert!(mocks.sql.executed_sql()[0].contains("표면단차"));
}

/// Scenario 6: unsafe LLM SQL is rejected before execution and the turn
/// still completes with a response
#[tokio::test]
async fn unsafe_sql_is_rejected_without_aborting() {
    let classification = r#"{
        "query_type": "sql",
        "query_subtype": "aggregation",
        "keywords": ["수소연료전지"]
    }"#;
    let (ctx, mocks) = build_context(MockLlm::new(vec![
        classification,
        "SELECT * FROM x; DROP TABLE y;",
    ]));

    let result = ctx
        .run_workflow(
            "수소연료전지 특허 출원인별 집계",
            "session-6",
            Level::L3,
            None,
        )
        .await;

    // the unsafe statement never reached the database
    assert_eq!(mocks.sql.call_count(), 0);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("안전하지 않은 SQL"));
    // no hard abort: a response is still produced
    assert!(!result.response.is_empty());
}

/// Conversation history is bounded across turns
#[tokio::test]
async fn conversation_history_is_bounded() {
    let (ctx, _mocks) = build_context(MockLlm::new(vec![]));

    for turn in 0..15 {
        let _ = ctx
            .run_workflow(&format!("안녕하세요 {turn}"), "session-7", Level::L3, None)
            .await;
        let history = ctx.session_history("session-7");
        assert_eq!(history.len(), ((turn + 1) * 2).min(20));
    }
}
