//! Compiled-in SQL templates
//!
//! Direct templates bypass the LLM entirely for statistically-typed
//! subtypes. Keyword values are escaped and interpolated into ILIKE
//! predicates; organization names are normalized (trailing dots stripped)
//! before grouping so near-duplicate spellings merge.

use rndsearch_core::catalog;

/// Escape a keyword for embedding in a single-quoted SQL literal
pub fn escape_keyword(keyword: &str) -> String {
    keyword.replace('\'', "''")
}

/// `(col ILIKE '%kw1%' OR col ILIKE '%kw2%' ...)` over up to `cap` keywords
pub fn ilike_disjunction(keywords: &[String], column: &str, cap: usize) -> String {
    let predicates: Vec<String> = keywords
        .iter()
        .take(cap)
        .map(|kw| format!("{column} ILIKE '%{}%'", escape_keyword(kw)))
        .collect();
    if predicates.is_empty() {
        "1=1".to_string()
    } else {
        predicates.join(" OR ")
    }
}

/// Multi-column disjunction: every keyword matches any of the columns
pub fn multi_column_disjunction(keywords: &[String], columns: &[&str], cap: usize) -> String {
    let predicates: Vec<String> = keywords
        .iter()
        .take(cap)
        .map(|kw| {
            let escaped = escape_keyword(kw);
            let alternatives: Vec<String> = columns
                .iter()
                .map(|col| format!("{col} ILIKE '%{escaped}%'"))
                .collect();
            format!("({})", alternatives.join(" OR "))
        })
        .collect();
    if predicates.is_empty() {
        "1=1".to_string()
    } else {
        predicates.join(" OR ")
    }
}

/// Direct SQL over ES-validated document ids (at most 50), LIMIT 20
pub fn es_direct_sql(entity: &str, doc_ids: &[String]) -> String {
    let table = catalog::entity_table(entity).unwrap_or("f_patents");
    let id_column = catalog::entity_id_column(entity);
    let select_columns = catalog::entity_select_columns(entity);

    let ids: Vec<String> = doc_ids
        .iter()
        .take(50)
        .map(|id| format!("'{}'", escape_keyword(id)))
        .collect();

    format!(
        "SELECT {select_columns}\nFROM \"{table}\"\nWHERE {id_column} IN ({})\nLIMIT 20",
        ids.join(", ")
    )
}

/// Keyword list SQL for one entity, with optional country and region filters
pub fn list_sql(
    entity: &str,
    keywords: &[String],
    country_code: Option<&str>,
    region_codes: &[&str],
    limit: usize,
) -> String {
    let table = catalog::entity_table(entity).unwrap_or("f_patents");
    let select_columns = catalog::entity_select_columns(entity);
    let search_column = catalog::entity_search_column(entity);

    let mut clauses = vec![format!("({})", ilike_disjunction(keywords, search_column, 6))];

    if entity == "patent" {
        if let Some(code) = country_code {
            if let Some(clause) = catalog::country_filter_clause(code, "") {
                clauses.push(clause);
            }
        }
    }

    if matches!(entity, "equip" | "equipment") && !region_codes.is_empty() {
        if region_codes.len() == 1 {
            clauses.push(format!("region_code = '{}'", region_codes[0]));
        } else {
            let codes: Vec<String> = region_codes.iter().map(|c| format!("'{c}'")).collect();
            clauses.push(format!("region_code IN ({})", codes.join(", ")));
        }
    }

    format!(
        "SELECT {select_columns}\nFROM \"{table}\"\nWHERE {}\nLIMIT {limit}",
        clauses.join("\n  AND ")
    )
}

/// Patent applicant ranking: normalized-org CTE plus a representative patent
pub fn patent_ranking_sql(keywords: &[String], country_clause: Option<&str>) -> String {
    let keyword_conditions = multi_column_disjunction(
        keywords,
        &["p.conts_klang_nm", "p.patent_abstc_ko"],
        5,
    );
    let country = country_clause
        .map(|clause| format!(" AND {clause}"))
        .unwrap_or_default();

    format!(
        r#"WITH org_stats AS (
    SELECT
        RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', '')) as 출원기관,
        COUNT(DISTINCT p.documentid) as 특허수
    FROM "f_patents" p
    JOIN "f_patent_applicants" a ON p.documentid = a.document_id
    WHERE ({keyword_conditions}){country}
    GROUP BY RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', ''))
),
representative_patent AS (
    SELECT DISTINCT ON (RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', '')))
        RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', '')) as 출원기관,
        LEFT(p.conts_klang_nm, 40) as 대표특허
    FROM "f_patents" p
    JOIN "f_patent_applicants" a ON p.documentid = a.document_id
    WHERE ({keyword_conditions}){country}
    ORDER BY RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', '')), p.ptnaplc_ymd DESC
)
SELECT os.출원기관, os.특허수, rp.대표특허
FROM org_stats os
LEFT JOIN representative_patent rp ON os.출원기관 = rp.출원기관
ORDER BY os.특허수 DESC
LIMIT 10"#
    )
}

/// Project performing-organization ranking over the proposal link table
pub fn project_ranking_sql(keywords: &[String]) -> String {
    let keyword_conditions = ilike_disjunction(keywords, "pp.sbjt_nm", 5);

    format!(
        r#"WITH org_stats AS (
    SELECT
        po.orgn_nm as 기관명,
        COUNT(DISTINCT po.sbjt_id) as 과제수
    FROM "f_proposal_orgn" po
    JOIN "f_proposal_profile" pp ON po.sbjt_id = pp.sbjt_id
    WHERE ({keyword_conditions})
      AND po.orgn_nm IS NOT NULL AND po.orgn_nm <> ''
    GROUP BY po.orgn_nm
),
representative_project AS (
    SELECT DISTINCT ON (po.orgn_nm)
        po.orgn_nm as 기관명,
        LEFT(pp.sbjt_nm, 50) || ' (' || COALESCE(pp.ancm_yy, '') || ')' as 대표과제
    FROM "f_proposal_orgn" po
    JOIN "f_proposal_profile" pp ON po.sbjt_id = pp.sbjt_id
    WHERE ({keyword_conditions})
      AND po.orgn_nm IS NOT NULL AND po.orgn_nm <> ''
    ORDER BY po.orgn_nm, pp.ancm_yy DESC NULLS LAST, pp.sbjt_id DESC
)
SELECT os.기관명, os.과제수, rp.대표과제
FROM org_stats os
LEFT JOIN representative_project rp ON os.기관명 = rp.기관명
ORDER BY os.과제수 DESC
LIMIT 20"#
    )
}

/// Citation-impact ranking per applicant, requiring at least two patents
pub fn impact_ranking_sql(keywords: &[String], country_clause: Option<&str>) -> String {
    let keyword_conditions = multi_column_disjunction(
        keywords,
        &["p.conts_mclas_nm", "p.conts_sclas_nm", "p.conts_klang_nm"],
        5,
    );
    let country = country_clause
        .map(|clause| format!(" AND {clause}"))
        .unwrap_or_default();

    format!(
        r#"WITH patent_stats AS (
    SELECT
        p.patent_frst_appn as 출원기관,
        p.patent_frst_appn_ntnlty as 국적,
        COUNT(*) as 대상특허수,
        SUM(CAST(NULLIF(p.citation_cnt, '') AS INTEGER)) as 총피인용,
        AVG(CAST(NULLIF(p.citation_cnt, '') AS FLOAT)) as 평균피인용_0포함,
        AVG(CASE WHEN CAST(NULLIF(p.citation_cnt, '') AS INTEGER) >= 1
            THEN CAST(p.citation_cnt AS FLOAT) END) as 평균피인용_1이상,
        MAX(CAST(NULLIF(p.citation_cnt, '') AS INTEGER)) as 피인용max
    FROM f_patents p
    WHERE ({keyword_conditions}){country}
      AND p.patent_frst_appn IS NOT NULL
    GROUP BY p.patent_frst_appn, p.patent_frst_appn_ntnlty
    HAVING COUNT(*) >= 2
),
max_citation_patent AS (
    SELECT DISTINCT ON (p.patent_frst_appn)
        p.patent_frst_appn,
        p.conts_klang_nm as 대표특허명
    FROM f_patents p
    WHERE ({keyword_conditions}){country}
      AND p.patent_frst_appn IS NOT NULL
    ORDER BY p.patent_frst_appn, CAST(NULLIF(p.citation_cnt, '') AS INTEGER) DESC NULLS LAST
)
SELECT
    ps.출원기관,
    ps.국적,
    ps.대상특허수,
    COALESCE(ps.총피인용, 0) as 총피인용,
    ROUND(COALESCE(ps.평균피인용_0포함, 0)::numeric, 2) as "평균피인용(0포함)",
    ROUND(ps.평균피인용_1이상::numeric, 2) as "평균피인용(1이상)",
    COALESCE(ps.피인용max, 0) as 피인용max,
    LEFT(mp.대표특허명, 40) as "대표특허명(피인용max)"
FROM patent_stats ps
LEFT JOIN max_citation_patent mp ON ps.출원기관 = mp.patent_frst_appn
ORDER BY ps.평균피인용_0포함 DESC NULLS LAST
LIMIT 10"#
    )
}

/// One half of the nationality split ranking; `domestic` picks KR vs. non-KR
pub fn nationality_ranking_sql(
    keywords: &[String],
    country_clause: Option<&str>,
    domestic: bool,
) -> String {
    let keyword_conditions = multi_column_disjunction(
        keywords,
        &["p.conts_mclas_nm", "p.conts_sclas_nm", "p.conts_klang_nm"],
        5,
    );
    let country = country_clause
        .map(|clause| format!(" AND {clause}"))
        .unwrap_or_default();
    let nationality_filter = if domestic {
        "p.patent_frst_appn_ntnlty = 'KR'"
    } else {
        "p.patent_frst_appn_ntnlty != 'KR'"
    };

    format!(
        r#"WITH nationality_stats AS (
    SELECT
        p.patent_frst_appn as 기관명,
        p.patent_frst_appn_ntnlty as 국적,
        COUNT(*) as 대상특허수,
        MAX(CAST(NULLIF(p.citation_cnt, '') AS INTEGER)) as 최대피인용수,
        ROUND(AVG(CAST(NULLIF(p.citation_cnt, '') AS FLOAT))::numeric, 2) as 평균피인용수,
        ROUND(AVG(CAST(NULLIF(p.claim_cnt, '') AS FLOAT))::numeric, 1) as 평균청구항수,
        MAX(p.ptnaplc_ymd) as 최근출원일
    FROM f_patents p
    WHERE ({keyword_conditions}){country}
      AND {nationality_filter}
      AND p.patent_frst_appn IS NOT NULL
    GROUP BY p.patent_frst_appn, p.patent_frst_appn_ntnlty
    HAVING COUNT(*) >= 2
),
representative AS (
    SELECT DISTINCT ON (p.patent_frst_appn)
        p.patent_frst_appn,
        p.conts_klang_nm as 대표특허명
    FROM f_patents p
    WHERE ({keyword_conditions}){country}
      AND {nationality_filter}
      AND p.patent_frst_appn IS NOT NULL
    ORDER BY p.patent_frst_appn, CAST(NULLIF(p.citation_cnt, '') AS INTEGER) DESC NULLS LAST
)
SELECT ns.기관명, ns.국적, ns.대상특허수,
       COALESCE(ns.최대피인용수, 0) as 최대피인용수,
       COALESCE(ns.평균피인용수, 0) as 평균피인용수,
       COALESCE(ns.평균청구항수, 0) as 평균청구항수,
       ns.최근출원일,
       LEFT(r.대표특허명, 40) as "대표특허명(피인용max)"
FROM nationality_stats ns
LEFT JOIN representative r ON ns.기관명 = r.patent_frst_appn
ORDER BY ns.대상특허수 DESC
LIMIT 10"#
    )
}

/// Proposal performing organizations with role breakdown (collaboration)
pub fn proposal_orgs_sql(keywords: &[String]) -> String {
    let outer_conditions = ilike_disjunction(keywords, "p.sbjt_nm", 3);
    let inner_conditions = ilike_disjunction(keywords, "p2.sbjt_nm", 3);

    format!(
        r#"SELECT
    os.orgn_nm as 기관명,
    os.수행횟수,
    os.주관,
    os.참여,
    os.협력,
    (
        SELECT p2.sbjt_nm
        FROM f_proposal_profile p2
        JOIN f_proposal_orgn po2 ON p2.sbjt_id = po2.sbjt_id
        WHERE po2.orgn_nm = os.orgn_nm AND ({inner_conditions})
        ORDER BY p2.sbjt_id DESC
        LIMIT 1
    ) as 최근과제명
FROM (
    SELECT
        po.orgn_nm,
        COUNT(DISTINCT p.sbjt_id) as 수행횟수,
        SUM(CASE WHEN po.ptcp_orgn_role_se = 'MK2002' THEN 1 ELSE 0 END) as 주관,
        SUM(CASE WHEN po.ptcp_orgn_role_se = 'MK2003' THEN 1 ELSE 0 END) as 참여,
        SUM(CASE WHEN po.ptcp_orgn_role_se = 'MK2004' THEN 1 ELSE 0 END) as 협력
    FROM f_proposal_profile p
    JOIN f_proposal_orgn po ON p.sbjt_id = po.sbjt_id
    WHERE ({outer_conditions})
      AND po.orgn_nm IS NOT NULL
      AND LENGTH(po.orgn_nm) > 1
      AND po.ptcp_orgn_role_se IN ('MK2002', 'MK2003', 'MK2004')
    GROUP BY po.orgn_nm
    HAVING COUNT(DISTINCT p.sbjt_id) >= 1
) os
ORDER BY os.수행횟수 DESC
LIMIT 15"#
    )
}

/// Patent-holding organizations for collaboration recommendations
pub fn patent_orgs_sql(keywords: &[String]) -> String {
    let outer_conditions = ilike_disjunction(keywords, "p.conts_klang_nm", 3);
    let inner_conditions = ilike_disjunction(keywords, "p2.conts_klang_nm", 3);

    format!(
        r#"SELECT
    ps.applicant_name as 기관명,
    ps.applicant_country as 국가,
    ps.특허수,
    (
        SELECT p2.conts_klang_nm
        FROM f_patents p2
        JOIN f_patent_applicants a2 ON p2.documentid = a2.document_id
        WHERE a2.applicant_name = ps.applicant_name AND ({inner_conditions})
        ORDER BY p2.documentid DESC
        LIMIT 1
    ) as 대표특허명
FROM (
    SELECT
        a.applicant_name,
        a.applicant_country,
        COUNT(DISTINCT p.documentid) as 특허수
    FROM f_patents p
    JOIN f_patent_applicants a ON p.documentid = a.document_id
    WHERE ({outer_conditions})
      AND a.applicant_name IS NOT NULL
      AND LENGTH(a.applicant_name) > 1
    GROUP BY a.applicant_name, a.applicant_country
    HAVING COUNT(DISTINCT p.documentid) >= 1
) ps
ORDER BY ps.특허수 DESC
LIMIT 15"#
    )
}

/// Evaluation scoring items for matching announcements
pub fn evalp_score_sql(keywords: &[String]) -> String {
    let conditions = ilike_disjunction(keywords, "ancm_nm", 3);
    format!(
        "SELECT id as 평가표ID, ancm_nm as 공고명, evalp_item as 평가항목, evalp_score as 배점\n\
         FROM \"f_ancm_evalp\"\nWHERE ({conditions})\nORDER BY id, evalp_score DESC\nLIMIT 50"
    )
}

/// Advantage / penalty conditions for matching announcements
pub fn evalp_pref_sql(keywords: &[String]) -> String {
    let conditions = ilike_disjunction(keywords, "ancm_nm", 3);
    format!(
        "SELECT id as 공고ID, ancm_nm as 공고명, prcnd_desc as 우대감점조건, ancm_ymd as 공고일\n\
         FROM \"f_ancm_prcnd\"\nWHERE ({conditions})\nORDER BY ancm_ymd DESC\nLIMIT 30"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rndsearch_storage::validate_sql;

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_ilike_disjunction_escapes_quotes() {
        let clause = ilike_disjunction(&keywords(&["o'neil"]), "name", 3);
        assert_eq!(clause, "name ILIKE '%o''neil%'");
    }

    #[test]
    fn test_empty_keywords_yield_tautology() {
        assert_eq!(ilike_disjunction(&[], "name", 3), "1=1");
    }

    #[test]
    fn test_all_templates_pass_the_safety_guard() {
        let kw = keywords(&["수소연료전지", "PEMFC"]);
        let ids = vec!["kr001".to_string(), "kr002".to_string()];
        let templates = vec![
            es_direct_sql("patent", &ids),
            list_sql("patent", &kw, Some("US"), &[], 10),
            list_sql("equip", &kw, None, &["31"], 10),
            patent_ranking_sql(&kw, Some("p.ntcd = 'KR'")),
            project_ranking_sql(&kw),
            impact_ranking_sql(&kw, None),
            nationality_ranking_sql(&kw, None, true),
            nationality_ranking_sql(&kw, None, false),
            proposal_orgs_sql(&kw),
            patent_orgs_sql(&kw),
            evalp_score_sql(&kw),
            evalp_pref_sql(&kw),
        ];
        for sql in templates {
            assert!(validate_sql(&sql).is_ok(), "template rejected:\n{sql}");
        }
    }

    #[test]
    fn test_patent_ranking_normalizes_org_names() {
        let sql = patent_ranking_sql(&keywords(&["반도체"]), None);
        assert!(sql.contains("RTRIM(REGEXP_REPLACE(a.applicant_name, '[.]+$', ''))"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("DISTINCT ON"));
    }

    #[test]
    fn test_country_scrub_law_for_us_patents() {
        // "미국" must surface as exactly one ntcd predicate and never as an
        // ILIKE pattern
        let kw = keywords(&["수소연료전지"]);
        let sql = list_sql("patent", &kw, Some("US"), &[], 10);
        assert_eq!(sql.matches("ntcd = 'US'").count(), 1);
        assert!(!sql.contains("ILIKE '%미국%'"));
    }

    #[test]
    fn test_es_direct_sql_caps_ids() {
        let ids: Vec<String> = (0..80).map(|i| format!("id{i}")).collect();
        let sql = es_direct_sql("patent", &ids);
        assert!(sql.contains("'id49'"));
        assert!(!sql.contains("'id50'"));
        assert!(sql.contains("LIMIT 20"));
    }
}
