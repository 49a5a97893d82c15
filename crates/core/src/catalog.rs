//! Static schema catalog and domain maps
//!
//! Everything here is compiled-in data. The catalog is never discovered from
//! the database at runtime; SQL generation and the ES scout both read from
//! these tables.

use std::collections::HashMap;

/// Domains probed by the ES scout
pub const ES_SCOUT_DOMAINS: &[&str] = &["patent", "project", "equipment", "proposal"];

/// Entity type -> ES domain name
pub fn domain_for_entity(entity: &str) -> &str {
    match entity {
        "equip" => "equipment",
        other => other,
    }
}

/// ES domain name -> entity type
pub fn entity_for_domain(domain: &str) -> &str {
    match domain {
        "equipment" => "equip",
        other => other,
    }
}

/// Entity type -> primary fact table
pub fn entity_table(entity: &str) -> Option<&'static str> {
    match entity {
        "patent" | "applicant" | "ipc" => Some("f_patents"),
        "project" => Some("f_projects"),
        "equip" | "equipment" | "org" | "gis" => Some("f_equipments"),
        "proposal" | "tech" => Some("f_proposal_profile"),
        "evalp" | "evalp_detail" => Some("f_ancm_evalp"),
        "evalp_pref" | "ancm" => Some("f_ancm_prcnd"),
        _ => None,
    }
}

/// Entity type -> id column used in `WHERE <id> IN (...)` direct SQL
pub fn entity_id_column(entity: &str) -> &'static str {
    match entity {
        "patent" | "applicant" | "ipc" => "documentid",
        "project" | "equip" | "equipment" | "org" => "conts_id",
        "proposal" | "tech" => "sbjt_id",
        _ => "id",
    }
}

/// Entity type -> dense-vector collections
pub fn entity_collections(entity: &str) -> &'static [&'static str] {
    match entity {
        "patent" | "applicant" | "ipc" => &["patents_v3_collection"],
        "project" => &["projects_v3_collection"],
        "equip" | "equipment" | "org" | "gis" => &["equipments_v3_collection"],
        "tech" | "k12" | "6t" => &["tech_classifications_v3_collection"],
        "proposal" | "evalp" | "evalp_detail" | "evalp_pref" | "ancm" => {
            &["proposals_v3_collection"]
        }
        _ => &[],
    }
}

/// Collections searched when no entity type is known yet
pub const DEFAULT_COLLECTIONS: &[&str] = &["patents_v3_collection", "projects_v3_collection"];

/// Collection name -> entity type (suffix match over the family name)
pub fn collection_entity_type(collection: &str) -> &'static str {
    if collection.contains("patents") {
        "patent"
    } else if collection.contains("projects") {
        "project"
    } else if collection.contains("equipments") {
        "equip"
    } else if collection.contains("tech_classifications") {
        "tech"
    } else if collection.contains("proposals") {
        "proposal"
    } else {
        "unknown"
    }
}

/// Entity type -> main text column for ILIKE predicates
pub fn entity_search_column(entity: &str) -> &'static str {
    match entity {
        "patent" | "applicant" | "ipc" => "conts_klang_nm",
        "project" | "equip" | "equipment" | "org" => "conts_klang_nm",
        "proposal" | "tech" => "sbjt_nm",
        _ => "conts_klang_nm",
    }
}

/// Entity type -> ES title / description fields for the scout match filter
pub fn domain_title_field(domain: &str) -> &'static str {
    match domain {
        "proposal" => "sbjt_nm",
        _ => "conts_klang_nm",
    }
}

pub fn domain_description_field(domain: &str) -> &'static str {
    match domain {
        "equipment" => "equip_desc",
        "proposal" => "sbjt_nm",
        _ => "conts_klang_nm",
    }
}

/// ES domain -> id field inside document sources
pub fn domain_id_field(domain: &str) -> &'static str {
    match domain {
        "patent" => "documentid",
        "project" | "equipment" => "conts_id",
        "proposal" => "sbjt_id",
        _ => "id",
    }
}

/// Entity type -> Korean display label
pub fn entity_label(entity: &str) -> &'static str {
    match entity {
        "patent" => "특허",
        "project" => "연구과제",
        "equip" | "equipment" => "장비",
        "proposal" => "제안서",
        "evalp" => "평가표",
        "evalp_detail" => "평가표 세부항목",
        "evalp_pref" => "우대조건",
        "ancm" => "공고",
        "tech" => "기술분류",
        "org" => "기관",
        _ => "기타",
    }
}

/// SELECT column list for the ES-driven direct SQL path
pub fn entity_select_columns(entity: &str) -> &'static str {
    match entity {
        "patent" => {
            "documentid as 특허번호, conts_klang_nm as 특허명, ipc_main as IPC분류, \
             LEFT(ptnaplc_ymd, 4) as 출원년도, ntcd as 등록국가, patent_frst_appn as 최초출원인"
        }
        "project" => {
            "conts_id as 과제ID, conts_klang_nm as 과제명, ancm_yy as 공고연도, \
             tot_rsrh_blgn_amt as 연구비, bucl_nm as 사업분류"
        }
        "equip" | "equipment" => {
            "conts_id as 장비ID, conts_klang_nm as 장비명, org_nm as 보유기관, \
             conts_mclas_nm as 분야, conts_sclas_nm as 장비분류"
        }
        "proposal" => "sbjt_id as 제안서ID, sbjt_nm as 제안서명, orgn_nm as 기관명, dvlp_gole as 개발목표",
        _ => "*",
    }
}

/// Fixed country-token map; tokens are scrubbed from keywords and only the
/// codes survive in structured keywords
pub const COUNTRY_KEYWORDS: &[(&str, &[&str])] = &[
    ("KR", &["한국", "국내", "대한민국", "자국", "kr", "KR"]),
    ("US", &["미국", "USA", "us", "US"]),
    ("JP", &["일본", "jp", "JP"]),
    ("CN", &["중국", "cn", "CN"]),
    ("EU", &["유럽", "eu", "EU"]),
    ("NOT_KR", &["해외", "타국", "외국"]),
];

/// Country code detected in raw text, if any
pub fn detect_country_code(text: &str) -> Option<&'static str> {
    for (code, tokens) in COUNTRY_KEYWORDS {
        if tokens.iter().any(|t| text.contains(t)) {
            return Some(code);
        }
    }
    None
}

/// Every raw country token, for keyword scrubbing
pub fn all_country_tokens() -> Vec<&'static str> {
    COUNTRY_KEYWORDS
        .iter()
        .flat_map(|(_, tokens)| tokens.iter().copied())
        .collect()
}

/// Country code -> SQL predicate over the registration-country column.
/// An empty alias yields an unqualified column reference.
pub fn country_filter_clause(code: &str, alias: &str) -> Option<String> {
    let column = if alias.is_empty() {
        "ntcd".to_string()
    } else {
        format!("{alias}.ntcd")
    };
    match code {
        "NOT_KR" => Some(format!("{column} != 'KR'")),
        "KR" | "US" | "JP" | "CN" | "EU" => Some(format!("{column} = '{code}'")),
        _ => None,
    }
}

/// Korean region name -> PNU prefix code
pub const REGION_CODES: &[(&str, &str)] = &[
    ("서울", "11"),
    ("부산", "21"),
    ("대구", "22"),
    ("인천", "23"),
    ("광주", "24"),
    ("대전", "25"),
    ("울산", "26"),
    ("세종", "29"),
    ("경기", "31"),
    ("강원", "32"),
    ("충북", "33"),
    ("충남", "34"),
    ("전북", "35"),
    ("전남", "36"),
    ("경북", "37"),
    ("경남", "38"),
    ("제주", "39"),
];

pub fn region_code(region: &str) -> Option<&'static str> {
    REGION_CODES
        .iter()
        .find(|(name, _)| region.contains(name) || name.contains(region))
        .map(|(_, code)| *code)
}

/// Region names detected anywhere in the text
pub fn detect_regions(text: &str) -> Vec<String> {
    REGION_CODES
        .iter()
        .filter(|(name, _)| text.contains(name))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Entity-type nouns that are never search keywords
pub const ENTITY_TYPE_STOPWORDS: &[&str] = &[
    "특허",
    "출원",
    "발명",
    "등록",
    "특허권",
    "지식재산",
    "명세서",
    "과제",
    "연구과제",
    "프로젝트",
    "연구",
    "연구개발",
    "장비",
    "기기",
    "설비",
    "인프라",
    "시설",
    "연구장비",
    "실험장비",
    "공고",
    "사업공고",
    "입찰",
    "모집",
    "제안서",
    "제안",
    "사업계획",
    "검색",
    "조회",
    "목록",
    "리스트",
    "찾아",
    "알려",
];

/// Explicit entity nouns -> entity type, for the analyzer override
pub const EXPLICIT_ENTITY_KEYWORDS: &[(&str, &[&str])] = &[
    ("patent", &["특허", "출원", "발명", "등록특허"]),
    ("project", &["과제", "연구과제", "프로젝트", "R&D"]),
    ("equip", &["장비", "측정기", "시험기", "분석기", "현미경", "스캐너"]),
    ("proposal", &["제안서", "기업 프로필", "기업 역량"]),
];

/// Static description of one catalog table
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
    pub joins: &'static [&'static str],
}

/// The full table catalog shown to the SQL-generating LLM
pub const SCHEMA: &[TableSchema] = &[
    TableSchema {
        name: "f_patents",
        description: "특허 원문 (등록/출원)",
        columns: &[
            ("documentid", "특허 문서 ID"),
            ("conts_klang_nm", "특허명 (한글)"),
            ("patent_abstc_ko", "요약 (한글)"),
            ("ipc_main", "IPC 주분류"),
            ("ptnaplc_ymd", "출원일 (yyyyMMdd, TEXT)"),
            ("ntcd", "등록국가 코드 (KR/US/JP/CN/EU)"),
            ("patent_frst_appn", "최초 출원인"),
            ("patent_frst_appn_ntnlty", "최초 출원인 국적"),
            ("citation_cnt", "피인용 수 (TEXT)"),
            ("claim_cnt", "청구항 수 (TEXT)"),
            ("conts_mclas_nm", "기술 중분류"),
            ("conts_sclas_nm", "기술 소분류"),
        ],
        joins: &["f_patent_applicants ON f_patents.documentid = f_patent_applicants.document_id"],
    },
    TableSchema {
        name: "f_patent_applicants",
        description: "특허 출원인",
        columns: &[
            ("document_id", "특허 문서 ID"),
            ("applicant_name", "출원인명"),
            ("applicant_country", "출원인 국적"),
        ],
        joins: &[],
    },
    TableSchema {
        name: "f_projects",
        description: "연구과제",
        columns: &[
            ("conts_id", "과제 ID"),
            ("conts_klang_nm", "과제명 (한글)"),
            ("conts_ymd", "과제 연도 (yyyyMMdd, TEXT)"),
            ("ancm_yy", "공고연도"),
            ("tot_rsrh_blgn_amt", "총 연구비"),
            ("bucl_nm", "사업분류"),
            ("conts_rsrh_org_nm", "수행기관명"),
        ],
        joins: &[],
    },
    TableSchema {
        name: "f_equipments",
        description: "연구장비",
        columns: &[
            ("conts_id", "장비 ID"),
            ("conts_klang_nm", "장비명 (한글)"),
            ("equip_desc", "장비 설명"),
            ("org_nm", "보유기관"),
            ("region_code", "지역 코드 (PNU 앞 2자리)"),
            ("conts_mclas_nm", "분야"),
            ("conts_sclas_nm", "장비분류"),
        ],
        joins: &[],
    },
    TableSchema {
        name: "f_proposal_profile",
        description: "제안서 / 기업 프로필",
        columns: &[
            ("sbjt_id", "제안서 ID"),
            ("sbjt_nm", "제안서명"),
            ("orgn_nm", "기관명"),
            ("ancm_yy", "공고연도"),
            ("dvlp_gole", "개발 목표"),
        ],
        joins: &["f_proposal_orgn ON f_proposal_profile.sbjt_id = f_proposal_orgn.sbjt_id"],
    },
    TableSchema {
        name: "f_proposal_orgn",
        description: "제안서 참여기관",
        columns: &[
            ("sbjt_id", "제안서 ID"),
            ("orgn_nm", "기관명"),
            ("ptcp_orgn_role_se", "역할 코드 (MK2002 주관 / MK2003 참여 / MK2004 협력)"),
        ],
        joins: &[],
    },
    TableSchema {
        name: "f_ancm_evalp",
        description: "공고 평가표 / 배점표",
        columns: &[
            ("id", "평가표 ID"),
            ("ancm_nm", "공고명"),
            ("evalp_item", "평가 항목"),
            ("evalp_score", "배점"),
        ],
        joins: &[],
    },
    TableSchema {
        name: "f_ancm_prcnd",
        description: "공고문 / 우대·감점 조건",
        columns: &[
            ("id", "공고 ID"),
            ("ancm_nm", "공고명"),
            ("prcnd_desc", "우대/감점 조건 내용"),
            ("ancm_ymd", "공고일 (yyyyMMdd, TEXT)"),
        ],
        joins: &[],
    },
];

/// Tables relevant to the given entity types, in catalog order
pub fn related_tables(entity_types: &[String]) -> Vec<&'static str> {
    let mut tables = Vec::new();
    for entity in entity_types {
        if let Some(table) = entity_table(entity) {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        if entity == "patent" && !tables.contains(&"f_patent_applicants") {
            tables.push("f_patent_applicants");
        }
        if entity == "proposal" && !tables.contains(&"f_proposal_orgn") {
            tables.push("f_proposal_orgn");
        }
    }
    tables
}

/// Compact schema snippet for the SQL-generation prompt
pub fn format_schema_for_llm(tables: &[&str]) -> String {
    let mut out = String::new();
    for schema in SCHEMA {
        if !tables.is_empty() && !tables.contains(&schema.name) {
            continue;
        }
        out.push_str(&format!("## {} - {}\n", schema.name, schema.description));
        for (col, desc) in schema.columns {
            out.push_str(&format!("- {col}: {desc}\n"));
        }
        for join in schema.joins {
            out.push_str(&format!("- JOIN {join}\n"));
        }
        out.push('\n');
    }
    out
}

/// Entity label lookup with owned fallback for ad-hoc labels
pub fn entity_label_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("patent", "특허"),
        ("project", "연구과제"),
        ("equip", "장비"),
        ("proposal", "제안서"),
        ("evalp", "평가표"),
        ("evalp_pref", "우대조건"),
        ("ancm", "공고"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_domain_roundtrip() {
        assert_eq!(domain_for_entity("equip"), "equipment");
        assert_eq!(entity_for_domain("equipment"), "equip");
        assert_eq!(domain_for_entity("patent"), "patent");
        assert_eq!(entity_for_domain("patent"), "patent");
    }

    #[test]
    fn test_country_detection_and_scrub_tokens() {
        assert_eq!(detect_country_code("미국 특허 알려줘"), Some("US"));
        assert_eq!(detect_country_code("해외 등록 현황"), Some("NOT_KR"));
        assert_eq!(detect_country_code("수소연료전지"), None);
        assert!(all_country_tokens().contains(&"한국"));
    }

    #[test]
    fn test_country_filter_clause() {
        assert_eq!(
            country_filter_clause("US", "p").as_deref(),
            Some("p.ntcd = 'US'")
        );
        assert_eq!(
            country_filter_clause("NOT_KR", "p").as_deref(),
            Some("p.ntcd != 'KR'")
        );
        assert!(country_filter_clause("ZZ", "p").is_none());
    }

    #[test]
    fn test_region_codes() {
        assert_eq!(region_code("경기"), Some("31"));
        assert_eq!(region_code("강원도"), Some("32"));
        assert!(region_code("화성").is_none());
        assert_eq!(detect_regions("경기 지역 표면단차측정기 보유 기관"), vec!["경기"]);
    }

    #[test]
    fn test_schema_snippet_filters_tables() {
        let snippet = format_schema_for_llm(&["f_patents"]);
        assert!(snippet.contains("f_patents"));
        assert!(!snippet.contains("f_projects"));

        let all = format_schema_for_llm(&[]);
        assert!(all.contains("f_projects"));
    }

    #[test]
    fn test_related_tables_includes_link_tables() {
        let tables = related_tables(&["patent".to_string(), "proposal".to_string()]);
        assert!(tables.contains(&"f_patents"));
        assert!(tables.contains(&"f_patent_applicants"));
        assert!(tables.contains(&"f_proposal_orgn"));
    }
}
