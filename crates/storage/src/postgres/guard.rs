//! Pre-execution SQL safety validation
//!
//! Every SQL string that did not come from a compiled-in template passes
//! through here before touching the database. The rules are deliberately
//! blunt: read-only statements only, no comment markers, one statement.

use regex::Regex;
use std::sync::OnceLock;

/// Forbidden keyword patterns (word-boundary matched, case-insensitive)
const DANGEROUS_PATTERNS: &[&str] = &[
    r"(?i)\bDROP\b",
    r"(?i)\bDELETE\b",
    r"(?i)\bUPDATE\b",
    r"(?i)\bINSERT\b",
    r"(?i)\bTRUNCATE\b",
    r"(?i)\bALTER\b",
    r"(?i)\bCREATE\b",
    r"(?i)\bGRANT\b",
    r"(?i)\bREVOKE\b",
    r"(?i)\bEXEC\b",
    r"(?i)\bEXECUTE\b",
    r"(?i)\bxp_",
    r"(?i)\bsp_",
];

fn dangerous_regexes() -> &'static Vec<Regex> {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        DANGEROUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static pattern"))
            .collect()
    })
}

/// Validate a SQL statement before execution.
///
/// Accepts iff the uppercased statement starts with `SELECT` or `WITH`
/// (a `WITH` must eventually contain a `SELECT`), contains none of the
/// forbidden keywords, no comment markers, and at most one semicolon.
pub fn validate_sql(sql: &str) -> Result<(), String> {
    let sql_upper = sql.trim().to_uppercase();

    if !(sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH")) {
        return Err("SELECT 쿼리만 허용됩니다 (CTE WITH 절 포함)".to_string());
    }

    if sql_upper.starts_with("WITH") && !sql_upper.contains("SELECT") {
        return Err("WITH 절 뒤에 SELECT 쿼리가 필요합니다".to_string());
    }

    for regex in dangerous_regexes() {
        if regex.is_match(sql) {
            return Err(format!("위험한 키워드 감지: {}", regex.as_str()));
        }
    }

    if sql.contains("--") || sql.contains("/*") || sql.contains("*/") {
        return Err("SQL 주석은 허용되지 않습니다".to_string());
    }

    if sql.matches(';').count() > 1 {
        return Err("다중 쿼리는 허용되지 않습니다".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_select() {
        assert!(validate_sql("SELECT * FROM f_patents LIMIT 10").is_ok());
        assert!(validate_sql("  select conts_id from f_projects;").is_ok());
    }

    #[test]
    fn test_accepts_cte() {
        assert!(validate_sql(
            "WITH org_stats AS (SELECT 1) SELECT * FROM org_stats"
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_with_without_select() {
        assert!(validate_sql("WITH x AS (VALUES (1)) TABLE x").is_err());
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(validate_sql("DELETE FROM f_patents").is_err());
        assert!(validate_sql("SHOW TABLES").is_err());
    }

    #[test]
    fn test_rejects_dangerous_keywords() {
        for sql in [
            "SELECT 1; DROP TABLE f_patents",
            "SELECT * FROM t WHERE x = 'a'; DELETE FROM t",
            "SELECT updatetime FROM t WHERE 1=1 AND UPDATE",
        ] {
            assert!(validate_sql(sql).is_err(), "should reject: {sql}");
        }
        // keyword inside a longer identifier is fine (word boundary)
        assert!(validate_sql("SELECT dropped_cnt FROM stats").is_ok());
    }

    #[test]
    fn test_rejects_comments() {
        assert!(validate_sql("SELECT 1 -- hidden").is_err());
        assert!(validate_sql("SELECT /* evil */ 1").is_err());
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(validate_sql("SELECT * FROM x; SELECT * FROM y;").is_err());
        // single trailing semicolon is fine
        assert!(validate_sql("SELECT * FROM x;").is_ok());
    }

    /// Safety law: accept <=> starts with SELECT/WITH, no forbidden keyword,
    /// no comments, at most one semicolon
    #[test]
    fn test_safety_acceptance_law() {
        let cases = [
            ("SELECT a FROM b", true),
            ("WITH c AS (SELECT 1) SELECT * FROM c", true),
            ("SELECT a FROM b;", true),
            ("INSERT INTO b VALUES (1)", false),
            ("SELECT a FROM b; SELECT 1;", false),
            ("SELECT a -- c", false),
            ("SELECT a /* c */", false),
            ("SELECT * FROM x WHERE exec_count > 1", true),
            ("SELECT * FROM x; EXEC sp_who", false),
        ];
        for (sql, expected) in cases {
            assert_eq!(validate_sql(sql).is_ok(), expected, "case: {sql}");
        }
    }
}
