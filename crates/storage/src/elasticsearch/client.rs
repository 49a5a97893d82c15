use crate::{EsApi, EsHit};
use async_trait::async_trait;
use chrono::Datelike;
use rndsearch_core::config::EsConfig;
use rndsearch_core::{
    CrosstabRow, CrosstabTable, Error, RankingRow, Result, StatsBucket, StatsBucketSet,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Elasticsearch client over the REST API
pub struct EsClient {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl EsClient {
    pub fn new(config: &EsConfig) -> Result<Self> {
        info!("Initializing Elasticsearch client");
        info!("  URL: {}", config.url);
        info!("  Enabled: {}", config.enabled);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::storage(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        })
    }

    fn index(entity_type: &str) -> &'static str {
        match entity_type {
            "patent" => "patents",
            "project" => "projects",
            "equip" | "equipment" => "equipments",
            "proposal" => "proposals",
            _ => "patents",
        }
    }

    fn search_fields(entity_type: &str) -> Vec<&'static str> {
        match entity_type {
            "patent" => vec!["conts_klang_nm^3", "patent_abstc_ko"],
            "project" => vec!["conts_klang_nm^3", "bucl_nm"],
            "equip" | "equipment" => vec!["conts_klang_nm^3", "equip_desc"],
            "proposal" => vec!["sbjt_nm^3", "dvlp_gole"],
            _ => vec!["conts_klang_nm^3"],
        }
    }

    fn date_field(entity_type: &str) -> &'static str {
        match entity_type {
            "patent" => "ptnaplc_ymd",
            "proposal" => "ancm_ymd",
            _ => "conts_ymd",
        }
    }

    fn applicant_field(entity_type: &str) -> &'static str {
        match entity_type {
            "project" => "conts_rsrh_org_nm.keyword",
            _ => "patent_frst_appn.keyword",
        }
    }

    fn build_query(query: &str, entity_type: &str) -> Value {
        if query.trim().is_empty() {
            return json!({ "match_all": {} });
        }
        json!({
            "multi_match": {
                "query": query,
                "fields": Self::search_fields(entity_type),
                "type": "best_fields",
                "operator": "or",
            }
        })
    }

    async fn search_body(&self, index: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::storage(format!("ES request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::storage(format!("ES error: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| Error::storage(format!("Bad ES response: {e}")))
    }

    fn parse_hits(response: &Value) -> Vec<EsHit> {
        response["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .map(|hit| EsHit {
                        id: hit["_id"].as_str().unwrap_or_default().to_string(),
                        score: hit["_score"].as_f64().unwrap_or(0.0) as f32,
                        source: hit["_source"]
                            .as_object()
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EsApi for EsClient {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.client.get(&self.base_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("ES availability probe failed: {e}");
                false
            }
        }
    }

    async fn search(
        &self,
        query: &str,
        entity_type: &str,
        limit: usize,
        include_highlight: bool,
    ) -> Result<Vec<EsHit>> {
        let mut body = json!({
            "query": Self::build_query(query, entity_type),
            "size": limit,
        });

        if include_highlight {
            let fields: serde_json::Map<String, Value> = Self::search_fields(entity_type)
                .iter()
                .map(|f| (f.trim_end_matches("^3").to_string(), json!({})))
                .collect();
            body["highlight"] = json!({ "fields": fields });
        }

        let response = self.search_body(Self::index(entity_type), body).await?;
        Ok(Self::parse_hits(&response))
    }

    async fn multi_search(
        &self,
        query: &str,
        entity_types: &[String],
        limit_per_type: usize,
    ) -> Result<HashMap<String, Vec<EsHit>>> {
        let mut ndjson = String::new();
        for entity_type in entity_types {
            ndjson.push_str(&json!({ "index": Self::index(entity_type) }).to_string());
            ndjson.push('\n');
            ndjson.push_str(
                &json!({
                    "query": Self::build_query(query, entity_type),
                    "size": limit_per_type,
                })
                .to_string(),
            );
            ndjson.push('\n');
        }

        let url = format!("{}/_msearch", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await
            .map_err(|e| Error::storage(format!("ES msearch failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::storage(format!("ES msearch error: {e}")))?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::storage(format!("Bad ES msearch response: {e}")))?;

        let mut results = HashMap::new();
        let empty = Vec::new();
        let responses = parsed["responses"].as_array().unwrap_or(&empty);
        for (i, entity_type) in entity_types.iter().enumerate() {
            let hits = responses
                .get(i)
                .map(Self::parse_hits)
                .unwrap_or_default();
            results.insert(entity_type.clone(), hits);
        }
        Ok(results)
    }

    async fn aggregate(
        &self,
        query: &str,
        entity_type: &str,
        aggregations: Value,
    ) -> Result<Value> {
        let body = json!({
            "query": Self::build_query(query, entity_type),
            "size": 0,
            "aggs": aggregations,
        });
        let response = self.search_body(Self::index(entity_type), body).await?;
        Ok(response["aggregations"].clone())
    }

    async fn entity_statistics(
        &self,
        entity_type: &str,
        keywords: Option<&str>,
        countries: &[String],
        start_year: Option<i32>,
        end_year: Option<i32>,
        group_by: &str,
    ) -> Result<StatsBucketSet> {
        let start = Instant::now();
        let current_year = chrono::Utc::now().year();
        let start_year = start_year.unwrap_or(current_year - 10);
        let end_year = end_year.unwrap_or(current_year);

        let date_field = Self::date_field(entity_type);
        let mut filter_clauses = vec![json!({
            "range": {
                date_field: {
                    "gte": format!("{start_year}0101"),
                    "lte": format!("{end_year}1231"),
                    "format": "yyyyMMdd",
                }
            }
        })];

        if !countries.is_empty() && entity_type == "patent" {
            filter_clauses.push(json!({ "terms": { "ntcd": countries } }));
        }

        let must_clause = match keywords {
            Some(kw) if !kw.trim().is_empty() => json!({
                "multi_match": {
                    "query": kw,
                    "fields": Self::search_fields(entity_type),
                    "type": "best_fields",
                    "operator": "or",
                }
            }),
            _ => json!({ "match_all": {} }),
        };

        let aggregations = match group_by {
            "country" => json!({ "by_group": { "terms": { "field": "ntcd", "size": 20 } } }),
            "ipc" => json!({ "by_group": { "terms": { "field": "ipc_main", "size": 20 } } }),
            "applicant" => json!({
                "by_group": { "terms": { "field": Self::applicant_field(entity_type), "size": 20 } }
            }),
            "program" => json!({
                "by_group": { "terms": { "field": "bucl_nm.keyword", "size": 20 } }
            }),
            _ => json!({
                "by_group": {
                    "date_histogram": {
                        "field": date_field,
                        "calendar_interval": "year",
                        "format": "yyyy",
                        "min_doc_count": 1,
                    }
                }
            }),
        };

        let body = json!({
            "query": { "bool": { "must": [must_clause], "filter": filter_clauses } },
            "size": 0,
            "aggs": aggregations,
        });

        let response = self.search_body(Self::index(entity_type), body).await?;

        let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let buckets = response["aggregations"]["by_group"]["buckets"]
            .as_array()
            .map(|buckets| {
                buckets
                    .iter()
                    .map(|bucket| StatsBucket {
                        key: bucket["key_as_string"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| bucket["key"].to_string().trim_matches('"').to_string()),
                        count: bucket["doc_count"].as_u64().unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            "ES statistics: entity={entity_type}, group_by={group_by}, total={total}, elapsed={:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(StatsBucketSet {
            entity_type: entity_type.to_string(),
            keywords: keywords.unwrap_or_default().to_string(),
            group_by: group_by.to_string(),
            period: format!("{start_year}-{end_year}"),
            total,
            buckets,
            error: None,
        })
    }

    async fn crosstab_statistics(
        &self,
        entity_type: &str,
        keywords: Option<&str>,
        countries: &[String],
        years_back: i32,
        top_n: usize,
    ) -> Result<CrosstabTable> {
        let current_year = chrono::Utc::now().year();
        let start_year = current_year - years_back + 1;
        let date_field = Self::date_field(entity_type);

        let mut filter_clauses = vec![json!({
            "range": {
                date_field: {
                    "gte": format!("{start_year}0101"),
                    "lte": format!("{current_year}1231"),
                    "format": "yyyyMMdd",
                }
            }
        })];
        if !countries.is_empty() {
            filter_clauses.push(json!({ "terms": { "ntcd": countries } }));
        }

        let must_clause = match keywords {
            Some(kw) if !kw.trim().is_empty() => json!({
                "multi_match": {
                    "query": kw,
                    "fields": Self::search_fields(entity_type),
                    "type": "best_fields",
                    "operator": "or",
                }
            }),
            _ => json!({ "match_all": {} }),
        };

        // oversample applicants so the >=3 post-filter still leaves top_n rows
        let body = json!({
            "query": { "bool": { "must": [must_clause], "filter": filter_clauses } },
            "size": 0,
            "aggs": {
                "by_applicant": {
                    "terms": { "field": Self::applicant_field(entity_type), "size": top_n * 3 },
                    "aggs": {
                        "by_year": {
                            "date_histogram": {
                                "field": date_field,
                                "calendar_interval": "year",
                                "format": "yyyy",
                                "min_doc_count": 0,
                            }
                        },
                        "nationality": {
                            "terms": { "field": "patent_frst_appn_ntnlty", "size": 1 }
                        }
                    }
                }
            }
        });

        let response = self.search_body(Self::index(entity_type), body).await?;
        let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);

        let years: Vec<i32> = (start_year..=current_year).collect();
        let mut rows = Vec::new();

        if let Some(buckets) = response["aggregations"]["by_applicant"]["buckets"].as_array() {
            for bucket in buckets {
                let name = bucket["key"].as_str().unwrap_or_default().to_string();
                let row_total = bucket["doc_count"].as_u64().unwrap_or(0);
                // HAVING-like post filter
                if row_total < 3 {
                    continue;
                }

                let mut by_year: HashMap<String, u64> =
                    years.iter().map(|y| (y.to_string(), 0)).collect();
                if let Some(year_buckets) = bucket["by_year"]["buckets"].as_array() {
                    for yb in year_buckets {
                        if let Some(year) = yb["key_as_string"].as_str() {
                            by_year.insert(year.to_string(), yb["doc_count"].as_u64().unwrap_or(0));
                        }
                    }
                }

                let nationality = bucket["nationality"]["buckets"]
                    .as_array()
                    .and_then(|b| b.first())
                    .and_then(|b| b["key"].as_str())
                    .unwrap_or("")
                    .to_string();

                rows.push(CrosstabRow {
                    rank: 0,
                    name,
                    nationality,
                    by_year,
                    total: row_total,
                });
            }
        }

        rows.sort_by(|a, b| b.total.cmp(&a.total));
        rows.truncate(top_n);
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }

        Ok(CrosstabTable {
            years,
            rows,
            period: format!("{start_year}-{current_year}"),
            total,
            keywords: keywords.unwrap_or_default().to_string(),
            countries: countries.to_vec(),
        })
    }

    async fn ranking(
        &self,
        query: &str,
        entity_type: &str,
        group_field: &str,
        limit: usize,
    ) -> Result<Vec<RankingRow>> {
        let aggregations = json!({
            "ranking": { "terms": { "field": group_field, "size": limit } }
        });

        let result = self.aggregate(query, entity_type, aggregations).await?;

        Ok(result["ranking"]["buckets"]
            .as_array()
            .map(|buckets| {
                buckets
                    .iter()
                    .map(|bucket| RankingRow {
                        org: bucket["key"].as_str().unwrap_or_default().to_string(),
                        count: bucket["doc_count"].as_u64().unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_mapping() {
        assert_eq!(EsClient::index("patent"), "patents");
        assert_eq!(EsClient::index("equip"), "equipments");
        assert_eq!(EsClient::index("equipment"), "equipments");
        assert_eq!(EsClient::index("proposal"), "proposals");
    }

    #[test]
    fn test_build_query_empty_is_match_all() {
        let q = EsClient::build_query("  ", "patent");
        assert!(q.get("match_all").is_some());
        let q = EsClient::build_query("수소연료전지", "patent");
        assert_eq!(q["multi_match"]["operator"], "or");
    }

    #[test]
    fn test_parse_hits() {
        let response = json!({
            "hits": { "hits": [
                { "_id": "a", "_score": 2.5, "_source": { "conts_klang_nm": "특허 A" } },
                { "_id": "b", "_score": null, "_source": {} },
            ]}
        });
        let hits = EsClient::parse_hits(&response);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].source_str("conts_klang_nm"), "특허 A");
        assert_eq!(hits[1].score, 0.0);
    }
}
