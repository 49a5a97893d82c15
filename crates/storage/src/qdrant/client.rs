use crate::{VectorApi, VectorHit};
use async_trait::async_trait;
use qdrant_client::qdrant::{value::Kind as QdrantKind, Condition, Filter, ScrollPointsBuilder, SearchPointsBuilder, Value as QdrantValue};
use qdrant_client::Qdrant;
use rndsearch_core::config::QdrantConfig;
use rndsearch_core::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Qdrant vector store client
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        info!("Connecting to Qdrant at {}", config.url);

        let client = Qdrant::from_url(&config.url)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::storage(format!("Failed to create Qdrant client: {e}")))?;

        Ok(Self { client })
    }

    fn build_filter(filter: &HashMap<String, String>) -> Filter {
        Filter::must(
            filter
                .iter()
                .map(|(key, value)| Condition::matches(key.clone(), value.clone())),
        )
    }
}

/// Convert a Qdrant payload value into a JSON value
fn qdrant_value_to_json(value: &QdrantValue) -> serde_json::Value {
    match value.kind.as_ref() {
        Some(QdrantKind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(QdrantKind::IntegerValue(i)) => serde_json::json!(i),
        Some(QdrantKind::DoubleValue(d)) => serde_json::json!(d),
        Some(QdrantKind::BoolValue(b)) => serde_json::json!(b),
        Some(QdrantKind::ListValue(list)) => serde_json::Value::Array(
            list.values.iter().map(qdrant_value_to_json).collect(),
        ),
        Some(QdrantKind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(QdrantKind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

fn payload_to_map(
    payload: &HashMap<String, QdrantValue>,
) -> serde_json::Map<String, serde_json::Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
        .collect()
}

fn point_id_to_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorApi for QdrantStore {
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<HashMap<String, String>>,
    ) -> Result<Vec<VectorHit>> {
        let mut builder =
            SearchPointsBuilder::new(collection, vector, limit as u64).with_payload(true);

        if let Some(ref filter) = filter {
            builder = builder.filter(Self::build_filter(filter));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::storage(format!("Qdrant search failed: {e}")))?;

        let hits: Vec<VectorHit> = response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point_id_to_string(point.id.as_ref()),
                score: point.score,
                payload: payload_to_map(&point.payload),
            })
            .collect();

        debug!("Qdrant search on {collection}: {} hits", hits.len());
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(Self::build_filter(&filter))
                    .with_payload(true)
                    .limit(limit as u32),
            )
            .await
            .map_err(|e| Error::storage(format!("Qdrant scroll failed: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point_id_to_string(point.id.as_ref()),
                score: 0.0,
                payload: payload_to_map(&point.payload),
            })
            .collect())
    }
}
