use crate::{GraphApi, GraphNeighbor, GraphNode, GraphNodeAttrs};
use async_trait::async_trait;
use rndsearch_core::config::GraphConfig;
use rndsearch_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cap on cached node-resolver entries; the cache halves itself on overflow
const NODE_RESOLVER_CACHE_CAP: usize = 10_000;

/// REST client for the graph analytics service
///
/// PageRank scores, Louvain partitions, and resolved node attributes are
/// read-mostly after warm-up, so they live in caches behind `RwLock`s.
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    graph_id: String,
    pagerank_cache: RwLock<HashMap<usize, Vec<GraphNode>>>,
    community_cache: RwLock<Option<HashMap<String, i64>>>,
    resolver_cache: RwLock<HashMap<String, Option<GraphNodeAttrs>>>,
}

impl GraphClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        info!("Initializing graph analytics client");
        info!("  URL: {}", config.url);
        info!("  Graph id: {}", config.graph_id);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::storage(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            graph_id: config.graph_id.clone(),
            pagerank_cache: RwLock::new(HashMap::new()),
            community_cache: RwLock::new(None),
            resolver_cache: RwLock::new(HashMap::new()),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::storage(format!("Graph request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::storage(format!("Graph API error: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| Error::storage(format!("Bad graph response: {e}")))
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn pagerank_top_k(&self, top_k: usize) -> Result<Vec<GraphNode>> {
        if let Some(cached) = self.pagerank_cache.read().await.get(&top_k) {
            return Ok(cached.clone());
        }

        let body = self
            .get_json(&format!("/graphs/{}/pagerank?top_k={top_k}", self.graph_id))
            .await?;

        let nodes: Vec<GraphNode> = body["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|item| {
                        Some(GraphNode {
                            node_id: item["vertex"].as_str()?.to_string(),
                            pagerank: item["pagerank"].as_f64().unwrap_or(0.0),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!("PageRank top {top_k}: {} nodes", nodes.len());
        self.pagerank_cache.write().await.insert(top_k, nodes.clone());
        Ok(nodes)
    }

    async fn communities(&self) -> Result<HashMap<String, i64>> {
        if let Some(cached) = self.community_cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let body = self
            .get_json(&format!("/graphs/{}/communities", self.graph_id))
            .await?;

        let mut partitions = HashMap::new();
        if let Some(results) = body["results"].as_array() {
            for item in results {
                if let (Some(vertex), Some(partition)) =
                    (item["vertex"].as_str(), item["partition"].as_i64())
                {
                    partitions.insert(vertex.to_string(), partition);
                }
            }
        }

        info!("Loaded Louvain partitions for {} vertices", partitions.len());
        *self.community_cache.write().await = Some(partitions.clone());
        Ok(partitions)
    }

    async fn node_community(&self, node_id: &str) -> Result<Option<i64>> {
        let communities = self.communities().await?;
        Ok(communities.get(node_id).copied())
    }

    async fn neighbors(
        &self,
        node_id: &str,
        depth: usize,
        limit: usize,
    ) -> Result<Vec<GraphNeighbor>> {
        let body = self
            .get_json(&format!(
                "/graphs/{}/neighbors/{node_id}?depth={depth}&limit={limit}",
                self.graph_id
            ))
            .await?;

        Ok(body["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|item| {
                        Some(GraphNeighbor {
                            node_id: item["vertex"].as_str()?.to_string(),
                            depth: item["depth"].as_u64().unwrap_or(1) as usize,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn statistics(&self) -> Result<Value> {
        self.get_json(&format!("/graphs/{}/statistics", self.graph_id))
            .await
    }

    async fn resolve_node(&self, node_id: &str) -> Result<Option<GraphNodeAttrs>> {
        if let Some(cached) = self.resolver_cache.read().await.get(node_id) {
            return Ok(cached.clone());
        }

        let resolved = match self.get_json(&format!("/nodes/{node_id}")).await {
            Ok(body) => Some(GraphNodeAttrs {
                name: body["name"].as_str().unwrap_or(node_id).to_string(),
                entity_type: body["entity_type"].as_str().unwrap_or("").to_string(),
                description: body["description"].as_str().unwrap_or("").to_string(),
            }),
            Err(e) => {
                warn!("Node resolution failed for {node_id}: {e}");
                None
            }
        };

        let mut cache = self.resolver_cache.write().await;
        if cache.len() >= NODE_RESOLVER_CACHE_CAP {
            // halve the cache on overflow; eviction order is arbitrary
            let keep = cache.len() / 2;
            let keys: Vec<String> = cache.keys().skip(keep).cloned().collect();
            for key in keys {
                cache.remove(&key);
            }
            debug!("Node resolver cache halved to {} entries", cache.len());
        }
        cache.insert(node_id.to_string(), resolved.clone());

        Ok(resolved)
    }
}
