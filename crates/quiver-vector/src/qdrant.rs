//! Qdrant client over the REST API.
//!
//! Qdrant point ids must be unsigned integers or UUIDs, so every caller id is
//! mapped to a stable UUID with [`point_id`] and the original id is kept in
//! the payload under [`ID_KEY`](crate::adapter::ID_KEY).

use async_trait::async_trait;
use quiver_core::{Error, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::adapter::ID_KEY;
use crate::http::{self, join_url, send, send_json};
use crate::options::QdrantOptions;
use crate::rest::{Payload, RestMatch, RestRecord, RestVectorClient};
use crate::score::ScoreScale;
use crate::types::Capabilities;

const PROVIDER: &str = "qdrant";

/// Stable UUID (version 8) for a caller id.
pub fn point_id(id: &str) -> Uuid {
    let hash = blake3::hash(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    uuid::Builder::from_custom_bytes(bytes).into_uuid()
}

/// [`RestVectorClient`] for one Qdrant collection.
pub struct QdrantClient {
    client: reqwest::Client,
    url: String,
    collection: String,
    api_key: Option<String>,
    dimensions: OnceCell<usize>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

impl QdrantClient {
    /// Create a client from validated options.
    pub fn new(options: &QdrantOptions) -> Result<Self> {
        if options.url.is_empty() || options.collection.is_empty() {
            return Err(Error::config("qdrant: url and collection are required"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: options.url.clone(),
            collection: options.collection.clone(),
            api_key: options.api_key.clone(),
            dimensions: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = join_url(&self.url, &format!("collections/{}{path}", self.collection));
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn create_collection(&self, dimensions: usize) -> Result<()> {
        let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
        send(PROVIDER, self.request(Method::PUT, "").json(&body)).await?;
        log::debug!(
            "Created qdrant collection '{}' ({dimensions} dimensions)",
            self.collection
        );
        Ok(())
    }
}

#[async_trait]
impl RestVectorClient for QdrantClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            remove: true,
            clear: true,
            close: false,
            filter: false,
        }
    }

    fn score_scale(&self) -> ScoreScale {
        ScoreScale::CosineSimilarity
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let response = self
            .request(Method::GET, "")
            .send()
            .await
            .map_err(|e| Error::backend(PROVIDER, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            self.create_collection(dimensions).await?;
        } else {
            if !response.status().is_success() {
                return Err(http::status_error(PROVIDER, response).await);
            }
            let info: Envelope<CollectionInfo> = response
                .json()
                .await
                .map_err(|e| Error::backend(PROVIDER, e))?;
            let existing = info.result.config.params.vectors.size;
            if existing != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: existing,
                    actual: dimensions,
                });
            }
        }

        let _ = self.dimensions.set(dimensions);
        Ok(())
    }

    async fn upsert(&self, records: Vec<RestRecord>) -> Result<()> {
        let points: Vec<Value> = records
            .into_iter()
            .map(|r| {
                json!({
                    "id": point_id(&r.id),
                    "vector": r.vector,
                    "payload": r.payload,
                })
            })
            .collect();
        let body = json!({ "points": points });
        send(PROVIDER, self.request(Method::PUT, "/points?wait=true").json(&body)).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RestMatch>> {
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        let response: Envelope<Vec<ScoredPoint>> = send_json(
            PROVIDER,
            self.request(Method::POST, "/points/search").json(&body),
        )
        .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload.unwrap_or_default();
                let id = match payload.get(ID_KEY).and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => match point.id {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                };
                RestMatch {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<Uuid> = ids.iter().map(|id| point_id(id)).collect();
        let body = json!({ "points": points });
        send(
            PROVIDER,
            self.request(Method::POST, "/points/delete?wait=true").json(&body),
        )
        .await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let dimensions = self
            .dimensions
            .get()
            .copied()
            .ok_or_else(|| Error::operation("qdrant collection was never initialised"))?;
        send(PROVIDER, self.request(Method::DELETE, "")).await?;
        self.create_collection(dimensions).await
    }
}

impl std::fmt::Debug for QdrantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantClient")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .field("dimensions", &self.dimensions.get())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
