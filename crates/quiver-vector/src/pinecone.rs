//! Pinecone client.
//!
//! Data-plane requests go to the index host. When only an index name is
//! configured, the host is looked up once through the control plane and
//! cached. Metadata values map one-to-one onto Pinecone's supported types
//! (string, number, boolean, list of strings).

use async_trait::async_trait;
use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::http::{join_url, send, send_json};
use crate::options::{DEFAULT_PINECONE_CONTROLLER, PineconeOptions};
use crate::rest::{Payload, RestMatch, RestRecord, RestVectorClient};
use crate::score::ScoreScale;
use crate::types::Capabilities;

const PROVIDER: &str = "pinecone";

/// API version header value.
pub const API_VERSION: &str = "2025-01";

/// Vectors per upsert request.
const UPSERT_BATCH: usize = 100;

/// [`RestVectorClient`] for a Pinecone index.
pub struct PineconeClient {
    client: reqwest::Client,
    api_key: String,
    controller_url: String,
    index: Option<String>,
    namespace: Option<String>,
    host: OnceCell<String>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Payload,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Payload>,
}

impl PineconeClient {
    /// Create a client from validated options.
    pub fn new(options: &PineconeOptions) -> Result<Self> {
        if options.api_key.is_empty() {
            return Err(Error::config("pinecone: api_key is required"));
        }
        if options.host.is_none() && options.index.is_none() {
            return Err(Error::config("pinecone: either host or index is required"));
        }
        let host = OnceCell::new_with(options.host.as_deref().map(normalize_host));

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: options.api_key.clone(),
            controller_url: options
                .controller_url
                .clone()
                .unwrap_or_else(|| DEFAULT_PINECONE_CONTROLLER.to_string()),
            index: options.index.clone(),
            namespace: options.namespace.clone(),
            host,
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn describe_index(&self, index: &str) -> Result<IndexDescription> {
        let url = join_url(&self.controller_url, &format!("indexes/{index}"));
        send_json(PROVIDER, self.request(reqwest::Method::GET, url)).await
    }

    /// Data-plane host, resolved through the control plane on first use.
    async fn host(&self) -> Result<&str> {
        self.host
            .get_or_try_init(|| async {
                let index = self
                    .index
                    .as_deref()
                    .ok_or_else(|| Error::config("pinecone: either host or index is required"))?;
                let description = self.describe_index(index).await?;
                log::debug!("Resolved pinecone index '{index}' to {}", description.host);
                Ok::<_, Error>(normalize_host(&description.host))
            })
            .await
            .map(String::as_str)
    }

    async fn data_url(&self, path: &str) -> Result<String> {
        Ok(join_url(self.host().await?, path))
    }

    fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

#[async_trait]
impl RestVectorClient for PineconeClient {
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
        ScoreScale::Similarity
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        // indexes are provisioned out of band; only check what can be checked
        if let Some(index) = &self.index {
            let description = self.describe_index(index).await?;
            if let Some(existing) = description.dimension
                && existing != dimensions
            {
                return Err(Error::DimensionMismatch {
                    expected: existing,
                    actual: dimensions,
                });
            }
            let _ = self.host.set(normalize_host(&description.host));
        }
        Ok(())
    }

    async fn upsert(&self, records: Vec<RestRecord>) -> Result<()> {
        let url = self.data_url("vectors/upsert").await?;
        for chunk in records.chunks(UPSERT_BATCH) {
            let vectors: Vec<UpsertVector<'_>> = chunk
                .iter()
                .map(|r| UpsertVector {
                    id: &r.id,
                    values: &r.vector,
                    metadata: &r.payload,
                })
                .collect();
            let body = json!({ "vectors": vectors, "namespace": self.namespace() });
            send(PROVIDER, self.request(reqwest::Method::POST, url.clone()).json(&body)).await?;
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RestMatch>> {
        let url = self.data_url("query").await?;
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.namespace(),
        });
        let response: QueryResponse =
            send_json(PROVIDER, self.request(reqwest::Method::POST, url).json(&body)).await?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| RestMatch {
                id: m.id,
                score: m.score,
                payload: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = self.data_url("vectors/delete").await?;
        let body = json!({ "ids": ids, "namespace": self.namespace() });
        send(PROVIDER, self.request(reqwest::Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let url = self.data_url("vectors/delete").await?;
        let body = json!({ "deleteAll": true, "namespace": self.namespace() });
        send(PROVIDER, self.request(reqwest::Method::POST, url).json(&body)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PineconeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeClient")
            .field("index", &self.index)
            .field("namespace", &self.namespace)
            .field("host", &self.host.get())
            .finish_non_exhaustive()
    }
}

/// Control-plane hosts come back without a scheme.
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

// ============================================================================
// Tests
// ============================================================================
