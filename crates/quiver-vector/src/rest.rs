//! Stores reached through a REST-style client, filtered after retrieval.
//!
//! These backends cannot evaluate the portable filter language, so
//! [`RestVectorStore`] asks the client for more candidates than needed when a
//! filter is present ([`OVERFETCH_MULTIPLIER`] × `limit`), evaluates
//! [`matches_filter`] locally and truncates to `limit`. A filtered search can
//! therefore return fewer than `limit` results even when more matching
//! documents exist further down the ranking.
//!
//! Content and the caller's id travel in the record payload under the
//! reserved [`CONTENT_KEY`] and [`ID_KEY`] and are stripped before metadata
//! reaches the caller.
//!
//! REST backends are not transactional: when an upsert fails part-way, the
//! records already accepted stay written.

use async_trait::async_trait;
use quiver_core::{Error, Result};
use serde_json::{Map, Value};

use crate::adapter::{
    CONTENT_KEY, Candidate, ID_KEY, VectorAdapter, check_reserved_keys, contents, sort_by_score,
};
use crate::filter::matches_filter;
use crate::resolver::ResolvedEmbedding;
use crate::score::ScoreScale;
use crate::types::{
    Capabilities, IndexSummary, Metadata, MetadataValue, VectorDocument, VectorSearchParams,
    VectorSearchResult,
};

/// Candidate multiplier applied when a filter is present.
pub const OVERFETCH_MULTIPLIER: usize = 4;

/// JSON payload stored next to each vector.
pub type Payload = Map<String, Value>;

/// A vector with its payload, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRecord {
    /// Caller's document id.
    pub id: String,
    /// Embedding.
    pub vector: Vec<f32>,
    /// Metadata plus the reserved content and id keys.
    pub payload: Payload,
}

/// A query match as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RestMatch {
    /// Caller's document id.
    pub id: String,
    /// Backend-native score, on the client's [`ScoreScale`].
    pub score: f32,
    /// Stored payload.
    pub payload: Payload,
}

/// Transport for one REST vector service.
#[async_trait]
pub trait RestVectorClient: Send + Sync {
    /// Provider name (e.g. `"qdrant"`).
    fn name(&self) -> &str;

    /// Which of `remove`, `clear` and `close` the service supports.
    fn capabilities(&self) -> Capabilities;

    /// Scale of the scores returned by [`RestVectorClient::query`].
    fn score_scale(&self) -> ScoreScale;

    /// Create the collection, or check an existing one has `dimensions`.
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    /// Insert or replace records.
    async fn upsert(&self, records: Vec<RestRecord>) -> Result<()>;

    /// The `top_k` nearest records, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RestMatch>>;

    /// Delete records by caller id.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Delete every record in the collection.
    async fn reset(&self) -> Result<()>;

    /// Release the client.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// A [`VectorAdapter`] over any [`RestVectorClient`].
pub struct RestVectorStore<C> {
    client: C,
    embedding: ResolvedEmbedding,
}

impl<C: RestVectorClient> RestVectorStore<C> {
    /// Prepare the collection and wrap `client`.
    pub async fn new(client: C, embedding: ResolvedEmbedding) -> Result<Self> {
        client.ensure_collection(embedding.dimensions()).await?;
        log::debug!(
            "Connected {} store ({} dimensions)",
            client.name(),
            embedding.dimensions()
        );
        Ok(Self { client, embedding })
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: RestVectorClient> VectorAdapter for RestVectorStore<C> {
    fn name(&self) -> &str {
        self.client.name()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            filter: false,
            ..self.client.capabilities()
        }
    }

    fn dimensions(&self) -> usize {
        self.embedding.dimensions()
    }

    async fn index(&self, documents: &[VectorDocument]) -> Result<IndexSummary> {
        check_reserved_keys(documents)?;
        let vectors = self.embedding.embed(&contents(documents)).await?;

        let records = documents
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| {
                Ok(RestRecord {
                    id: doc.id.clone(),
                    vector,
                    payload: to_payload(doc)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.client.upsert(records).await?;
        log::debug!("Indexed {} documents into {}", documents.len(), self.client.name());
        Ok(IndexSummary {
            indexed: documents.len(),
            dimensions: self.embedding.dimensions(),
        })
    }

    async fn search(&self, params: &VectorSearchParams) -> Result<Vec<VectorSearchResult>> {
        let limit = params.effective_limit();
        if limit == 0 {
            return Ok(Vec::new());
        }
        let top_k = if params.filter.is_empty() {
            limit
        } else {
            limit.saturating_mul(OVERFETCH_MULTIPLIER)
        };

        let vector = self.embedding.embed_query(&params.query).await?;
        let matches = self.client.query(&vector, top_k).await?;
        let fetched = matches.len();

        let scale = self.client.score_scale();
        let mut results: Vec<VectorSearchResult> = matches
            .into_iter()
            .map(from_match)
            .filter(|candidate| matches_filter(&params.filter, &candidate.metadata))
            .map(|candidate| candidate.into_result(scale, params))
            .collect();
        sort_by_score(&mut results);
        results.truncate(limit);

        log::debug!(
            "{} search: {} candidates for top_k {}, {} after filtering",
            self.client.name(),
            fetched,
            top_k,
            results.len()
        );
        Ok(results)
    }

    async fn remove(&self, ids: &[String]) -> Result<()> {
        if !self.client.capabilities().remove {
            return Err(Error::not_supported(self.client.name(), "remove"));
        }
        self.client.delete(ids).await
    }

    async fn clear(&self) -> Result<()> {
        if !self.client.capabilities().clear {
            return Err(Error::not_supported(self.client.name(), "clear"));
        }
        self.client.reset().await
    }

    async fn close(&self) -> Result<()> {
        if !self.client.capabilities().close {
            return Err(Error::not_supported(self.client.name(), "close"));
        }
        self.client.shutdown().await
    }
}

impl<C: RestVectorClient> std::fmt::Debug for RestVectorStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestVectorStore")
            .field("provider", &self.client.name())
            .field("dimensions", &self.embedding.dimensions())
            .finish()
    }
}

/// Caller metadata plus the reserved content and id keys.
fn to_payload(doc: &VectorDocument) -> Result<Payload> {
    let mut payload = Payload::new();
    for (key, value) in &doc.metadata {
        payload.insert(key.clone(), serde_json::to_value(value)?);
    }
    payload.insert(CONTENT_KEY.to_string(), Value::String(doc.content.clone()));
    payload.insert(ID_KEY.to_string(), Value::String(doc.id.clone()));
    Ok(payload)
}

/// Split a match payload back into content and caller metadata.
fn from_match(m: RestMatch) -> Candidate {
    let mut content = None;
    let mut metadata = Metadata::new();
    for (key, value) in m.payload {
        match key.as_str() {
            CONTENT_KEY => content = value.as_str().map(str::to_string),
            ID_KEY => {}
            _ => match serde_json::from_value::<MetadataValue>(value) {
                Ok(v) => {
                    metadata.insert(key, v);
                }
                Err(_) => log::trace!("Skipping non-scalar payload field '{key}'"),
            },
        }
    }
    Candidate {
        id: m.id,
        content,
        metadata,
        raw_score: m.score,
    }
}
