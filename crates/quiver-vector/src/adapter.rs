//! The `VectorAdapter` trait and helpers shared by every store.
//!
//! Each backend is one struct implementing [`VectorAdapter`]. `index` and
//! `search` are required; `remove`, `clear` and `close` default to a
//! [`NotSupported`](quiver_core::Error::NotSupported) error and are only
//! overridden where [`Capabilities`] says the backend supports them.

use async_trait::async_trait;
use quiver_core::{Error, Result};
use std::fmt;

use crate::score::ScoreScale;
use crate::snippet::extract_snippet;
use crate::types::{
    Capabilities, IndexSummary, Metadata, ResultMeta, VectorDocument, VectorSearchParams,
    VectorSearchResult,
};

/// Payload key holding the document content in stores without a content column.
pub const CONTENT_KEY: &str = "_content";

/// Payload key holding the caller's document id in stores without an id column.
pub const ID_KEY: &str = "_id";

/// Keys callers may not use in document metadata.
pub const RESERVED_KEYS: &[&str] = &[CONTENT_KEY, ID_KEY];

/// A vector store with one semantic contract across backends.
///
/// Implementations must return scores in `[0, 1]` (higher is more similar)
/// and apply the full filter semantics of [`crate::filter`], either inside
/// the backend query or after retrieval.
#[async_trait]
pub trait VectorAdapter: fmt::Debug + Send + Sync {
    /// Backend name (e.g. `"sqlite"`, `"pinecone"`).
    fn name(&self) -> &str;

    /// Operations supported beyond `index` and `search`.
    fn capabilities(&self) -> Capabilities;

    /// Embedding dimensionality of the collection.
    fn dimensions(&self) -> usize;

    /// Embed and upsert `documents`. Re-indexing an id replaces it.
    async fn index(&self, documents: &[VectorDocument]) -> Result<IndexSummary>;

    /// Nearest-neighbour search, best match first.
    async fn search(&self, params: &VectorSearchParams) -> Result<Vec<VectorSearchResult>>;

    /// Delete documents by id. Unknown ids are ignored.
    async fn remove(&self, _ids: &[String]) -> Result<()> {
        Err(Error::not_supported(self.name(), "remove"))
    }

    /// Delete every document in the collection.
    async fn clear(&self) -> Result<()> {
        Err(Error::not_supported(self.name(), "clear"))
    }

    /// Release connections held by the adapter.
    async fn close(&self) -> Result<()> {
        Err(Error::not_supported(self.name(), "close"))
    }
}

/// Reject documents whose metadata uses a reserved key.
pub(crate) fn check_reserved_keys(documents: &[VectorDocument]) -> Result<()> {
    for doc in documents {
        if let Some(key) = RESERVED_KEYS.iter().find(|k| doc.metadata.contains_key(**k)) {
            return Err(Error::config(format!(
                "document '{}' uses reserved metadata key '{key}'",
                doc.id
            )));
        }
    }
    Ok(())
}

/// Document contents in input order, ready for embedding.
pub(crate) fn contents(documents: &[VectorDocument]) -> Vec<&str> {
    documents.iter().map(|d| d.content.as_str()).collect()
}

/// A candidate returned by a backend, before shaping.
pub(crate) struct Candidate {
    pub id: String,
    pub content: Option<String>,
    pub metadata: Metadata,
    pub raw_score: f32,
}

impl Candidate {
    /// Shape into a result: normalize the score, keep only the requested
    /// fields and attach a snippet when asked for.
    pub fn into_result(self, scale: ScoreScale, params: &VectorSearchParams) -> VectorSearchResult {
        let mut meta = ResultMeta {
            distance: Some(self.raw_score),
            ..Default::default()
        };
        if let (Some(context_lines), Some(content)) = (params.snippet, self.content.as_deref()) {
            let snippet = extract_snippet(content, &params.query, context_lines);
            meta.snippet = Some(snippet.snippet);
            meta.highlights = snippet.highlights;
        }

        VectorSearchResult {
            id: self.id,
            score: scale.normalize(self.raw_score),
            content: self.content.filter(|_| params.return_content),
            metadata: params.return_metadata.then_some(self.metadata),
            meta: Some(meta),
        }
    }
}

/// Order by score, best first. Stable, so backend order breaks ties.
pub(crate) fn sort_by_score(results: &mut [VectorSearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}
