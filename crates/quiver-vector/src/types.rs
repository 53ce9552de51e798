//! Common types for the vector search module.
//!
//! These types are shared by every adapter and embedding provider, and are
//! always available regardless of feature flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::filter::{FilterCondition, VectorSearchFilter};

/// Default number of results when a search does not set a limit.
pub const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// Metadata
// ============================================================================

/// A single metadata value: a scalar or a list of strings.
///
/// Serialized untagged, so JSON `true`, `3`, `2.5`, `"x"` and `["a", "b"]`
/// map directly onto the variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// List of strings (tags and the like).
    List(Vec<String>),
}

impl MetadataValue {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Document metadata, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Documents
// ============================================================================

/// A document to index.
///
/// `id` is chosen by the caller and stable; indexing the same `id` again
/// replaces content, metadata and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Unique document identifier within a collection.
    pub id: String,

    /// Source text; always re-embedded on write.
    pub content: String,

    /// Arbitrary metadata key-value pairs.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl VectorDocument {
    /// Create a new vector document.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata key-value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Search types
// ============================================================================

/// Parameters for a vector search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSearchParams {
    /// Search query string (will be embedded).
    pub query: String,

    /// Maximum results to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Metadata filter; empty matches everything.
    #[serde(default, skip_serializing_if = "VectorSearchFilter::is_empty")]
    pub filter: VectorSearchFilter,

    /// Include stored content in results.
    #[serde(default)]
    pub return_content: bool,

    /// Include caller metadata in results.
    #[serde(default)]
    pub return_metadata: bool,

    /// Extract a snippet with this many context lines around the best line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<usize>,
}

impl VectorSearchParams {
    /// Create search params with a query string.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a filter condition on one field.
    pub fn with_filter(mut self, field: impl Into<String>, condition: impl Into<FilterCondition>) -> Self {
        self.filter.insert(field.into(), condition.into());
        self
    }

    /// Replace the whole filter.
    pub fn with_filters(mut self, filter: VectorSearchFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Return stored content with each result.
    pub fn with_content(mut self) -> Self {
        self.return_content = true;
        self
    }

    /// Return caller metadata with each result.
    pub fn with_metadata(mut self) -> Self {
        self.return_metadata = true;
        self
    }

    /// Extract a snippet and highlights with `context_lines` around the best line.
    pub fn with_snippet(mut self, context_lines: usize) -> Self {
        self.snippet = Some(context_lines);
        self
    }

    /// The limit to apply, falling back to [`DEFAULT_LIMIT`].
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// Extra per-result information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Ranked query terms found in the content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,

    /// Excerpt centred on the most relevant line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Backend-native distance or similarity before normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// A single vector search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    /// Document identifier.
    pub id: String,

    /// Similarity score, always within `[0, 1]` (higher is more similar).
    pub score: f32,

    /// Stored content, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Caller metadata, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Highlights, snippet and raw distance.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResultMeta>,
}

// ============================================================================
// Adapter descriptors
// ============================================================================

/// Operations an adapter supports beyond `index` and `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Delete documents by id.
    pub remove: bool,
    /// Delete every document in the collection.
    pub clear: bool,
    /// Release connections held by the adapter.
    pub close: bool,
    /// Metadata filters are evaluated inside the backend query.
    pub filter: bool,
}

impl Capabilities {
    /// Every capability, including filter pushdown.
    pub const fn all() -> Self {
        Self {
            remove: true,
            clear: true,
            close: true,
            filter: true,
        }
    }

    /// No optional capability.
    pub const fn none() -> Self {
        Self {
            remove: false,
            clear: false,
            close: false,
            filter: false,
        }
    }
}

/// Outcome of an `index` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Number of documents written.
    pub indexed: usize,

    /// Embedding dimension used.
    pub dimensions: usize,
}

// ============================================================================
// Tests
// ============================================================================
