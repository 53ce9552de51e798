//! Portable vector search for Quiver.
//!
//! One [`VectorAdapter`] trait sits in front of several vector stores. Callers
//! index [`VectorDocument`]s and search with [`VectorSearchParams`]; every
//! backend returns scores normalised to `[0, 1]`, applies the same portable
//! metadata filter language and can attach a BM25-ranked snippet.
//!
//! # Features
//!
//! - `embed-fastembed`: local embedding generation via fastembed
//! - `store-postgres`: the Postgres + pgvector store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      quiver-vector                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── OpenAiEmbeddingProvider (HTTP)                         │
//! │  └── FastEmbedProvider (feature: embed-fastembed)           │
//! │  EmbeddingConfig → ResolvedEmbedding (single-flight)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorAdapter trait + Capabilities                         │
//! │  ├── SqliteVectorStore (filter pushdown)                    │
//! │  ├── PostgresVectorStore (feature: store-postgres)          │
//! │  └── RestVectorStore<C> (overfetch + post-filter)           │
//! │      ├── PineconeClient                                     │
//! │      ├── QdrantClient                                       │
//! │      └── MemoryVectorClient                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Filters: matches_filter / compile_filter                   │
//! │  Scores: ScoreScale::normalize                              │
//! │  Snippets: extract_snippet (BM25)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  validate_config → create_adapter                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use quiver_vector::{
//!     create_adapter, EmbeddingConfig, MockEmbeddingProvider, ProviderOptions,
//!     VectorDocument, VectorSearchParams,
//! };
//! use std::sync::Arc;
//!
//! let embedding = Arc::new(EmbeddingConfig::from_provider(Arc::new(
//!     MockEmbeddingProvider::new(384),
//! )));
//! let adapter = create_adapter(&ProviderOptions::default(), Some(embedding)).await?;
//!
//! adapter
//!     .index(&[VectorDocument::new("doc-1", "tokio runtime internals")
//!         .with_metadata("lang", "rust")])
//!     .await?;
//!
//! let params = VectorSearchParams::new("async runtime")
//!     .with_limit(5)
//!     .with_filter("lang", "rust")
//!     .with_snippet(2);
//! for result in adapter.search(&params).await? {
//!     println!("{}: {:.3}", result.id, result.score);
//! }
//! ```

// Core modules (always available)
pub mod adapter;
pub mod embedding;
pub mod filter;
pub mod options;
pub mod resolver;
pub mod score;
pub mod snippet;
pub mod types;
pub mod validation;

// Stores
pub mod memory;
pub mod pinecone;
pub mod qdrant;
pub mod registry;
pub mod rest;
pub mod sqlite;

// HTTP embedders
pub mod openai;

mod http;

// Feature-gated modules
#[cfg(feature = "embed-fastembed")]
pub mod fastembed;

#[cfg(feature = "store-postgres")]
pub mod postgres;

// Re-exports: core types
pub use types::{
    Capabilities, IndexSummary, Metadata, MetadataValue, ResultMeta,
    VectorDocument, VectorSearchParams, VectorSearchResult,
};

// Re-exports: traits
pub use adapter::VectorAdapter;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use rest::{RestVectorClient, RestVectorStore};

// Re-exports: embeddings
pub use openai::OpenAiEmbeddingProvider;
pub use resolver::{EmbeddingConfig, ResolvedEmbedding, known_dimensions};

// Re-exports: filters, scores and snippets
pub use filter::{
    CompiledFilter, FilterCondition, FilterOperator, FilterScalar, SqlMode, SqlParam,
    VectorSearchFilter, compile_filter, matches_filter,
};
pub use score::ScoreScale;
pub use snippet::{Snippet, extract_snippet};

// Re-exports: stores
pub use memory::MemoryVectorClient;
pub use pinecone::PineconeClient;
pub use qdrant::QdrantClient;
pub use sqlite::SqliteVectorStore;

// Re-exports: configuration and factory
pub use options::{
    MemoryOptions, PineconeOptions, PostgresOptions, ProviderOptions, QdrantOptions,
    SqliteOptions,
};
pub use registry::create_adapter;
pub use validation::{Severity, ValidationIssue, ValidationReport, validate_config};

// Feature-gated re-exports
#[cfg(feature = "embed-fastembed")]
pub use fastembed::FastEmbedProvider;

#[cfg(feature = "store-postgres")]
pub use postgres::PostgresVectorStore;
