//! Provider options.
//!
//! [`ProviderOptions`] is internally tagged by `provider`, so a TOML table
//! such as
//!
//! ```toml
//! [store]
//! provider = "qdrant"
//! url = "http://localhost:6333"
//! collection = "docs"
//! ```
//!
//! deserializes straight into [`ProviderOptions::Qdrant`].

use serde::{Deserialize, Serialize};

/// Default table for the SQL stores.
pub const DEFAULT_TABLE: &str = "documents";

/// Default Pinecone control-plane URL.
pub const DEFAULT_PINECONE_CONTROLLER: &str = "https://api.pinecone.io";

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// SQLite store options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteOptions {
    /// Database file, or `:memory:`.
    pub path: String,

    /// Collection table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Expected embedding dimensionality; checked against the embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: "quiver.db".to_string(),
            table: default_table(),
            dimensions: None,
        }
    }
}

/// Postgres + pgvector store options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresOptions {
    /// Connection URL (`postgres://…`).
    pub url: String,

    /// Collection table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Expected embedding dimensionality; checked against the embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    /// Pool size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

/// Pinecone store options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PineconeOptions {
    /// API key.
    #[serde(default)]
    pub api_key: String,

    /// Data-plane host of the index; takes precedence over `index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Index name, resolved to a host through the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    /// Namespace within the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Control-plane URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_url: Option<String>,
}

/// Qdrant store options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QdrantOptions {
    /// REST endpoint, e.g. `http://localhost:6333`.
    #[serde(default)]
    pub url: String,

    /// Collection name.
    #[serde(default)]
    pub collection: String,

    /// API key, when the server requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// In-memory store options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryOptions {}

/// Options for one backend, tagged by provider name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderOptions {
    /// SQLite with JSON metadata.
    Sqlite(SqliteOptions),
    /// Postgres with pgvector.
    Postgres(PostgresOptions),
    /// Pinecone serverless or pod index.
    Pinecone(PineconeOptions),
    /// Qdrant collection.
    Qdrant(QdrantOptions),
    /// Process-local store.
    Memory(MemoryOptions),
}

impl ProviderOptions {
    /// Provider name, as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
            Self::Pinecone(_) => "pinecone",
            Self::Qdrant(_) => "qdrant",
            Self::Memory(_) => "memory",
        }
    }
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self::Sqlite(SqliteOptions::default())
    }
}
