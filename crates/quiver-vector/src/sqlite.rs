//! SQLite vector store.
//!
//! Documents live in one table per collection:
//!
//! ```text
//! id TEXT PRIMARY KEY | content TEXT | metadata TEXT (JSON) | embedding TEXT (JSON array) | norm REAL
//! ```
//!
//! There is no ANN index. Cosine similarity is computed inside the query as
//! a `json_each` dot product divided by the stored and query norms, and the
//! compiled metadata filter is applied in the same statement, so results
//! need no post-filtering.
//!
//! A `quiver_collections` side table records each collection's
//! dimensionality; opening a collection with a different embedding size
//! fails.

use async_trait::async_trait;
use quiver_core::{Error, Result};
use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::adapter::{Candidate, VectorAdapter, check_reserved_keys, contents};
use crate::filter::{SqlMode, SqlParam, compile_filter, validate_identifier};
use crate::options::SqliteOptions;
use crate::resolver::ResolvedEmbedding;
use crate::score::{ScoreScale, l2_norm};
use crate::types::{Capabilities, IndexSummary, Metadata, VectorDocument, VectorSearchParams, VectorSearchResult};

const PROVIDER: &str = "sqlite";
const MEMORY_PATH: &str = ":memory:";

/// Vector store backed by a SQLite database.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    table: String,
    embedding: ResolvedEmbedding,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database and collection table.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DimensionMismatch`] when the collection already
    /// exists with a different dimensionality, or when `options.dimensions`
    /// disagrees with the embedding.
    pub async fn open(options: &SqliteOptions, embedding: ResolvedEmbedding) -> Result<Self> {
        validate_identifier(&options.table)?;
        check_expected_dimensions(options.dimensions, embedding.dimensions())?;

        let pool = if options.path == MEMORY_PATH {
            // every connection to :memory: is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
        } else {
            let connect = SqliteConnectOptions::new()
                .filename(&options.path)
                .create_if_missing(true);
            SqlitePoolOptions::new().connect_with(connect).await
        }
        .map_err(backend)?;

        Self::with_pool(pool, &options.table, embedding).await
    }

    /// Use an existing pool.
    pub async fn with_pool(pool: SqlitePool, table: &str, embedding: ResolvedEmbedding) -> Result<Self> {
        validate_identifier(table)?;
        let store = Self {
            pool,
            table: table.to_string(),
            embedding,
        };
        store.init_schema().await?;
        log::debug!(
            "Opened sqlite collection '{}' ({} dimensions)",
            store.table,
            store.embedding.dimensions()
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let dimensions = self.embedding.dimensions() as i64;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS quiver_collections (
                name TEXT PRIMARY KEY,
                dimensions INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{{}}',
                embedding TEXT NOT NULL,
                norm REAL NOT NULL
            )",
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            "INSERT INTO quiver_collections (name, dimensions) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&self.table)
        .bind(dimensions)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let stored: i64 = sqlx::query_scalar("SELECT dimensions FROM quiver_collections WHERE name = ?")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;

        if stored != dimensions {
            return Err(Error::DimensionMismatch {
                expected: stored as usize,
                actual: self.embedding.dimensions(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorAdapter for SqliteVectorStore {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn dimensions(&self) -> usize {
        self.embedding.dimensions()
    }

    async fn index(&self, documents: &[VectorDocument]) -> Result<IndexSummary> {
        check_reserved_keys(documents)?;
        let vectors = self.embedding.embed(&contents(documents)).await?;

        let sql = format!(
            "INSERT INTO {} (id, content, metadata, embedding, norm) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                norm = excluded.norm",
            self.table
        );

        // dropped without commit on error, which rolls back
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for (doc, vector) in documents.iter().zip(&vectors) {
            sqlx::query(&sql)
                .bind(&doc.id)
                .bind(&doc.content)
                .bind(serde_json::to_string(&doc.metadata)?)
                .bind(serde_json::to_string(vector)?)
                .bind(f64::from(l2_norm(vector)))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;

        log::debug!("Indexed {} documents into sqlite '{}'", documents.len(), self.table);
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

        let compiled = compile_filter(&params.filter, SqlMode::Json, Some("t"))?;
        let query_vector = self.embedding.embed_query(&params.query).await?;

        let sql = format!(
            "SELECT t.id, t.content, t.metadata,
                    (SELECT SUM(e.value * q.value)
                       FROM json_each(t.embedding) AS e
                       JOIN json_each(?) AS q ON q.key = e.key) / (t.norm * ?) AS similarity
               FROM {} AS t
              WHERE {}
              ORDER BY similarity DESC
              LIMIT ?",
            self.table,
            compiled.predicate()
        );

        let query = sqlx::query(&sql)
            .bind(serde_json::to_string(&query_vector)?)
            .bind(f64::from(l2_norm(&query_vector)));
        let rows = bind_params(query, &compiled.params)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        log::debug!("sqlite search returned {} rows", rows.len());

        rows.into_iter()
            .map(|row| {
                let metadata: String = row.try_get("metadata").map_err(backend)?;
                let similarity: Option<f64> = row.try_get("similarity").map_err(backend)?;
                let candidate = Candidate {
                    id: row.try_get("id").map_err(backend)?,
                    content: Some(row.try_get("content").map_err(backend)?),
                    metadata: serde_json::from_str::<Metadata>(&metadata)?,
                    raw_score: similarity.unwrap_or(0.0) as f32,
                };
                Ok(candidate.into_result(ScoreScale::CosineSimilarity, params))
            })
            .collect()
    }

    async fn remove(&self, ids: &[String]) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for id in ids {
            sqlx::query(&sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("table", &self.table)
            .field("dimensions", &self.embedding.dimensions())
            .finish()
    }
}

/// Bind compiled filter parameters, in order.
pub(crate) fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Integer(i) => query.bind(*i),
            SqlParam::Float(f) => query.bind(*f),
        };
    }
    query
}

pub(crate) fn check_expected_dimensions(expected: Option<usize>, actual: usize) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::DimensionMismatch { expected, actual }),
        _ => Ok(()),
    }
}

fn backend(err: sqlx::Error) -> Error {
    Error::backend(PROVIDER, err)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::filter::FilterOperator;
    use crate::resolver::EmbeddingConfig;
    use crate::types::MetadataValue;
    use std::sync::Arc;

    async fn resolved(dims: usize) -> ResolvedEmbedding {
        EmbeddingConfig::from_provider(Arc::new(MockEmbeddingProvider::new(dims)))
            .with_dimensions(dims)
            .resolve()
            .await
            .unwrap()
            .clone()
    }

    async fn memory_store() -> SqliteVectorStore {
        let options = SqliteOptions {
            path: MEMORY_PATH.into(),
            ..Default::default()
        };
        SqliteVectorStore::open(&options, resolved(16).await).await.unwrap()
    }

    async fn row_count(store: &SqliteVectorStore) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", store.table))
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    fn corpus() -> Vec<VectorDocument> {
        vec![
            VectorDocument::new("a", "rust ownership and borrowing")
                .with_metadata("lang", "rust")
                .with_metadata("year", 2021),
            VectorDocument::new("b", "python generators")
                .with_metadata("lang", "python")
                .with_metadata("year", 2019),
            VectorDocument::new("c", "rust async runtimes")
                .with_metadata("lang", "rust")
                .with_metadata("year", 2023)
                .with_metadata("draft", true),
        ]
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = memory_store().await;
        let summary = store.index(&corpus()).await.unwrap();
        assert_eq!(summary.indexed, 3);
        assert_eq!(summary.dimensions, 16);

        let results = store
            .search(&VectorSearchParams::new("rust ownership and borrowing").with_content())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert_eq!(results[0].content.as_deref(), Some("rust ownership and borrowing"));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_filter_pushdown() {
        let store = memory_store().await;
        store.index(&corpus()).await.unwrap();

        let params = VectorSearchParams::new("anything")
            .with_filter("lang", "rust")
            .with_filter("year", FilterOperator::gt(2022.0))
            .with_metadata();
        let results = store.search(&params).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");
        assert_eq!(
            results[0].metadata.as_ref().unwrap()["draft"],
            MetadataValue::Bool(true)
        );

        let none = store
            .search(&VectorSearchParams::new("x").with_filter("lang", "go"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_limit() {
        let store = memory_store().await;
        store.index(&corpus()).await.unwrap();
        let results = store
            .search(&VectorSearchParams::new("rust").with_limit(2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(store
            .search(&VectorSearchParams::new("rust").with_limit(0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = memory_store().await;
        store.index(&[VectorDocument::new("a", "old text")]).await.unwrap();
        store
            .index(&[VectorDocument::new("a", "new text").with_metadata("v", 2)])
            .await
            .unwrap();

        assert_eq!(row_count(&store).await, 1);
        let results = store
            .search(&VectorSearchParams::new("new text").with_content().with_metadata())
            .await
            .unwrap();
        assert_eq!(results[0].content.as_deref(), Some("new text"));
        assert_eq!(
            results[0].metadata.as_ref().unwrap()["v"],
            MetadataValue::Integer(2)
        );
    }

    #[tokio::test]
    async fn test_snippet_in_results() {
        let store = memory_store().await;
        let content = (0..12)
            .map(|i| if i == 6 { "the embeddings live here".to_string() } else { format!("line {i}") })
            .collect::<Vec<_>>()
            .join("\n");
        store.index(&[VectorDocument::new("s", content)]).await.unwrap();

        let results = store
            .search(&VectorSearchParams::new("embeddings").with_snippet(1))
            .await
            .unwrap();
        let meta = results[0].meta.as_ref().unwrap();
        assert_eq!(meta.snippet.as_deref(), Some("line 5\nthe embeddings live here\nline 7"));
        assert_eq!(meta.highlights, vec!["embeddings".to_string()]);
        assert!(results[0].content.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = memory_store().await;
        store.index(&corpus()).await.unwrap();

        store.remove(&["a".into(), "missing".into()]).await.unwrap();
        assert_eq!(row_count(&store).await, 2);

        store.clear().await.unwrap();
        assert_eq!(row_count(&store).await, 0);
        assert!(store.capabilities().clear);
    }

    struct ShortBatch;

    #[async_trait]
    impl EmbeddingProvider for ShortBatch {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 4])
        }

        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0; 4]])
        }

        fn name(&self) -> &str {
            "short-batch"
        }
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_writes_nothing() {
        let embedding = EmbeddingConfig::from_provider(Arc::new(ShortBatch))
            .with_dimensions(4)
            .resolve()
            .await
            .unwrap()
            .clone();
        let options = SqliteOptions {
            path: MEMORY_PATH.into(),
            ..Default::default()
        };
        let store = SqliteVectorStore::open(&options, embedding).await.unwrap();

        let err = store
            .index(&[VectorDocument::new("a", "x"), VectorDocument::new("b", "y")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Embedding count mismatch"));
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON documents
             WHEN NEW.id = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store
            .index(&[VectorDocument::new("good", "x"), VectorDocument::new("bad", "y")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_reserved_key_rejected_before_write() {
        let store = memory_store().await;
        let err = store
            .index(&[VectorDocument::new("a", "x").with_metadata("_id", "other")])
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimensions_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        let options = SqliteOptions {
            path: path.to_string_lossy().into_owned(),
            ..Default::default()
        };

        let store = SqliteVectorStore::open(&options, resolved(8).await).await.unwrap();
        store.index(&corpus()).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteVectorStore::open(&options, resolved(8).await).await.unwrap();
        assert_eq!(row_count(&reopened).await, 3);
        reopened.close().await.unwrap();

        let err = SqliteVectorStore::open(&options, resolved(12).await)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 8,
                actual: 12
            }
        ));
    }

    #[tokio::test]
    async fn test_expected_dimensions_option() {
        let options = SqliteOptions {
            path: MEMORY_PATH.into(),
            dimensions: Some(32),
            ..Default::default()
        };
        let err = SqliteVectorStore::open(&options, resolved(16).await)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    struct ZeroVectors;

    #[async_trait]
    impl EmbeddingProvider for ZeroVectors {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }

        fn name(&self) -> &str {
            "zero"
        }
    }

    #[tokio::test]
    async fn test_zero_norm_scores_zero() {
        let embedding = EmbeddingConfig::from_provider(Arc::new(ZeroVectors))
            .with_dimensions(4)
            .resolve()
            .await
            .unwrap()
            .clone();
        let options = SqliteOptions {
            path: MEMORY_PATH.into(),
            ..Default::default()
        };
        let store = SqliteVectorStore::open(&options, embedding).await.unwrap();
        store.index(&[VectorDocument::new("z", "anything")]).await.unwrap();

        let results = store.search(&VectorSearchParams::new("query")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.0);
    }
}
