//! Postgres + pgvector store.
//!
//! Each collection is a table with a `vector(N)` column and a `JSONB`
//! metadata column. An HNSW index with cosine ops is created alongside the
//! table, and metadata filters are compiled to `JSONB` predicates so the
//! database filters and ranks in one statement.
//!
//! Vectors are bound as their text form (`[0.1,0.2,...]`) and cast with
//! `::vector`, so no pgvector client types are needed.

use async_trait::async_trait;
use quiver_core::{Error, Result};
use sqlx::Row;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, Postgres};
use sqlx::query::Query;

use crate::adapter::{Candidate, VectorAdapter, check_reserved_keys, contents};
use crate::filter::{SqlMode, SqlParam, compile_filter, pg_params, validate_identifier};
use crate::options::PostgresOptions;
use crate::resolver::ResolvedEmbedding;
use crate::score::ScoreScale;
use crate::sqlite::check_expected_dimensions;
use crate::types::{Capabilities, IndexSummary, Metadata, VectorDocument, VectorSearchParams, VectorSearchResult};

const PROVIDER: &str = "postgres";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Vector store backed by Postgres with the pgvector extension.
pub struct PostgresVectorStore {
    pool: PgPool,
    table: String,
    embedding: ResolvedEmbedding,
}

impl PostgresVectorStore {
    /// Connect and create the extension, table and index if needed.
    pub async fn connect(options: &PostgresOptions, embedding: ResolvedEmbedding) -> Result<Self> {
        validate_identifier(&options.table)?;
        check_expected_dimensions(options.dimensions, embedding.dimensions())?;

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
            .connect(&options.url)
            .await
            .map_err(backend)?;

        Self::with_pool(pool, &options.table, embedding).await
    }

    /// Use an existing pool.
    pub async fn with_pool(pool: PgPool, table: &str, embedding: ResolvedEmbedding) -> Result<Self> {
        validate_identifier(table)?;
        let store = Self {
            pool,
            table: table.to_string(),
            embedding,
        };
        store.init_schema().await?;
        log::debug!(
            "Opened postgres collection '{}' ({} dimensions)",
            store.table,
            store.embedding.dimensions()
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in schema_statements(&self.table, self.embedding.dimensions()) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }

        // vector(N) stores N as the column's type modifier
        let stored: i32 = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute
              WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        if stored > 0 && stored as usize != self.embedding.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: stored as usize,
                actual: self.embedding.dimensions(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorAdapter for PostgresVectorStore {
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

        let sql = upsert_sql(&self.table);
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for (doc, vector) in documents.iter().zip(&vectors) {
            sqlx::query(&sql)
                .bind(&doc.id)
                .bind(&doc.content)
                .bind(serde_json::to_string(&doc.metadata)?)
                .bind(vector_literal(vector))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;

        log::debug!("Indexed {} documents into postgres '{}'", documents.len(), self.table);
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

        let compiled = compile_filter(&params.filter, SqlMode::Jsonb, Some("d"))?;
        let query_vector = self.embedding.embed_query(&params.query).await?;
        let sql = search_sql(&self.table, compiled.predicate(), compiled.params.len());

        let query = sqlx::query(&sql).bind(vector_literal(&query_vector));
        let rows = bind_params(query, &compiled.params)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        log::debug!("postgres search returned {} rows", rows.len());

        rows.into_iter()
            .map(|row| {
                let metadata: String = row.try_get("metadata").map_err(backend)?;
                let distance: f64 = row.try_get("distance").map_err(backend)?;
                let candidate = Candidate {
                    id: row.try_get("id").map_err(backend)?,
                    content: Some(row.try_get("content").map_err(backend)?),
                    metadata: serde_json::from_str::<Metadata>(&metadata)?,
                    raw_score: distance as f32,
                };
                Ok(candidate.into_result(ScoreScale::CosineDistance, params))
            })
            .collect()
    }

    async fn remove(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table))
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
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

impl std::fmt::Debug for PostgresVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresVectorStore")
            .field("table", &self.table)
            .field("dimensions", &self.embedding.dimensions())
            .finish()
    }
}

// ============================================================================
// SQL
// ============================================================================

fn schema_statements(table: &str, dimensions: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                embedding vector({dimensions}) NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_hnsw
                ON {table} USING hnsw (embedding vector_cosine_ops)"
        ),
    ]
}

fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (id, content, metadata, embedding)
         VALUES ($1, $2, $3::jsonb, $4::vector)
         ON CONFLICT (id) DO UPDATE SET
            content = EXCLUDED.content,
            metadata = EXCLUDED.metadata,
            embedding = EXCLUDED.embedding"
    )
}

/// `$1` is the query vector, the filter takes `$2..`, the limit comes last.
fn search_sql(table: &str, predicate: &str, filter_params: usize) -> String {
    format!(
        "SELECT d.id, d.content, d.metadata::text AS metadata,
                (d.embedding <=> $1::vector)::float8 AS distance
           FROM {table} AS d
          WHERE {}
          ORDER BY distance ASC
          LIMIT ${}",
        pg_params(predicate, 1),
        filter_params + 2
    )
}

fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(f32::to_string).collect();
    format!("[{}]", parts.join(","))
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Integer(i) => query.bind(*i),
            SqlParam::Float(f) => query.bind(*f),
        };
    }
    query
}

fn backend(err: sqlx::Error) -> Error {
    Error::backend(PROVIDER, err)
}

// ============================================================================
// Tests
// ============================================================================
