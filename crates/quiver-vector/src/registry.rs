//! Adapter construction by provider name.

use std::sync::Arc;

use quiver_core::{Error, Result};

use crate::adapter::VectorAdapter;
use crate::memory::MemoryVectorClient;
use crate::options::ProviderOptions;
use crate::pinecone::PineconeClient;
use crate::qdrant::QdrantClient;
use crate::resolver::EmbeddingConfig;
use crate::rest::RestVectorStore;
use crate::sqlite::SqliteVectorStore;
use crate::validation::validate_config;

/// Provider names accepted in configuration.
pub const PROVIDERS: &[&str] = &["sqlite", "postgres", "pinecone", "qdrant", "memory"];

/// Validate `options`, resolve the embedding and open the adapter.
///
/// Validation runs first, so configuration errors surface before any
/// embedding model is loaded or any connection is attempted. Warnings are
/// logged and do not stop construction.
pub async fn create_adapter(
    options: &ProviderOptions,
    embedding: Option<Arc<EmbeddingConfig>>,
) -> Result<Box<dyn VectorAdapter>> {
    let report = validate_config(options).into_result()?;
    for warning in report.warnings() {
        log::debug!("{}: {}: {}", report.provider, warning.field, warning.message);
    }

    let embedding = embedding.ok_or_else(|| {
        Error::config(format!(
            "provider {} needs an embedding configuration",
            options.name()
        ))
    })?;
    let resolved = embedding.resolve().await?.clone();
    log::debug!(
        "Creating {} adapter ({} via {})",
        options.name(),
        resolved.dimensions(),
        resolved.provider_name()
    );

    let adapter: Box<dyn VectorAdapter> = match options {
        ProviderOptions::Sqlite(o) => Box::new(SqliteVectorStore::open(o, resolved).await?),
        #[cfg(feature = "store-postgres")]
        ProviderOptions::Postgres(o) => {
            Box::new(crate::postgres::PostgresVectorStore::connect(o, resolved).await?)
        }
        #[cfg(not(feature = "store-postgres"))]
        ProviderOptions::Postgres(_) => {
            return Err(Error::config(
                "postgres support is not compiled in (enable the `store-postgres` feature)",
            ));
        }
        ProviderOptions::Pinecone(o) => {
            Box::new(RestVectorStore::new(PineconeClient::new(o)?, resolved).await?)
        }
        ProviderOptions::Qdrant(o) => {
            Box::new(RestVectorStore::new(QdrantClient::new(o)?, resolved).await?)
        }
        ProviderOptions::Memory(_) => {
            Box::new(RestVectorStore::new(MemoryVectorClient::new(), resolved).await?)
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::options::{MemoryOptions, PineconeOptions, SqliteOptions};
    use crate::types::{VectorDocument, VectorSearchParams};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_config(dims: usize) -> Arc<EmbeddingConfig> {
        Arc::new(EmbeddingConfig::from_provider(Arc::new(MockEmbeddingProvider::new(dims))))
    }

    /// Counts embedder construction.
    fn counting_config(count: Arc<AtomicUsize>) -> Arc<EmbeddingConfig> {
        Arc::new(EmbeddingConfig::lazy(move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockEmbeddingProvider::new(4)) as Arc<dyn EmbeddingProvider>)
            }
        }))
    }

    #[test]
    fn test_provider_names_match_options() {
        assert!(PROVIDERS.contains(&ProviderOptions::default().name()));
        assert!(PROVIDERS.contains(&ProviderOptions::Memory(MemoryOptions::default()).name()));
    }

    #[tokio::test]
    async fn test_memory_adapter() {
        let adapter = create_adapter(&ProviderOptions::Memory(MemoryOptions::default()), Some(mock_config(8)))
            .await
            .unwrap();
        assert_eq!(adapter.name(), "memory");
        assert_eq!(adapter.dimensions(), 8);
        assert!(!adapter.capabilities().filter);
        assert!(format!("{adapter:?}").contains("memory"));

        adapter.index(&[VectorDocument::new("a", "hello")]).await.unwrap();
        let results = adapter.search(&VectorSearchParams::new("hello")).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_sqlite_adapter() {
        let options = ProviderOptions::Sqlite(SqliteOptions {
            path: ":memory:".into(),
            ..Default::default()
        });
        let adapter = create_adapter(&options, Some(mock_config(8))).await.unwrap();
        assert_eq!(adapter.name(), "sqlite");
        assert!(adapter.capabilities().filter);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_and_memory_score_alike() {
        let config = mock_config(16);
        let sqlite = create_adapter(
            &ProviderOptions::Sqlite(SqliteOptions {
                path: ":memory:".into(),
                ..Default::default()
            }),
            Some(config.clone()),
        )
        .await
        .unwrap();
        let memory = create_adapter(&ProviderOptions::Memory(MemoryOptions::default()), Some(config))
            .await
            .unwrap();

        let docs = [
            VectorDocument::new("a", "async runtimes in rust"),
            VectorDocument::new("b", "tokio task scheduling"),
            VectorDocument::new("c", "sourdough bread recipe"),
            VectorDocument::new("d", "borrow checker errors"),
        ];
        sqlite.index(&docs).await.unwrap();
        memory.index(&docs).await.unwrap();

        let params = VectorSearchParams::new("tokio async tasks").with_limit(4);
        let from_sqlite = sqlite.search(&params).await.unwrap();
        let from_memory = memory.search(&params).await.unwrap();
        assert_eq!(from_sqlite.len(), 4);
        assert_eq!(from_memory.len(), 4);

        for result in &from_sqlite {
            let other = from_memory.iter().find(|r| r.id == result.id).unwrap();
            assert!(
                (result.score - other.score).abs() < 1e-4,
                "{}: sqlite {} memory {}",
                result.id,
                result.score,
                other.score
            );
        }
        sqlite.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_embedding_is_config_error() {
        let err = create_adapter(&ProviderOptions::Memory(MemoryOptions::default()), None)
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_embedding() {
        let count = Arc::new(AtomicUsize::new(0));
        let err = create_adapter(
            &ProviderOptions::Pinecone(PineconeOptions::default()),
            Some(counting_config(count.clone())),
        )
        .await
        .unwrap_err();
        assert!(err.is_config());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_shared_between_adapters() {
        let count = Arc::new(AtomicUsize::new(0));
        let config = counting_config(count.clone());
        let memory = ProviderOptions::Memory(MemoryOptions::default());

        create_adapter(&memory, Some(config.clone())).await.unwrap();
        create_adapter(&memory, Some(config)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[cfg(not(feature = "store-postgres"))]
    #[tokio::test]
    async fn test_postgres_unavailable() {
        use crate::options::PostgresOptions;

        let options = ProviderOptions::Postgres(PostgresOptions {
            url: "postgres://localhost/db".into(),
            table: "documents".into(),
            dimensions: None,
            max_connections: None,
        });
        let err = create_adapter(&options, Some(mock_config(4))).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("store-postgres"));
    }

    /// Fails every call, to prove the embedder is resolved once up front.
    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::operation("model offline"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_resolution_failure_propagates() {
        let config = Arc::new(EmbeddingConfig::from_provider(Arc::new(Broken)));
        let err = create_adapter(&ProviderOptions::Memory(MemoryOptions::default()), Some(config))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Operation(_)));
    }
}
