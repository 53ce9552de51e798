//! Embedding resolution.
//!
//! An [`EmbeddingConfig`] is a factory for a [`ResolvedEmbedding`]: it owns an
//! async initialiser for the provider and caches the outcome for the life of
//! the config. Resolution is single-flight; concurrent first callers all wait
//! on the same in-flight initialisation.
//!
//! Dimensionality is fixed at resolution time, in this order:
//!
//! 1. an explicit [`EmbeddingConfig::with_dimensions`] override;
//! 2. the [known model table](known_dimensions);
//! 3. one probe embedding, taking the vector length.

use futures::future::BoxFuture;
use quiver_core::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::embedding::EmbeddingProvider;

/// Text embedded once to discover the dimensionality of an unknown model.
pub const PROBE_TEXT: &str = "dimension probe";

const KNOWN_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("all-minilm-l6-v2", 384),
    ("nomic-embed-text", 768),
    ("mxbai-embed-large", 1024),
    ("embed-english-v3.0", 1024),
    ("mistral-embed", 1024),
    ("text-embedding-004", 768),
];

/// Dimensionality of a well-known embedding model.
///
/// Matching ignores ASCII case and any `owner/` prefix, so
/// `BAAI/bge-small-en-v1.5` resolves like `bge-small-en-v1.5`.
pub fn known_dimensions(model: &str) -> Option<usize> {
    let name = model.rsplit('/').next().unwrap_or(model);
    KNOWN_MODELS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, dims)| *dims)
}

type ProviderInit =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn EmbeddingProvider>>> + Send + Sync>;

/// Lazily-initialised embedding configuration.
///
/// Share one config (usually behind an `Arc`) between every adapter that
/// should reuse the same provider instance.
pub struct EmbeddingConfig {
    init: ProviderInit,
    model: Option<String>,
    dimensions: Option<usize>,
    resolved: OnceCell<ResolvedEmbedding>,
}

impl EmbeddingConfig {
    /// Wrap an already-constructed provider.
    pub fn from_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::lazy(move || {
            let provider = provider.clone();
            async move { Ok(provider) }
        })
    }

    /// Build the provider on first use with `init`.
    ///
    /// `init` runs at most once per successful resolution; a failed attempt
    /// leaves the config unresolved so a later call can retry.
    pub fn lazy<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn EmbeddingProvider>>> + Send + 'static,
    {
        Self {
            init: Box::new(move || Box::pin(init())),
            model: None,
            dimensions: None,
            resolved: OnceCell::new(),
        }
    }

    /// Model name used for the known-dimension lookup.
    ///
    /// Defaults to the provider's own [`EmbeddingProvider::model`].
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Fix the dimensionality instead of looking it up or probing.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Whether resolution has already completed.
    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// Resolve the provider and its dimensionality, once.
    pub async fn resolve(&self) -> Result<&ResolvedEmbedding> {
        self.resolved
            .get_or_try_init(|| async {
                let provider = (self.init)().await?;
                let dimensions = self.discover_dimensions(provider.as_ref()).await?;
                log::debug!(
                    "Resolved embedding provider '{}' with {} dimensions",
                    provider.name(),
                    dimensions
                );
                Ok::<_, Error>(ResolvedEmbedding {
                    provider,
                    dimensions,
                })
            })
            .await
    }

    async fn discover_dimensions(&self, provider: &dyn EmbeddingProvider) -> Result<usize> {
        if let Some(dimensions) = self.dimensions {
            if dimensions == 0 {
                return Err(Error::config("embedding dimensions must be greater than 0"));
            }
            return Ok(dimensions);
        }

        let model = self.model.as_deref().or_else(|| provider.model());
        if let Some(dimensions) = model.and_then(known_dimensions) {
            return Ok(dimensions);
        }

        log::debug!(
            "Probing dimensions of embedding provider '{}'",
            provider.name()
        );
        let probe = provider.embed(PROBE_TEXT).await?;
        if probe.is_empty() {
            return Err(Error::config(format!(
                "embedding provider '{}' returned an empty probe vector",
                provider.name()
            )));
        }
        Ok(probe.len())
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

/// A resolved provider with a fixed dimensionality.
#[derive(Clone)]
pub struct ResolvedEmbedding {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
}

impl ResolvedEmbedding {
    /// Embedding dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed `texts`, one vector per text, in order.
    ///
    /// An empty slice returns no vectors without calling the provider. A
    /// single text goes through [`EmbeddingProvider::embed`], more through
    /// [`EmbeddingProvider::embed_batch`].
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = match texts {
            [] => return Ok(Vec::new()),
            [text] => vec![self.provider.embed(text).await?],
            _ => self.provider.embed_batch(texts).await?,
        };

        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingCountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .pop()
            .ok_or(Error::EmbeddingCountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}

impl fmt::Debug for ResolvedEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEmbedding")
            .field("provider", &self.provider.name())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and returns a configurable number of vectors per batch.
    struct CountingProvider {
        dims: usize,
        model: Option<&'static str>,
        calls: AtomicUsize,
        drop_from_batch: usize,
    }

    impl CountingProvider {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                model: None,
                calls: AtomicUsize::new(0),
                drop_from_batch: 0,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.5; self.dims])
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = texts.len().saturating_sub(self.drop_from_batch);
            Ok(vec![vec![0.5; self.dims]; n])
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> Option<&str> {
            self.model
        }
    }

    #[test]
    fn test_known_dimensions() {
        assert_eq!(known_dimensions("text-embedding-3-small"), Some(1536));
        assert_eq!(known_dimensions("BAAI/bge-small-en-v1.5"), Some(384));
        assert_eq!(known_dimensions("All-MiniLM-L6-v2"), Some(384));
        assert_eq!(known_dimensions("my-custom-model"), None);
    }

    #[tokio::test]
    async fn test_explicit_dimensions_skip_probe() {
        let provider = Arc::new(CountingProvider::new(8));
        let config = EmbeddingConfig::from_provider(provider.clone()).with_dimensions(8);

        let resolved = config.resolve().await.unwrap();
        assert_eq!(resolved.dimensions(), 8);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_dimensions_rejected() {
        let config = EmbeddingConfig::from_provider(Arc::new(MockEmbeddingProvider::new(4)))
            .with_dimensions(0);
        assert!(config.resolve().await.unwrap_err().is_config());
        assert!(!config.is_resolved());
    }

    #[tokio::test]
    async fn test_known_model_skips_probe() {
        let provider = Arc::new(CountingProvider {
            model: Some("nomic-embed-text"),
            ..CountingProvider::new(768)
        });
        let config = EmbeddingConfig::from_provider(provider.clone());

        assert_eq!(config.resolve().await.unwrap().dimensions(), 768);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_config_model_overrides_provider_model() {
        let provider = Arc::new(CountingProvider::new(3072));
        let config =
            EmbeddingConfig::from_provider(provider.clone()).with_model("text-embedding-3-large");
        assert_eq!(config.resolve().await.unwrap().dimensions(), 3072);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_probes_once() {
        let provider = Arc::new(CountingProvider::new(5));
        let config = EmbeddingConfig::from_provider(provider.clone());

        assert_eq!(config.resolve().await.unwrap().dimensions(), 5);
        assert_eq!(config.resolve().await.unwrap().dimensions(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_single_flight() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let config = EmbeddingConfig::lazy(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(MockEmbeddingProvider::new(4)) as Arc<dyn EmbeddingProvider>)
            }
        });

        let results = futures::future::join_all((0..8).map(|_| config.resolve())).await;
        assert!(results.iter().all(|r| r.as_ref().unwrap().dimensions() == 4));
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(config.is_resolved());
    }

    #[tokio::test]
    async fn test_failed_init_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let config = EmbeddingConfig::lazy(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(Error::config("model not downloaded"))
                } else {
                    Ok(Arc::new(MockEmbeddingProvider::new(2)) as Arc<dyn EmbeddingProvider>)
                }
            }
        });

        assert!(config.resolve().await.is_err());
        assert_eq!(config.resolve().await.unwrap().dimensions(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embed_empty_does_not_call_provider() {
        let provider = Arc::new(CountingProvider::new(3));
        let config = EmbeddingConfig::from_provider(provider.clone()).with_dimensions(3);
        let resolved = config.resolve().await.unwrap();

        assert!(resolved.embed(&[]).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch() {
        let provider = Arc::new(CountingProvider {
            drop_from_batch: 1,
            ..CountingProvider::new(3)
        });
        let config = EmbeddingConfig::from_provider(provider).with_dimensions(3);
        let resolved = config.resolve().await.unwrap();

        let err = resolved.embed(&["a", "b"]).await.unwrap_err();
        assert!(err.to_string().contains("Embedding count mismatch"));
        assert!(matches!(
            err,
            Error::EmbeddingCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_dimension_mismatch() {
        let config = EmbeddingConfig::from_provider(Arc::new(MockEmbeddingProvider::new(4)))
            .with_dimensions(8);
        let resolved = config.resolve().await.unwrap();

        let err = resolved.embed_query("hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_single_and_batch() {
        let provider = Arc::new(CountingProvider::new(2));
        let config = EmbeddingConfig::from_provider(provider.clone()).with_dimensions(2);
        let resolved = config.resolve().await.unwrap();

        assert_eq!(resolved.embed(&["one"]).await.unwrap().len(), 1);
        assert_eq!(resolved.embed(&["a", "b", "c"]).await.unwrap().len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolved.provider_name(), "counting");
    }
}
