//! FastEmbed embedding provider.
//!
//! Local embedding generation with the `fastembed` crate. Model files are
//! downloaded on first construction and cached.
//!
//! # Thread Safety
//!
//! `fastembed::TextEmbedding` needs `&mut` access to embed, so it lives
//! behind `Arc<Mutex<>>` and every call runs on `tokio::task::spawn_blocking`.
//!
//! # Feature Gate
//!
//! This module requires the `embed-fastembed` feature.

use crate::embedding::EmbeddingProvider;
use async_trait::async_trait;
use quiver_core::{Error, Result};
use std::sync::{Arc, Mutex};

/// Supported model names, in canonical form.
pub const SUPPORTED_MODELS: &[&str] = &[
    "bge-small-en-v1.5",
    "all-minilm-l6-v2",
    "bge-base-en-v1.5",
    "bge-large-en-v1.5",
];

/// Map a model name to its canonical name and fastembed variant.
fn resolve_model(name: &str) -> Result<(&'static str, fastembed::EmbeddingModel)> {
    use fastembed::EmbeddingModel;

    let name = name.rsplit('/').next().unwrap_or(name);
    match name.to_ascii_lowercase().as_str() {
        "bge-small-en-v1.5" | "bgesmallenv15" => {
            Ok(("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15))
        }
        "all-minilm-l6-v2" | "allminilml6v2" => {
            Ok(("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2))
        }
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15)),
        "bge-large-en-v1.5" | "bgelargeenv15" => {
            Ok(("bge-large-en-v1.5", EmbeddingModel::BGELargeENV15))
        }
        _ => Err(Error::config(format!(
            "Unknown embedding model: '{name}'. Supported: {}",
            SUPPORTED_MODELS.join(", ")
        ))),
    }
}

/// FastEmbed-based embedding provider.
///
/// | Name | Dimension | Size |
/// |------|-----------|------|
/// | `bge-small-en-v1.5` | 384 | ~50MB |
/// | `all-minilm-l6-v2` | 384 | ~80MB |
/// | `bge-base-en-v1.5` | 768 | ~130MB |
/// | `bge-large-en-v1.5` | 1024 | ~335MB |
///
/// The dimension is not probed here; [`EmbeddingConfig`](crate::EmbeddingConfig)
/// looks it up from [`EmbeddingProvider::model`].
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: &'static str,
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it into `cache_dir` when not cached.
    ///
    /// Loading is blocking and may download hundreds of megabytes; call it
    /// from an [`EmbeddingConfig::lazy`](crate::EmbeddingConfig::lazy)
    /// initialiser (see [`FastEmbedProvider::load`]).
    pub fn new(model_name: &str, cache_dir: Option<&str>) -> Result<Self> {
        let (canonical, variant) = resolve_model(model_name)?;

        let mut init = fastembed::InitOptions::new(variant);
        if let Some(path) = cache_dir {
            init = init.with_cache_dir(std::path::PathBuf::from(path));
        }

        let text_embedding = fastembed::TextEmbedding::try_new(init)
            .map_err(|e| Error::backend("fastembed", format!("failed to load model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: canonical,
        })
    }

    /// Load a model on the blocking pool.
    pub async fn load(model_name: String, cache_dir: Option<String>) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(&model_name, cache_dir.as_deref()))
            .await
            .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::backend("fastembed", format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::backend("fastembed", "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn name(&self) -> &str {
        "fastembed"
    }

    fn model(&self) -> Option<&str> {
        Some(self.model_name)
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
