//! Text-to-vector providers.
//!
//! Adapters never talk to an embedder directly; they hold a
//! [`ResolvedEmbedding`](crate::resolver::ResolvedEmbedding) built from an
//! [`EmbeddingConfig`](crate::resolver::EmbeddingConfig), which wraps one of:
//!
//! - [`MockEmbeddingProvider`]: hashed bag-of-words vectors, no model needed
//! - [`OpenAiEmbeddingProvider`](crate::openai::OpenAiEmbeddingProvider): any
//!   OpenAI-compatible `/embeddings` endpoint
//! - `FastEmbedProvider`: local ONNX models (feature `embed-fastembed`)

use async_trait::async_trait;
use quiver_core::Result;

/// Source of embedding vectors.
///
/// A provider only produces vectors. Counting, dimension checks and the
/// empty-input shortcut live in
/// [`ResolvedEmbedding::embed`](crate::resolver::ResolvedEmbedding::embed).
/// Providers wrapping a non-`Sync` model lock it internally.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per text in input order.
    ///
    /// Falls back to one [`embed`](Self::embed) call per text.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Short provider name, used in logs and errors.
    fn name(&self) -> &str;

    /// Model identifier, if the provider has one worth looking up.
    fn model(&self) -> Option<&str> {
        None
    }
}

/// Offline provider for tests and demos.
///
/// Each lower-cased word is hashed into one signed bucket and the result is
/// scaled to unit length, so texts sharing words land close together and
/// equal texts get equal vectors. Blank text yields the zero vector.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Provider producing `dimensions`-long vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        for word in text.split_whitespace() {
            let digest = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            vector[slot] += if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        }

        let norm = crate::score::l2_norm(&vector);
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================
