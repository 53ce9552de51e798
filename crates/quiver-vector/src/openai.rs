//! OpenAI-compatible embedding provider.
//!
//! Talks to any service exposing `POST {base_url}/embeddings` with the OpenAI
//! request and response shape (OpenAI itself, Mistral, Ollama's
//! compatibility endpoint, most self-hosted gateways).

use async_trait::async_trait;
use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::http::{join_url, send_json};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "openai";

/// Embedding provider for OpenAI-compatible HTTP APIs.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbeddingProvider {
    /// Creates a provider for `model` against the default OpenAI endpoint.
    ///
    /// # Arguments
    ///
    /// * `model` - Model ID (e.g., "text-embedding-3-small")
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.into(),
            dimensions: None,
        }
    }

    /// Use a different API base URL (including any `/v1` suffix).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send `Authorization: Bearer <api_key>`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Ask the service to shorten vectors to `dimensions`
    /// (supported by the `text-embedding-3` family).
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    async fn request(&self, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
        };

        let mut request = self
            .client
            .post(join_url(&self.base_url, "embeddings"))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let mut response: EmbeddingResponse = send_json(PROVIDER, request).await?;
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .pop()
            .ok_or_else(|| Error::backend(PROVIDER, "no embedding in response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.request(texts).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> Option<&str> {
        // shortened vectors no longer match the model's published size
        match self.dimensions {
            Some(_) => None,
            None => Some(self.model.as_str()),
        }
    }
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}
