//! OpenAI embedding provider implementation

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::HttpClientTrait;
use crate::domain::embedding::{l2_normalize, EmbeddingProvider};
use crate::domain::CacheError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Known OpenAI embedding models and their dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Native dimensions of a known model
pub fn model_dimensions(model: &str) -> Option<usize> {
    EMBEDDING_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dims)| *dims)
}

/// OpenAI embedding provider
///
/// One request per text. When `dimensions` is set explicitly it is forwarded
/// to the API (only the `text-embedding-3-*` models honour it).
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dimensions: usize,
    requested_dimensions: Option<usize>,
    normalize: bool,
}

impl<C: HttpClientTrait> OpenAiEmbeddingProvider<C> {
    /// Create a new OpenAI embedding provider
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    /// Create a new provider with custom base URL
    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        let auth_header = format!("Bearer {}", api_key);
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
            model: DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            dimensions: model_dimensions(DEFAULT_OPENAI_EMBEDDING_MODEL).unwrap_or(1536),
            requested_dimensions: None,
            normalize: false,
        }
    }

    /// Use another model; resets the dimensions to the model's native size
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        if self.requested_dimensions.is_none() {
            self.dimensions = model_dimensions(&self.model).unwrap_or(self.dimensions);
        }
        self
    }

    /// Ask the API for shortened vectors
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self.requested_dimensions = Some(dimensions);
        self
    }

    /// Re-normalize returned vectors to unit length
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn build_request(&self, text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        if let Some(dims) = self.requested_dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Vec<f32>, CacheError> {
        let response: OpenAiEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            CacheError::embedding("openai", format!("Failed to parse embedding response: {}", e))
        })?;

        let mut embedding = response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| CacheError::embedding("openai", "Response contained no embeddings"))?;

        if embedding.len() != self.dimensions {
            return Err(CacheError::embedding(
                "openai",
                format!(
                    "Expected {} dimensions, got {}",
                    self.dimensions,
                    embedding.len()
                ),
            ));
        }

        if self.normalize {
            l2_normalize(&mut embedding);
        }

        Ok(embedding)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OpenAiEmbeddingProvider<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let url = self.embeddings_url();
        let body = self.build_request(text);

        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let response = self
            .client
            .post_json(&url, self.headers(), &body)
            .await
            .map_err(|e| match e {
                CacheError::EmbeddingUnavailable { message, .. } => {
                    CacheError::embedding("openai", message)
                }
                other => CacheError::embedding("openai", other.to_string()),
            })?;

        self.parse_response(response)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// OpenAI API types for embeddings

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
