//! Embedding provider factory

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::CacheError;

use super::hashing::{HashingEmbeddingProvider, DEFAULT_HASHING_DIMENSIONS};
use super::openai::{OpenAiEmbeddingProvider, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_EMBEDDING_MODEL};
use super::HttpClient;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    #[default]
    Hashing,
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderType::Hashing => write!(f, "hashing"),
            EmbeddingProviderType::Openai => write!(f, "openai"),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProviderType,
    /// Remote model name (openai only)
    #[serde(default = "default_model")]
    pub model: String,
    /// Vector size; hashing default 384, openai defaults to the model's size
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Re-normalize remote vectors to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_model() -> String {
    DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_normalize() -> bool {
    true
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::default(),
            model: default_model(),
            dimensions: None,
            api_key: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            normalize: default_normalize(),
        }
    }
}

/// Factory for creating embedding providers
#[derive(Debug, Default)]
pub struct EmbeddingProviderFactory;

impl EmbeddingProviderFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create(
        &self,
        settings: &EmbeddingSettings,
    ) -> Result<Arc<dyn EmbeddingProvider>, CacheError> {
        match settings.provider {
            EmbeddingProviderType::Hashing => {
                let dimensions = settings.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS);
                Ok(Arc::new(HashingEmbeddingProvider::new(dimensions)?))
            }
            EmbeddingProviderType::Openai => {
                let api_key = settings
                    .api_key
                    .as_deref()
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| {
                        CacheError::configuration("OpenAI embedding provider requires api_key")
                    })?;

                let client = HttpClient::with_timeout(Duration::from_secs(settings.timeout_secs))?;
                let mut provider =
                    OpenAiEmbeddingProvider::with_base_url(client, api_key, &settings.base_url)
                        .with_model(&settings.model)
                        .with_normalize(settings.normalize);

                if let Some(dimensions) = settings.dimensions {
                    provider = provider.with_dimensions(dimensions);
                }

                Ok(Arc::new(provider))
            }
        }
    }
}
