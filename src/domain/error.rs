use thiserror::Error;

/// Errors raised by the cache layer
///
/// Only `InvalidRequestMaterial` is ever surfaced by the orchestrator; every
/// other variant is recovered locally and degrades the lookup instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid request material: {message}")]
    InvalidRequestMaterial { message: String },

    #[error("Embedding unavailable: {provider} - {message}")]
    EmbeddingUnavailable { provider: String, message: String },

    #[error("Semantic backend unavailable: {message}")]
    SemanticBackendUnavailable { message: String },

    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CacheError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequestMaterial {
            message: message.into(),
        }
    }

    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn semantic_backend(message: impl Into<String>) -> Self {
        Self::SemanticBackendUnavailable {
            message: message.into(),
        }
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Error returned by `CacheOrchestrator::fetch`
///
/// `E` is whatever the caller's compute closure fails with; it is handed back
/// verbatim.
#[derive(Debug, Error)]
pub enum FetchError<E> {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[source] CacheError),

    #[error("Compute failed: {0}")]
    Compute(E),
}

impl<E> FetchError<E> {
    /// Returns the compute error, if this is one
    pub fn into_compute(self) -> Option<E> {
        match self {
            Self::Compute(e) => Some(e),
            Self::InvalidRequest(_) => None,
        }
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }
}
