//! Infrastructure services

mod cache_orchestrator;

pub use cache_orchestrator::{
    CacheOrchestrator, CacheOrchestratorBuilder, CacheSource, CacheStats, CacheWarning,
    FetchOptions, Fetched, QueryTextFn,
};
