//! Infrastructure layer - store, embedding and service implementations

pub mod cache;
pub mod embedding;
pub mod logging;
pub mod observability;
pub mod semantic_cache;
pub mod services;
