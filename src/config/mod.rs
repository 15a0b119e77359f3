//! Layered settings: optional files, then `LLM_CACHE__*` environment variables

mod settings;

pub use settings::{CacheSettings, LogFormat, LoggingConfig, ENV_PREFIX};
