use std::path::Path;

use serde::Deserialize;

use crate::domain::SemanticCacheConfig;
use crate::infrastructure::cache::ExactStoreConfig;
use crate::infrastructure::embedding::EmbeddingSettings;

/// Environment prefix, e.g. `LLM_CACHE__SEMANTIC__SIMILARITY_THRESHOLD=0.9`
pub const ENV_PREFIX: &str = "LLM_CACHE";

/// Cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub exact: ExactStoreConfig,
    #[serde(default)]
    pub semantic: SemanticCacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl CacheSettings {
    /// Loads `config/default`, `config/local` and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder(None).build()?.try_deserialize()
    }

    /// Like `load`, with an extra required file layered over `config/local`
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::builder(Some(path.as_ref())).build()?.try_deserialize()
    }

    fn builder(
        extra: Option<&Path>,
    ) -> config::ConfigBuilder<config::builder::DefaultState> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = extra {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }
}
