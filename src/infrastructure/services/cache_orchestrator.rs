//! Two-tier response cache in front of an expensive compute call
//!
//! Lookup order is exact key, then nearest semantic neighbor, then the
//! caller's compute function. Semantic hits are promoted into the exact store
//! so the next identical request never touches the embedding model. Every
//! cache-side failure degrades the call instead of failing it; only invalid
//! request material and compute errors reach the caller.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::domain::cache::{
    CacheKey, CacheKeyDeriver, ExactStore, JsonCodec, PayloadCodec, RequestMaterial,
    Sha256KeyDeriver,
};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::llm::{last_user_content, Message};
use crate::domain::semantic_cache::{
    SemanticIndex, SemanticMatch, SemanticRecord, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::domain::{CacheError, FetchError};
use crate::infrastructure::cache::ExactStoreFactory;
use crate::infrastructure::embedding::EmbeddingProviderFactory;
use crate::infrastructure::observability::{
    record_compute, record_degraded, record_lookup, record_promotion, CacheTier, DegradedReason,
    LookupResult,
};
use crate::infrastructure::semantic_cache::SemanticIndexFactory;

/// Extracts the text embedded for the semantic lookup; `None` skips it
pub type QueryTextFn = Arc<dyn Fn(&[Message]) -> Option<String> + Send + Sync>;

/// Where a fetched value came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheSource {
    Exact,
    Semantic { similarity: f32 },
    Computed,
}

/// A degraded path taken during one fetch
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWarning {
    /// Exact store read or write failed
    CacheUnavailable { message: String },
    EmbeddingUnavailable { message: String },
    SemanticIndexUnavailable { message: String },
    /// Stored payload did not decode; treated as a miss
    CorruptPayload { tier: CacheTier, message: String },
    /// Fresh value could not be encoded, so nothing was stored
    EncodeFailed { message: String },
}

impl CacheWarning {
    fn reason(&self) -> DegradedReason {
        match self {
            CacheWarning::CacheUnavailable { .. } => DegradedReason::ExactStoreUnavailable,
            CacheWarning::EmbeddingUnavailable { .. } => DegradedReason::EmbeddingUnavailable,
            CacheWarning::SemanticIndexUnavailable { .. } => {
                DegradedReason::SemanticIndexUnavailable
            }
            CacheWarning::CorruptPayload { .. } => DegradedReason::CorruptPayload,
            CacheWarning::EncodeFailed { .. } => DegradedReason::EncodeFailed,
        }
    }
}

/// Value returned by `fetch_detailed`
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub source: CacheSource,
    pub warnings: Vec<CacheWarning>,
}

impl<T> Fetched<T> {
    pub fn is_cached(&self) -> bool {
        !matches!(self.source, CacheSource::Computed)
    }
}

/// Per-call overrides
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub query_text_fn: Option<QueryTextFn>,
    pub similarity_threshold: Option<f32>,
}

impl Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("query_text_fn", &self.query_text_fn.as_ref().map(|_| "<fn>"))
            .field("similarity_threshold", &self.similarity_threshold)
            .finish()
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_text_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Message]) -> Option<String> + Send + Sync + 'static,
    {
        self.query_text_fn = Some(Arc::new(f));
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }
}

/// Snapshot of the orchestrator's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub semantic_hits: u64,
    /// Calls that ended in compute
    pub misses: u64,
    pub promotions: u64,
    pub degraded: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.semantic_hits
    }

    /// Fraction of fetches served from either tier
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    degraded: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of the semantic tier for one fetch
struct SemanticProbe<T> {
    hit: Option<(T, SemanticMatch)>,
    /// Query text and embedding, reused for the write-back after compute
    pending: Option<(String, Vec<f32>)>,
}

impl<T> SemanticProbe<T> {
    fn skipped() -> Self {
        Self {
            hit: None,
            pending: None,
        }
    }

    fn miss(text: String, embedding: Vec<f32>) -> Self {
        Self {
            hit: None,
            pending: Some((text, embedding)),
        }
    }
}

/// Builder for `CacheOrchestrator`
pub struct CacheOrchestratorBuilder {
    exact: Arc<dyn ExactStore>,
    semantic: Option<(Arc<dyn SemanticIndex>, Arc<dyn EmbeddingProvider>)>,
    deriver: Arc<dyn CacheKeyDeriver>,
    similarity_threshold: f32,
    query_text_fn: QueryTextFn,
}

impl CacheOrchestratorBuilder {
    /// Enables the semantic tier
    pub fn with_semantic(
        mut self,
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.semantic = Some((index, embedder));
        self
    }

    pub fn with_key_deriver(mut self, deriver: Arc<dyn CacheKeyDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_query_text_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Message]) -> Option<String> + Send + Sync + 'static,
    {
        self.query_text_fn = Arc::new(f);
        self
    }

    pub fn build(self) -> CacheOrchestrator {
        CacheOrchestrator {
            exact: self.exact,
            semantic: self.semantic,
            deriver: self.deriver,
            similarity_threshold: self.similarity_threshold,
            query_text_fn: self.query_text_fn,
            counters: StatsCounters::default(),
        }
    }
}

/// Exact store plus optional semantic index in front of a compute call
pub struct CacheOrchestrator {
    exact: Arc<dyn ExactStore>,
    semantic: Option<(Arc<dyn SemanticIndex>, Arc<dyn EmbeddingProvider>)>,
    deriver: Arc<dyn CacheKeyDeriver>,
    similarity_threshold: f32,
    query_text_fn: QueryTextFn,
    counters: StatsCounters,
}

impl Debug for CacheOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOrchestrator")
            .field("exact", &self.exact.backend_name())
            .field("semantic", &self.semantic.as_ref().map(|(index, _)| index.collection()))
            .field("deriver", &self.deriver)
            .field("similarity_threshold", &self.similarity_threshold)
            .finish()
    }
}

impl CacheOrchestrator {
    pub fn builder(exact: Arc<dyn ExactStore>) -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder {
            exact,
            semantic: None,
            deriver: Arc::new(Sha256KeyDeriver::new()),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            query_text_fn: Arc::new(last_user_content),
        }
    }

    /// Wires stores and providers from settings
    ///
    /// The exact store must open. A semantic backend or embedding provider
    /// that cannot be brought up leaves the orchestrator exact-only.
    pub async fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let exact = ExactStoreFactory::new().create(&settings.exact).await?;
        let mut builder = Self::builder(exact)
            .with_similarity_threshold(settings.semantic.similarity_threshold);

        let index = match SemanticIndexFactory::new().create(&settings.semantic).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Semantic cache disabled, continuing exact-only");
                None
            }
        };

        if let Some(index) = index {
            match EmbeddingProviderFactory::new().create(&settings.embedding) {
                Ok(embedder) => builder = builder.with_semantic(index, embedder),
                Err(e) => {
                    warn!(error = %e, "Embedding provider unavailable, continuing exact-only")
                }
            }
        }

        let orchestrator = builder.build();
        info!(
            exact = orchestrator.exact.backend_name(),
            semantic = orchestrator.has_semantic(),
            threshold = orchestrator.similarity_threshold,
            "Cache orchestrator ready"
        );
        Ok(orchestrator)
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    pub fn exact_store(&self) -> &Arc<dyn ExactStore> {
        &self.exact
    }

    pub fn semantic_index(&self) -> Option<&Arc<dyn SemanticIndex>> {
        self.semantic.as_ref().map(|(index, _)| index)
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub fn key_for(&self, request: &RequestMaterial) -> Result<CacheKey, CacheError> {
        self.deriver.derive_key(request)
    }

    /// Nearest stored neighbor of `text`, regardless of threshold
    pub async fn nearest_neighbor(&self, text: &str) -> Result<Option<SemanticMatch>, CacheError> {
        let Some((index, embedder)) = &self.semantic else {
            return Err(CacheError::semantic_backend("semantic cache is not configured"));
        };

        let embedding = embedder.embed(text).await?;
        index.query(&embedding).await
    }

    /// Returns the cached response for `request`, computing it on a miss
    pub async fn fetch<T, E, F, Fut>(
        &self,
        request: &RequestMaterial,
        compute: F,
    ) -> Result<T, FetchError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(RequestMaterial) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetch_with(request, &FetchOptions::default(), compute)
            .await
    }

    /// `fetch` with per-call overrides
    pub async fn fetch_with<T, E, F, Fut>(
        &self,
        request: &RequestMaterial,
        options: &FetchOptions,
        compute: F,
    ) -> Result<T, FetchError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(RequestMaterial) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let codec = JsonCodec::<T>::new();
        self.fetch_detailed(request, options, &codec, compute)
            .await
            .map(|fetched| fetched.value)
    }

    /// Full fetch, reporting the source of the value and any degraded paths
    pub async fn fetch_detailed<T, E, F, Fut>(
        &self,
        request: &RequestMaterial,
        options: &FetchOptions,
        codec: &dyn PayloadCodec<T>,
        compute: F,
    ) -> Result<Fetched<T>, FetchError<E>>
    where
        F: FnOnce(RequestMaterial) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.deriver.derive_key(request).map_err(FetchError::InvalidRequest)?;
        let mut warnings = Vec::new();

        if let Some(value) = self.exact_lookup(&key, codec, &mut warnings).await {
            self.counters.exact_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Fetched {
                value,
                source: CacheSource::Exact,
                warnings,
            });
        }

        let probe = self.semantic_lookup(request, options, codec, &mut warnings).await;

        if let Some((value, found)) = probe.hit {
            if let Err(e) = self.exact.put(&key, &found.payload).await {
                warn!(key = %key, error = %e, "Failed to promote semantic hit");
                self.degrade(
                    &mut warnings,
                    CacheWarning::CacheUnavailable {
                        message: e.to_string(),
                    },
                );
            } else {
                record_promotion();
                self.counters.promotions.fetch_add(1, Ordering::Relaxed);
            }

            self.counters.semantic_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Fetched {
                value,
                source: CacheSource::Semantic {
                    similarity: found.similarity,
                },
                warnings,
            });
        }

        record_compute();
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss, computing");

        let value = compute(request.clone()).await.map_err(FetchError::Compute)?;

        let payload = match codec.encode(&value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Computed value not cacheable");
                self.degrade(
                    &mut warnings,
                    CacheWarning::EncodeFailed {
                        message: e.to_string(),
                    },
                );
                return Ok(Fetched {
                    value,
                    source: CacheSource::Computed,
                    warnings,
                });
            }
        };

        if let Err(e) = self.exact.put(&key, &payload).await {
            warn!(key = %key, error = %e, "Failed to store computed value");
            self.degrade(
                &mut warnings,
                CacheWarning::CacheUnavailable {
                    message: e.to_string(),
                },
            );
        }

        if let (Some((index, _)), Some((text, embedding))) = (&self.semantic, probe.pending) {
            let stored = match SemanticRecord::new(index.collection(), embedding, text, payload) {
                Ok(record) => index.upsert(record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                warn!(error = %e, "Failed to index computed value");
                self.degrade(
                    &mut warnings,
                    CacheWarning::SemanticIndexUnavailable {
                        message: e.to_string(),
                    },
                );
            }
        }

        Ok(Fetched {
            value,
            source: CacheSource::Computed,
            warnings,
        })
    }

    async fn exact_lookup<T>(
        &self,
        key: &CacheKey,
        codec: &dyn PayloadCodec<T>,
        warnings: &mut Vec<CacheWarning>,
    ) -> Option<T> {
        let payload = match self.exact.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                record_lookup(CacheTier::Exact, LookupResult::Miss);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Exact store unavailable");
                self.degrade(
                    warnings,
                    CacheWarning::CacheUnavailable {
                        message: e.to_string(),
                    },
                );
                return None;
            }
        };

        match codec.decode(&payload) {
            Ok(value) => {
                record_lookup(CacheTier::Exact, LookupResult::Hit);
                debug!(key = %key, "Exact cache hit");
                Some(value)
            }
            Err(e) => {
                record_lookup(CacheTier::Exact, LookupResult::Miss);
                warn!(key = %key, error = %e, "Corrupt exact cache entry");
                self.degrade(
                    warnings,
                    CacheWarning::CorruptPayload {
                        tier: CacheTier::Exact,
                        message: e.to_string(),
                    },
                );
                None
            }
        }
    }

    async fn semantic_lookup<T>(
        &self,
        request: &RequestMaterial,
        options: &FetchOptions,
        codec: &dyn PayloadCodec<T>,
        warnings: &mut Vec<CacheWarning>,
    ) -> SemanticProbe<T> {
        let Some((index, embedder)) = &self.semantic else {
            return SemanticProbe::skipped();
        };

        let query_text_fn = options.query_text_fn.as_ref().unwrap_or(&self.query_text_fn);
        let Some(text) = query_text_fn(request.messages()) else {
            debug!("No query text, skipping semantic lookup");
            return SemanticProbe::skipped();
        };

        let embedding = match embedder.embed(&text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Embedding failed, skipping semantic lookup");
                self.degrade(
                    warnings,
                    CacheWarning::EmbeddingUnavailable {
                        message: e.to_string(),
                    },
                );
                return SemanticProbe::skipped();
            }
        };

        let found = match index.query(&embedding).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Semantic index query failed");
                self.degrade(
                    warnings,
                    CacheWarning::SemanticIndexUnavailable {
                        message: e.to_string(),
                    },
                );
                return SemanticProbe::miss(text, embedding);
            }
        };

        let threshold = options
            .similarity_threshold
            .unwrap_or(self.similarity_threshold);

        let Some(found) = found.filter(|m| m.similarity >= threshold) else {
            record_lookup(CacheTier::Semantic, LookupResult::Miss);
            debug!(threshold, "No semantic neighbor above threshold");
            return SemanticProbe::miss(text, embedding);
        };

        match codec.decode(&found.payload) {
            Ok(value) => {
                record_lookup(CacheTier::Semantic, LookupResult::Hit);
                debug!(
                    similarity = found.similarity,
                    id = %found.id,
                    "Semantic cache hit"
                );
                SemanticProbe {
                    hit: Some((value, found)),
                    pending: None,
                }
            }
            Err(e) => {
                record_lookup(CacheTier::Semantic, LookupResult::Miss);
                warn!(id = %found.id, error = %e, "Corrupt semantic cache entry");
                self.degrade(
                    warnings,
                    CacheWarning::CorruptPayload {
                        tier: CacheTier::Semantic,
                        message: e.to_string(),
                    },
                );
                SemanticProbe::miss(text, embedding)
            }
        }
    }

    fn degrade(&self, warnings: &mut Vec<CacheWarning>, warning: CacheWarning) {
        record_degraded(warning.reason());
        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::MockExactStore;
    use crate::domain::embedding::{
        cosine_similarity, FixedEmbeddingProvider, MockEmbeddingProvider,
    };
    use crate::domain::semantic_cache::MockSemanticIndex;
    use crate::domain::semantic_cache::{SemanticBackend, SemanticCacheConfig};
    use crate::infrastructure::cache::{ExactStoreConfig, InMemoryExactStore};
    use crate::infrastructure::embedding::HashingEmbeddingProvider;
    use crate::infrastructure::semantic_cache::InMemorySemanticIndex;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const COLLECTION: &str = "request_cache";

    /// Counts compute invocations
    #[derive(Debug, Default, Clone)]
    struct ComputeSpy {
        calls: Arc<AtomicUsize>,
    }

    impl ComputeSpy {
        fn returning(
            &self,
            value: &str,
        ) -> impl FnOnce(RequestMaterial) -> std::future::Ready<Result<String, String>> {
            let calls = self.calls.clone();
            let value = value.to_string();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(value))
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn request(text: &str) -> RequestMaterial {
        RequestMaterial::new("gpt-4o-mini", vec![Message::user(text)])
            .with_extras(&json!({"temperature": 0.5, "max_tokens": 600}))
            .unwrap()
    }

    fn exact_only() -> (Arc<InMemoryExactStore>, CacheOrchestrator) {
        let store = Arc::new(InMemoryExactStore::new());
        let orchestrator = CacheOrchestrator::builder(store.clone()).build();
        (store, orchestrator)
    }

    /// "hello" at [1, 0]; "hello there" at cosine 0.9 from it
    fn fixed_embedder() -> FixedEmbeddingProvider {
        FixedEmbeddingProvider::new(2)
            .with_vector("hello", vec![1.0, 0.0])
            .with_vector("hello there", vec![0.9, 0.19f32.sqrt()])
    }

    async fn seeded_index(payload: &str) -> Arc<InMemorySemanticIndex> {
        let index = Arc::new(InMemorySemanticIndex::new(COLLECTION));
        index
            .upsert(SemanticRecord::new(COLLECTION, vec![1.0, 0.0], "hello", payload).unwrap())
            .await
            .unwrap();
        index
    }

    fn codec() -> JsonCodec<String> {
        JsonCodec::new()
    }

    #[tokio::test]
    async fn test_hello_computes_once() {
        let (_, orchestrator) = exact_only();
        let spy = ComputeSpy::default();

        let first = orchestrator.fetch(&request("hello"), spy.returning("R")).await.unwrap();
        let second = orchestrator.fetch(&request("hello"), spy.returning("X")).await.unwrap();

        assert_eq!(first, "R");
        assert_eq!(second, "R");
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_computed_value_written_to_exact_store() {
        let (store, orchestrator) = exact_only();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        let key = orchestrator.key_for(&request("hello")).unwrap();
        assert_eq!(fetched.source, CacheSource::Computed);
        assert!(fetched.warnings.is_empty());
        assert_eq!(store.get(&key).await.unwrap(), Some("\"R\"".to_string()));
    }

    #[tokio::test]
    async fn test_exact_hit_skips_semantic_and_compute() {
        let store = Arc::new(InMemoryExactStore::new());
        let mut index = MockSemanticIndex::new();
        index.expect_query().times(0);
        index.expect_upsert().times(0);
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().times(0);

        let orchestrator = CacheOrchestrator::builder(store.clone())
            .with_semantic(Arc::new(index), Arc::new(embedder))
            .build();
        let key = orchestrator.key_for(&request("hello")).unwrap();
        store.put(&key, "\"cached\"").await.unwrap();

        let spy = ComputeSpy::default();
        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(fetched.value, "cached");
        assert_eq!(fetched.source, CacheSource::Exact);
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn test_semantic_hit_is_returned_and_promoted() {
        let store = Arc::new(InMemoryExactStore::new());
        let orchestrator = CacheOrchestrator::builder(store.clone())
            .with_semantic(seeded_index("\"seeded\"").await, Arc::new(fixed_embedder()))
            .build();
        let spy = ComputeSpy::default();

        let first = orchestrator
            .fetch_detailed(
                &request("hello there"),
                &FetchOptions::new(),
                &codec(),
                spy.returning("R"),
            )
            .await
            .unwrap();

        assert_eq!(first.value, "seeded");
        match first.source {
            CacheSource::Semantic { similarity } => assert!((similarity - 0.9).abs() < 1e-5),
            other => panic!("expected semantic hit, got {other:?}"),
        }

        let key = orchestrator.key_for(&request("hello there")).unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some("\"seeded\"".to_string()));

        let second = orchestrator
            .fetch_detailed(
                &request("hello there"),
                &FetchOptions::new(),
                &codec(),
                spy.returning("R"),
            )
            .await
            .unwrap();

        assert_eq!(second.value, "seeded");
        assert_eq!(second.source, CacheSource::Exact);
        assert_eq!(spy.calls(), 0);

        let stats = orchestrator.stats();
        assert_eq!(stats.semantic_hits, 1);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.promotions, 1);
    }

    #[tokio::test]
    async fn test_promotion_skips_embedding_on_repeat() {
        let store = Arc::new(InMemoryExactStore::new());
        let embedder = Arc::new(fixed_embedder());
        let orchestrator = CacheOrchestrator::builder(store)
            .with_semantic(seeded_index("\"seeded\"").await, embedder.clone())
            .build();
        let spy = ComputeSpy::default();

        orchestrator.fetch(&request("hello there"), spy.returning("R")).await.unwrap();
        orchestrator.fetch(&request("hello there"), spy.returning("R")).await.unwrap();

        assert_eq!(embedder.calls(), 1);
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        let similarity = cosine_similarity(&[0.9, 0.19f32.sqrt()], &[1.0, 0.0]);
        let just_above = f32::from_bits(similarity.to_bits() + 1);
        let spy = ComputeSpy::default();

        let at = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(seeded_index("\"seeded\"").await, Arc::new(fixed_embedder()))
            .build();
        let hit = at
            .fetch_with(
                &request("hello there"),
                &FetchOptions::new().with_similarity_threshold(similarity),
                spy.returning("R"),
            )
            .await
            .unwrap();

        assert_eq!(hit, "seeded");
        assert_eq!(spy.calls(), 0);

        let above = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(seeded_index("\"seeded\"").await, Arc::new(fixed_embedder()))
            .build();
        let miss = above
            .fetch_with(
                &request("hello there"),
                &FetchOptions::new().with_similarity_threshold(just_above),
                spy.returning("R"),
            )
            .await
            .unwrap();

        assert_eq!(miss, "R");
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_threshold_rejects_distant_neighbor() {
        let embedder = FixedEmbeddingProvider::new(2).with_vector("goodbye", vec![0.8, 0.6]);
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(seeded_index("\"seeded\"").await, Arc::new(embedder))
            .build();
        let spy = ComputeSpy::default();

        let value = orchestrator.fetch(&request("goodbye"), spy.returning("R")).await.unwrap();

        assert_eq!(value, "R");
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_compute() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed()
            .returning(|_| Err(CacheError::embedding("mock", "model not loaded")));
        let index = Arc::new(InMemorySemanticIndex::new(COLLECTION));
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(index.clone(), Arc::new(embedder))
            .build();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(fetched.value, "R");
        assert_eq!(fetched.source, CacheSource::Computed);
        assert!(matches!(
            fetched.warnings.as_slice(),
            [CacheWarning::EmbeddingUnavailable { .. }]
        ));
        assert_eq!(index.len().await.unwrap(), 0);
        assert_eq!(orchestrator.stats().degraded, 1);
    }

    #[tokio::test]
    async fn test_computed_value_indexed_for_semantic_reuse() {
        let index = Arc::new(InMemorySemanticIndex::new(COLLECTION));
        let embedder = Arc::new(HashingEmbeddingProvider::default());
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(index.clone(), embedder)
            .build();
        let spy = ComputeSpy::default();

        orchestrator
            .fetch(&request("What is the capital of France?"), spy.returning("Paris"))
            .await
            .unwrap();

        let reworded = RequestMaterial::new(
            "gpt-4o-mini",
            vec![Message::user("What is the capital of France?")],
        );
        let fetched = orchestrator
            .fetch_detailed(&reworded, &FetchOptions::new(), &codec(), spy.returning("X"))
            .await
            .unwrap();

        assert_eq!(index.len().await.unwrap(), 1);
        assert_eq!(fetched.value, "Paris");
        assert!(matches!(fetched.source, CacheSource::Semantic { .. }));
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_user_turn_skips_semantic() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().times(0);
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(Arc::new(InMemorySemanticIndex::new(COLLECTION)), Arc::new(embedder))
            .build();
        let spy = ComputeSpy::default();

        let system_only = RequestMaterial::new("m", vec![Message::system("be brief")]);
        let value = orchestrator.fetch(&system_only, spy.returning("R")).await.unwrap();

        assert_eq!(value, "R");
    }

    #[tokio::test]
    async fn test_query_text_override() {
        let embedder = FixedEmbeddingProvider::new(2).with_vector("hello", vec![1.0, 0.0]);
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_semantic(seeded_index("\"seeded\"").await, Arc::new(embedder))
            .build();
        let spy = ComputeSpy::default();

        let options = FetchOptions::new().with_query_text_fn(|messages: &[Message]| {
            messages.first().map(|m| m.content.clone())
        });
        let material = RequestMaterial::new(
            "m",
            vec![Message::user("hello"), Message::assistant("hi"), Message::user("again")],
        );
        let value = orchestrator
            .fetch_with(&material, &options, spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(value, "seeded");
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_exact_payload_falls_through() {
        let (store, orchestrator) = exact_only();
        let key = orchestrator.key_for(&request("hello")).unwrap();
        store.put(&key, "{not json").await.unwrap();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(fetched.value, "R");
        assert!(matches!(
            fetched.warnings.as_slice(),
            [CacheWarning::CorruptPayload { tier: CacheTier::Exact, .. }]
        ));
        assert_eq!(store.get(&key).await.unwrap(), Some("\"R\"".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_semantic_payload_falls_through() {
        let store = Arc::new(InMemoryExactStore::new());
        let orchestrator = CacheOrchestrator::builder(store)
            .with_semantic(seeded_index("{broken").await, Arc::new(fixed_embedder()))
            .build();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(
                &request("hello there"),
                &FetchOptions::new(),
                &codec(),
                spy.returning("R"),
            )
            .await
            .unwrap();

        assert_eq!(fetched.value, "R");
        assert_eq!(spy.calls(), 1);
        assert!(matches!(
            fetched.warnings.as_slice(),
            [CacheWarning::CorruptPayload { tier: CacheTier::Semantic, .. }]
        ));
    }

    #[tokio::test]
    async fn test_exact_store_outage_is_fail_open() {
        let mut store = MockExactStore::new();
        store
            .expect_get()
            .returning(|_| Err(CacheError::storage("database is locked")));
        store
            .expect_put()
            .returning(|_, _| Err(CacheError::storage("database is locked")));
        let orchestrator = CacheOrchestrator::builder(Arc::new(store)).build();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(fetched.value, "R");
        assert_eq!(fetched.warnings.len(), 2);
        assert!(fetched
            .warnings
            .iter()
            .all(|w| matches!(w, CacheWarning::CacheUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_compute_error_propagates_and_nothing_is_stored() {
        let (store, orchestrator) = exact_only();

        let result: Result<String, FetchError<String>> = orchestrator
            .fetch(&request("hello"), |_| async { Err("upstream 500".to_string()) })
            .await;

        assert_eq!(result.unwrap_err().into_compute(), Some("upstream 500".to_string()));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[derive(Debug)]
    struct FailingKeyDeriver;

    impl CacheKeyDeriver for FailingKeyDeriver {
        fn derive_key(&self, _request: &RequestMaterial) -> Result<CacheKey, CacheError> {
            Err(CacheError::invalid_request("unserializable"))
        }
    }

    #[tokio::test]
    async fn test_invalid_request_surfaces_before_compute() {
        let orchestrator = CacheOrchestrator::builder(Arc::new(InMemoryExactStore::new()))
            .with_key_deriver(Arc::new(FailingKeyDeriver))
            .build();
        let spy = ComputeSpy::default();

        let result = orchestrator.fetch(&request("hello"), spy.returning("R")).await;

        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));
        assert_eq!(spy.calls(), 0);
    }

    /// Index whose writes always fail
    #[derive(Debug)]
    struct ReadOnlyIndex;

    #[async_trait]
    impl SemanticIndex for ReadOnlyIndex {
        async fn query(&self, _embedding: &[f32]) -> Result<Option<SemanticMatch>, CacheError> {
            Ok(None)
        }

        async fn upsert(&self, _record: SemanticRecord) -> Result<(), CacheError> {
            Err(CacheError::storage("read-only database"))
        }

        async fn len(&self) -> Result<u64, CacheError> {
            Ok(0)
        }

        fn collection(&self) -> &str {
            COLLECTION
        }
    }

    #[tokio::test]
    async fn test_semantic_write_failure_is_swallowed() {
        let store = Arc::new(InMemoryExactStore::new());
        let orchestrator = CacheOrchestrator::builder(store.clone())
            .with_semantic(Arc::new(ReadOnlyIndex), Arc::new(fixed_embedder()))
            .build();
        let spy = ComputeSpy::default();

        let fetched = orchestrator
            .fetch_detailed(&request("hello"), &FetchOptions::new(), &codec(), spy.returning("R"))
            .await
            .unwrap();

        assert_eq!(fetched.value, "R");
        assert!(matches!(
            fetched.warnings.as_slice(),
            [CacheWarning::SemanticIndexUnavailable { .. }]
        ));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats_hit_rate() {
        let (_, orchestrator) = exact_only();
        let spy = ComputeSpy::default();

        for _ in 0..4 {
            orchestrator.fetch(&request("hello"), spy.returning("R")).await.unwrap();
        }

        let stats = orchestrator.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.exact_hits, 3);
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_from_settings_degrades_to_exact_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"file").unwrap();

        let settings = CacheSettings {
            exact: ExactStoreConfig::sqlite(dir.path().join("llm_cache.sqlite")),
            semantic: SemanticCacheConfig::new().with_persist_dir(&blocker),
            ..Default::default()
        };

        let orchestrator = CacheOrchestrator::from_settings(&settings).await.unwrap();
        let spy = ComputeSpy::default();

        assert!(!orchestrator.has_semantic());
        assert_eq!(
            orchestrator.fetch(&request("hello"), spy.returning("R")).await.unwrap(),
            "R"
        );
        assert!(orchestrator.nearest_neighbor("hello").await.is_err());
    }

    #[tokio::test]
    async fn test_from_settings_with_in_memory_semantic() {
        let settings = CacheSettings {
            exact: ExactStoreConfig::in_memory(),
            semantic: SemanticCacheConfig::new().with_backend(SemanticBackend::InMemory),
            ..Default::default()
        };

        let orchestrator = CacheOrchestrator::from_settings(&settings).await.unwrap();
        let spy = ComputeSpy::default();
        orchestrator.fetch(&request("hello"), spy.returning("R")).await.unwrap();

        let neighbor = orchestrator.nearest_neighbor("hello").await.unwrap().unwrap();
        assert_eq!(neighbor.document_text, "hello");
        assert_eq!(neighbor.payload, "\"R\"");
        assert!((neighbor.similarity - 1.0).abs() < 1e-5);
    }
}
