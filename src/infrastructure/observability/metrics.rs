//! Cache metrics recorded through the `metrics` facade
//!
//! No recorder is installed here; applications embedding the cache install
//! their own exporter. Without one every call is a no-op.

use metrics::counter;

/// Tier consulted by a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Exact,
    Semantic,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Exact => "exact",
            CacheTier::Semantic => "semantic",
        }
    }
}

/// Outcome of a tier lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Hit,
    Miss,
}

impl LookupResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupResult::Hit => "hit",
            LookupResult::Miss => "miss",
        }
    }
}

/// Why a call ran with less caching than configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    ExactStoreUnavailable,
    EmbeddingUnavailable,
    SemanticIndexUnavailable,
    CorruptPayload,
    EncodeFailed,
}

impl DegradedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedReason::ExactStoreUnavailable => "exact_store_unavailable",
            DegradedReason::EmbeddingUnavailable => "embedding_unavailable",
            DegradedReason::SemanticIndexUnavailable => "semantic_index_unavailable",
            DegradedReason::CorruptPayload => "corrupt_payload",
            DegradedReason::EncodeFailed => "encode_failed",
        }
    }
}

/// Record a lookup against one tier
pub fn record_lookup(tier: CacheTier, result: LookupResult) {
    let labels = [
        ("tier", tier.as_str().to_string()),
        ("result", result.as_str().to_string()),
    ];

    counter!("llm_cache_lookups_total", &labels).increment(1);
}

/// Record a semantic hit copied into the exact store
pub fn record_promotion() {
    counter!("llm_cache_promotions_total").increment(1);
}

/// Record a call of the caller's compute function
pub fn record_compute() {
    counter!("llm_cache_computes_total").increment(1);
}

/// Record a degraded path
pub fn record_degraded(reason: DegradedReason) {
    counter!("llm_cache_degraded_total", "reason" => reason.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_values() {
        assert_eq!(CacheTier::Exact.as_str(), "exact");
        assert_eq!(CacheTier::Semantic.as_str(), "semantic");
        assert_eq!(LookupResult::Hit.as_str(), "hit");
        assert_eq!(LookupResult::Miss.as_str(), "miss");
        assert_eq!(
            DegradedReason::EmbeddingUnavailable.as_str(),
            "embedding_unavailable"
        );
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_lookup(CacheTier::Exact, LookupResult::Miss);
        record_promotion();
        record_compute();
        record_degraded(DegradedReason::CorruptPayload);
    }
}
