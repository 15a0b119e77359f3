//! Observability infrastructure - cache metrics

mod metrics;

pub use metrics::{
    record_compute, record_degraded, record_lookup, record_promotion, CacheTier, DegradedReason,
    LookupResult,
};
