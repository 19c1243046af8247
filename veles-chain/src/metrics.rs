//! Metrics collection for observability
//!
//! Prometheus metrics exposed by the chain core:
//!
//! - `chain_blocks_applied_total` - Blocks applied
//! - `chain_operations_applied_total` - Operations applied
//! - `chain_events_emitted_total` - Outbound events emitted
//! - `chain_block_apply_duration_seconds` - Block application latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Blocks applied
    pub blocks_applied: IntCounter,

    /// Operations applied
    pub operations_applied: IntCounter,

    /// Outbound events emitted
    pub events_emitted: IntCounter,

    /// Block application latency
    pub apply_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_applied = IntCounter::with_opts(Opts::new(
            "chain_blocks_applied_total",
            "Total number of blocks applied",
        ))?;
        registry.register(Box::new(blocks_applied.clone()))?;

        let operations_applied = IntCounter::with_opts(Opts::new(
            "chain_operations_applied_total",
            "Total number of operations applied",
        ))?;
        registry.register(Box::new(operations_applied.clone()))?;

        let events_emitted = IntCounter::with_opts(Opts::new(
            "chain_events_emitted_total",
            "Total number of outbound events emitted",
        ))?;
        registry.register(Box::new(events_emitted.clone()))?;

        let apply_duration = Histogram::with_opts(HistogramOpts::new(
            "chain_block_apply_duration_seconds",
            "Block application latency",
        ))?;
        registry.register(Box::new(apply_duration.clone()))?;

        Ok(Self {
            blocks_applied,
            operations_applied,
            events_emitted,
            apply_duration,
            registry,
        })
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_applied", &self.blocks_applied.get())
            .field("operations_applied", &self.operations_applied.get())
            .finish()
    }
}
