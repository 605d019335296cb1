//! Prometheus metrics of the indexing pipeline.

use prometheus::{
    Histogram, IntCounterVec, IntGauge, Registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_gauge_with_registry,
};

const BLOCK_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Clone, Debug)]
pub struct IndexerMetrics {
    /// Linked events matched to their origin, by type, ref_type and class.
    pub linked_found: IntCounterVec,
    /// Linked events dropped unresolved, by type.
    pub linked_dead: IntCounterVec,
    pub events_recorded: IntCounterVec,
    pub event_rows_lost: IntCounterVec,
    pub committed_height: IntGauge,
    pub block_process_seconds: Histogram,
}

impl IndexerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            linked_found: register_int_counter_vec_with_registry!(
                "poolsight_linked_found",
                "Number of linked events matched to their originating transaction",
                &["type", "ref_type", "class"],
                registry,
            )?,
            linked_dead: register_int_counter_vec_with_registry!(
                "poolsight_linked_dead",
                "Number of linked events dropped without a match",
                &["type"],
                registry,
            )?,
            events_recorded: register_int_counter_vec_with_registry!(
                "poolsight_events_recorded",
                "Number of events recorded, by event type",
                &["type"],
                registry,
            )?,
            event_rows_lost: register_int_counter_vec_with_registry!(
                "poolsight_event_rows_lost",
                "Number of event rows that failed to persist, by event type",
                &["type"],
                registry,
            )?,
            committed_height: register_int_gauge_with_registry!(
                "poolsight_committed_height",
                "Height of the last committed block",
                registry,
            )?,
            block_process_seconds: register_histogram_with_registry!(
                "poolsight_block_process_seconds",
                "Time to record, resolve and commit one block",
                BLOCK_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )?,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_testing() -> Self {
        Self::new(&Registry::new()).unwrap()
    }

    pub fn dead_count(&self, kind: &str) -> u64 {
        self.linked_dead.with_label_values(&[kind]).get()
    }

    pub fn found_count(&self, kind: &str, ref_type: &str, class: &str) -> u64 {
        self.linked_found
            .with_label_values(&[kind, ref_type, class])
            .get()
    }
}
