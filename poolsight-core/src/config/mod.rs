//! Engine configuration.

use crate::aggregate::DEFAULT_OUTBOUND_TIMEOUT;

/// Settings of the block-processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// How far back outbound and fee events may look for their origin.
    pub outbound_timeout: time::Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            outbound_timeout: DEFAULT_OUTBOUND_TIMEOUT,
        }
    }
}
