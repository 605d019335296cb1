//! Durable storage seam.
//!
//! The engine only needs a handful of primitives from storage: find swaps
//! and withdraws by tx id, commit a block atomically together with its event
//! rows, and a few point and range reads. [`PgEventStore`] implements them on
//! PostgreSQL, [`MemoryEventStore`] in process memory.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use crate::aggregate::TotalsSnapshot;
use crate::events::{BlockMeta, Event};
use crate::utils::Nano;
use async_trait::async_trait;
use compact_str::CompactString;
use thiserror::Error;

/// Errors raised by an [`EventStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Aggregate state could not be encoded or decoded
    #[error("aggregate state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the write
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A swap row found while resolving linked events.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SwapLink {
    pub tx: String,
    pub pool: String,
    pub from_asset: String,
}

/// A withdraw row found while resolving linked events.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WithdrawLink {
    pub tx: String,
    pub pool: String,
}

/// Full state of one pool at the time it last changed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DepthChangeRow {
    pub pool: CompactString,
    pub asset_e8: i64,
    pub rune_e8: i64,
    pub synth_e8: i64,
    pub units: i64,
    pub block_timestamp: Nano,
}

/// A committed block as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub height: i64,
    pub timestamp: Nano,
    pub hash: Vec<u8>,
    pub agg_state: Option<TotalsSnapshot>,
}

impl StoredBlock {
    pub fn meta(&self) -> BlockMeta {
        BlockMeta {
            height: self.height,
            timestamp: self.timestamp,
            hash: self.hash.clone(),
        }
    }
}

/// Everything written when a block is marked committed.
///
/// Event rows are part of the commit, so a block that never commits leaves
/// no rows behind and can be replayed without duplicates.
#[derive(Debug, Clone)]
pub struct BlockCommit {
    pub meta: BlockMeta,
    pub agg_state: TotalsSnapshot,
    pub depth_rows: Vec<DepthChangeRow>,
    /// The block's events in recording order.
    pub events: Vec<Event>,
}

/// An event row that could not be written. The rest of the commit went
/// through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostRow {
    /// Position of the event in [`BlockCommit::events`].
    pub index: usize,
    pub kind: &'static str,
    pub error: String,
}

/// Result of an insert-if-absent block commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The height was new and is now committed.
    Inserted { lost_rows: Vec<LostRow> },
    /// The height was already present. Nothing was written.
    AlreadyCommitted { hash: Vec<u8> },
}

/// Time window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Nano,
    pub to: Nano,
}

impl TimeWindow {
    pub fn new(from: Nano, to: Nano) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, t: Nano) -> bool {
        self.from <= t && t <= self.to
    }
}

/// Storage operations used by the indexer.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Swaps with `tx` in `tx_ids` and `block_timestamp >= since`.
    async fn find_swaps(&self, tx_ids: &[String], since: Nano) -> Result<Vec<SwapLink>, StoreError>;

    /// Withdraws with `tx` in `tx_ids` and `block_timestamp >= since`.
    async fn find_withdraws(
        &self,
        tx_ids: &[String],
        since: Nano,
    ) -> Result<Vec<WithdrawLink>, StoreError>;

    /// Atomically insert the block log entry, its aggregate state, depth
    /// rows and event rows, unless the height is already present.
    ///
    /// A single event row that fails is skipped and reported in the outcome
    /// instead of failing the block.
    async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError>;

    /// Hash committed at `height`, if any.
    async fn block_hash(&self, height: i64) -> Result<Option<Vec<u8>>, StoreError>;

    /// The highest committed block.
    async fn last_block(&self) -> Result<Option<StoredBlock>, StoreError>;

    /// Depth changes of a pool within the window, oldest first.
    async fn depth_history(
        &self,
        pool: &str,
        window: TimeWindow,
    ) -> Result<Vec<DepthChangeRow>, StoreError>;

    /// The latest depth row of every pool at or before `moment`.
    async fn depths_at(&self, moment: Nano) -> Result<Vec<DepthChangeRow>, StoreError>;

    /// The latest status of a pool at or before `moment`.
    async fn pool_status(&self, pool: &str, moment: Nano) -> Result<Option<String>, StoreError>;
}
