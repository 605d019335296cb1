//! BlockWriter processor.
//!
//! The BlockWriter is responsible for:
//! - Receiving blocks in height order from the block channel
//! - Recording every event of a block through the `EventRecorder`
//! - Resolving the block's linked events (outbounds, then fees)
//! - Committing the block together with its depth changes
//! - Publishing the new `BlockState`
//!
//! There is exactly one BlockWriter per process. A block is either fully
//! committed or the writer halts; a restart resumes from the last committed
//! height.

use crate::aggregate::TotalsSnapshot;
use crate::config::IndexerConfig;
use crate::events::{Block, BlockMeta, BlockReceiver, Event};
use crate::latest::{BlockState, LatestState};
use crate::metrics::IndexerMetrics;
use crate::processors::depth_recorder::DepthRecorder;
use crate::processors::recorder::EventRecorder;
use crate::store::{BlockCommit, CommitOutcome, EventStore, StoreError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Errors that stop block processing.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Storage error
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The height is already committed under a different hash
    #[error("block {height} already committed with hash {stored}, received {received}")]
    HashConflict {
        height: i64,
        stored: String,
        received: String,
    },

    /// Heights start at 1
    #[error("invalid block height {0}")]
    InvalidHeight(i64),

    /// A height at or below the last commit that storage does not know
    #[error("block {height} arrived after block {last} and was never committed")]
    OutOfOrder { height: i64, last: i64 },

    /// The stored block cannot seed the running totals
    #[error("block {0} has no aggregate state, cannot restore totals")]
    MissingAggState(i64),

    /// A previous block did not finish
    #[error("block {0} did not complete, the writer must be restarted")]
    Halted(i64),
}

/// Where the writer is in its block cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    ProcessingBlock(i64),
}

/// What happened to a block handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Recorded and committed.
    Committed,
    /// Already committed with the same hash. Nothing changed.
    Replayed,
}

pub struct BlockWriter {
    store: Arc<dyn EventStore>,
    recorder: EventRecorder,
    depths: DepthRecorder,
    latest: LatestState,
    metrics: IndexerMetrics,
    state: WriterState,
    last: Option<BlockMeta>,
}

impl BlockWriter {
    /// Create a BlockWriter with empty totals.
    ///
    /// Call [`restore`](Self::restore) before the first block to continue
    /// from committed state.
    pub fn new(
        store: Arc<dyn EventStore>,
        latest: LatestState,
        config: &IndexerConfig,
        metrics: IndexerMetrics,
    ) -> Self {
        Self {
            recorder: EventRecorder::new(store.clone(), config.outbound_timeout, metrics.clone()),
            store,
            depths: DepthRecorder::new(),
            latest,
            metrics,
            state: WriterState::Idle,
            last: None,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The last committed block, if any.
    pub fn last_block(&self) -> Option<&BlockMeta> {
        self.last.as_ref()
    }

    pub fn totals(&self) -> TotalsSnapshot {
        self.recorder.totals().snapshot()
    }

    /// Load the last committed block and its aggregate state from storage.
    ///
    /// Fails with [`BlockError::MissingAggState`] when the block was stored
    /// without one.
    pub async fn restore(&mut self) -> Result<Option<BlockMeta>, BlockError> {
        let Some(stored) = self.store.last_block().await? else {
            info!("no committed blocks, starting from empty state");
            return Ok(None);
        };
        let meta = stored.meta();
        let Some(snapshot) = stored.agg_state else {
            error!(height = meta.height, "committed block has no aggregate state");
            return Err(BlockError::MissingAggState(meta.height));
        };

        self.recorder.restore_totals(&snapshot);
        self.latest.publish(BlockState::new(&meta, &snapshot));
        self.depths = DepthRecorder::with_previous(snapshot);
        self.metrics.committed_height.set(meta.height);
        info!(
            height = meta.height,
            timestamp = %meta.timestamp,
            "restored state from last committed block"
        );
        self.last = Some(meta.clone());
        Ok(Some(meta))
    }

    /// Record, resolve and commit one block.
    pub async fn process_block(&mut self, block: Block) -> Result<BlockOutcome, BlockError> {
        if let WriterState::ProcessingBlock(height) = self.state {
            return Err(BlockError::Halted(height));
        }
        let meta = block.meta;
        if meta.height <= 0 {
            return Err(BlockError::InvalidHeight(meta.height));
        }
        if let Some(last) = &self.last
            && meta.height <= last.height
        {
            return self.check_replay(&meta, last.height).await;
        }

        let started = Instant::now();
        self.state = WriterState::ProcessingBlock(meta.height);
        let before = self.recorder.totals().snapshot();

        for event in &block.events {
            self.recorder.record(event);
        }
        let (outbound, fee) = self.recorder.flush_linked(&meta).await;
        debug!(
            height = meta.height,
            events = block.events.len(),
            outbound_matched = outbound.matched,
            outbound_dead = outbound.dead,
            fee_matched = fee.matched,
            fee_dead = fee.dead,
            "block recorded"
        );

        let outcome = self.commit_block(&meta).await?;
        if outcome == BlockOutcome::Replayed {
            // Storage already had this block; undo the second application.
            self.recorder.restore_totals(&before);
        }
        self.state = WriterState::Idle;
        self.metrics
            .block_process_seconds
            .observe(started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Durably mark `meta` committed with the current totals and the rows
    /// recorded since the last commit, then publish the resulting state.
    ///
    /// Insert-if-absent: a height already stored with the same hash is a
    /// no-op, with a different hash it is a [`BlockError::HashConflict`].
    /// Either way the recorded rows are discarded.
    pub async fn commit_block(&mut self, meta: &BlockMeta) -> Result<BlockOutcome, BlockError> {
        let events = self.recorder.take_block_events();
        if let Some(last) = &self.last
            && meta.height <= last.height
        {
            return self.check_replay(meta, last.height).await;
        }

        let snapshot = self.recorder.totals().snapshot();
        let depth_rows = self.depths.diff(meta.timestamp, &snapshot);
        let changed_pools = depth_rows.len();
        let commit = BlockCommit {
            meta: meta.clone(),
            agg_state: snapshot,
            depth_rows,
            events,
        };

        match self.store.commit_block(&commit).await? {
            CommitOutcome::Inserted { lost_rows } => {
                for lost in &lost_rows {
                    let tx = commit.events.get(lost.index).and_then(Event::tx_id);
                    error!(
                        height = meta.height,
                        kind = lost.kind,
                        tx,
                        error = %lost.error,
                        "event row lost"
                    );
                    self.metrics.event_rows_lost.with_label_values(&[lost.kind]).inc();
                }
            }
            CommitOutcome::AlreadyCommitted { hash } => {
                return if hash == meta.hash {
                    info!(height = meta.height, "block already committed, skipping");
                    Ok(BlockOutcome::Replayed)
                } else {
                    Err(self.conflict(meta, &hash))
                };
            }
        }

        self.latest.publish(BlockState::new(meta, &commit.agg_state));
        self.depths.save(commit.agg_state);
        self.metrics.committed_height.set(meta.height);
        self.last = Some(meta.clone());
        debug!(height = meta.height, changed_pools, "block committed");
        Ok(BlockOutcome::Committed)
    }

    /// The latest committed block: height, timestamp and hash.
    pub fn latest_block(&self) -> BlockMeta {
        self.latest.load().meta()
    }

    /// Receive blocks until shutdown or until the channel closes.
    ///
    /// Returns the error that halted processing, if any.
    pub async fn run(
        mut self,
        mut block_rx: BlockReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), BlockError> {
        info!(
            last_height = self.last.as_ref().map(|m| m.height).unwrap_or_default(),
            "BlockWriter started"
        );

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("BlockWriter received shutdown signal");
                        break;
                    }
                }

                Some(block) = block_rx.recv() => {
                    let height = block.meta.height;
                    if let Err(e) = self.process_block(block).await {
                        error!(height, error = %e, "block processing halted");
                        return Err(e);
                    }
                }

                else => {
                    info!("block channel closed");
                    break;
                }
            }
        }

        info!("BlockWriter shutdown complete");
        Ok(())
    }

    async fn check_replay(&self, meta: &BlockMeta, last: i64) -> Result<BlockOutcome, BlockError> {
        match self.store.block_hash(meta.height).await? {
            Some(hash) if hash == meta.hash => {
                info!(height = meta.height, "block already committed, skipping");
                Ok(BlockOutcome::Replayed)
            }
            Some(hash) => Err(self.conflict(meta, &hash)),
            None => Err(BlockError::OutOfOrder {
                height: meta.height,
                last,
            }),
        }
    }

    fn conflict(&self, meta: &BlockMeta, stored: &[u8]) -> BlockError {
        let err = BlockError::HashConflict {
            height: meta.height,
            stored: hex::encode(stored),
            received: hex::encode(&meta.hash),
        };
        error!(height = meta.height, error = %err, "conflicting block hash");
        err
    }
}
