//! In-memory [`EventStore`].
//!
//! Backs tests and `storage = "memory"` runs. Commits are applied under a
//! single write lock, which gives them the same all-or-nothing behaviour as
//! the database transaction.

use super::{
    BlockCommit, CommitOutcome, DepthChangeRow, EventStore, LostRow, StoreError, StoredBlock,
    SwapLink, TimeWindow, WithdrawLink,
};
use crate::events::Event;
use crate::utils::Nano;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    events: Vec<(&'static str, Nano)>,
    swaps: Vec<(SwapLink, Nano)>,
    withdraws: Vec<(WithdrawLink, Nano)>,
    pool_status: Vec<(String, String, Nano)>,
    blocks: BTreeMap<i64, StoredBlock>,
    depths: Vec<DepthChangeRow>,
}

impl Tables {
    fn insert_event(&mut self, event: &Event, ts: Nano) {
        self.events.push((event.kind(), ts));
        match event {
            Event::Swap(swap) => self.swaps.push((
                SwapLink {
                    tx: swap.tx.clone(),
                    pool: swap.pool.clone(),
                    from_asset: swap.from_asset.clone(),
                },
                ts,
            )),
            Event::Withdraw(withdraw) => self.withdraws.push((
                WithdrawLink {
                    tx: withdraw.tx.clone(),
                    pool: withdraw.pool.clone(),
                },
                ts,
            )),
            Event::Pool(pool) => {
                self.pool_status
                    .push((pool.asset.clone(), pool.status.clone(), ts))
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    tables: RwLock<Tables>,
    reject_events: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent event row write fail until switched back off.
    /// Blocks still commit, reporting the rows as lost.
    pub fn reject_event_writes(&self, reject: bool) {
        self.reject_events.store(reject, Ordering::Relaxed);
    }

    /// Number of persisted event rows of the given kind.
    pub async fn event_count(&self, kind: &str) -> usize {
        let tables = self.tables.read().await;
        tables.events.iter().filter(|(k, _)| *k == kind).count()
    }

    /// All depth rows of a pool, oldest first.
    pub async fn depth_rows(&self, pool: &str) -> Vec<DepthChangeRow> {
        let tables = self.tables.read().await;
        tables
            .depths
            .iter()
            .filter(|row| row.pool == pool)
            .cloned()
            .collect()
    }

    pub async fn committed_heights(&self) -> Vec<i64> {
        self.tables.read().await.blocks.keys().copied().collect()
    }

    /// Store a block row as is, bypassing the commit path.
    #[cfg(test)]
    pub(crate) async fn insert_stored_block(&self, block: StoredBlock) {
        self.tables.write().await.blocks.insert(block.height, block);
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn find_swaps(&self, tx_ids: &[String], since: Nano) -> Result<Vec<SwapLink>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .swaps
            .iter()
            .filter(|(link, ts)| *ts >= since && tx_ids.contains(&link.tx))
            .map(|(link, _)| link.clone())
            .collect())
    }

    async fn find_withdraws(
        &self,
        tx_ids: &[String],
        since: Nano,
    ) -> Result<Vec<WithdrawLink>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .withdraws
            .iter()
            .filter(|(link, ts)| *ts >= since && tx_ids.contains(&link.tx))
            .map(|(link, _)| link.clone())
            .collect())
    }

    async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.blocks.get(&commit.meta.height) {
            return Ok(CommitOutcome::AlreadyCommitted {
                hash: existing.hash.clone(),
            });
        }
        tables.blocks.insert(
            commit.meta.height,
            StoredBlock {
                height: commit.meta.height,
                timestamp: commit.meta.timestamp,
                hash: commit.meta.hash.clone(),
                agg_state: Some(commit.agg_state.clone()),
            },
        );
        tables.depths.extend(commit.depth_rows.iter().cloned());

        let reject = self.reject_events.load(Ordering::Relaxed);
        let mut lost_rows = Vec::new();
        for (index, event) in commit.events.iter().enumerate() {
            if reject {
                lost_rows.push(LostRow {
                    index,
                    kind: event.kind(),
                    error: "event row writes rejected".to_owned(),
                });
            } else {
                tables.insert_event(event, commit.meta.timestamp);
            }
        }
        Ok(CommitOutcome::Inserted { lost_rows })
    }

    async fn block_hash(&self, height: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.blocks.get(&height).map(|block| block.hash.clone()))
    }

    async fn last_block(&self) -> Result<Option<StoredBlock>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.blocks.values().next_back().cloned())
    }

    async fn depth_history(
        &self,
        pool: &str,
        window: TimeWindow,
    ) -> Result<Vec<DepthChangeRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .depths
            .iter()
            .filter(|row| row.pool == pool && window.contains(row.block_timestamp))
            .cloned()
            .collect())
    }

    async fn depths_at(&self, moment: Nano) -> Result<Vec<DepthChangeRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut latest: BTreeMap<&str, &DepthChangeRow> = BTreeMap::new();
        // Rows are appended in commit order, so a later row wins.
        for row in tables.depths.iter().filter(|row| row.block_timestamp <= moment) {
            latest.insert(row.pool.as_str(), row);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn pool_status(&self, pool: &str, moment: Nano) -> Result<Option<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pool_status
            .iter()
            .rev()
            .find(|(asset, _, ts)| asset == pool && *ts <= moment)
            .map(|(_, status, _)| status.clone()))
    }
}
