//! Latest committed block state.
//!
//! `LatestState` holds an immutable [`BlockState`] behind an atomic pointer.
//! The block writer replaces it wholesale once per commit; readers take a
//! reference-counted snapshot and never block the writer.

use crate::aggregate::{PoolDepth, TotalsSnapshot};
use crate::events::BlockMeta;
use crate::utils::Nano;
use arc_swap::ArcSwap;
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Pool depths as of one committed block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockState {
    pub height: i64,
    pub timestamp: Nano,
    pub hash: Vec<u8>,
    pub pools: BTreeMap<CompactString, PoolDepth>,
}

impl BlockState {
    pub fn new(meta: &BlockMeta, totals: &TotalsSnapshot) -> Self {
        Self {
            height: meta.height,
            timestamp: meta.timestamp,
            hash: meta.hash.clone(),
            pools: totals.pool_depths(),
        }
    }

    pub fn meta(&self) -> BlockMeta {
        BlockMeta {
            height: self.height,
            timestamp: self.timestamp,
            hash: self.hash.clone(),
        }
    }

    /// Whether any block has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn pool(&self, pool: &str) -> Option<&PoolDepth> {
        self.pools.get(pool)
    }

    pub fn pool_exists(&self, pool: &str) -> bool {
        self.pools.contains_key(pool)
    }
}

/// Shared handle to the latest published [`BlockState`].
pub struct LatestState {
    inner: Arc<LatestInner>,
}

struct LatestInner {
    state: ArcSwap<BlockState>,
    height_tx: watch::Sender<i64>,
}

/// Receives the height of every newly published block.
pub struct BlockWatcher {
    height_rx: watch::Receiver<i64>,
}

// -- LatestState ----------------------------------------------------------

impl LatestState {
    /// An empty state at height 0.
    pub fn new() -> Self {
        let (height_tx, _) = watch::channel(0i64);
        Self {
            inner: Arc::new(LatestInner {
                state: ArcSwap::from_pointee(BlockState::default()),
                height_tx,
            }),
        }
    }

    /// Replace the published state and notify watchers.
    pub fn publish(&self, state: BlockState) {
        let height = state.height;
        self.inner.state.store(Arc::new(state));
        self.inner.height_tx.send_replace(height);
    }

    /// The current state. Later publishes do not affect the returned value.
    pub fn load(&self) -> Arc<BlockState> {
        self.inner.state.load_full()
    }

    pub fn subscribe(&self) -> BlockWatcher {
        BlockWatcher {
            height_rx: self.inner.height_tx.subscribe(),
        }
    }
}

impl Default for LatestState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LatestState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// -- BlockWatcher ---------------------------------------------------------

impl BlockWatcher {
    /// Wait for the next publish and return its height.
    ///
    /// Returns `Err` once every [`LatestState`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<i64, watch::error::RecvError> {
        self.height_rx.changed().await?;
        Ok(*self.height_rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RunningTotals;

    fn state_at(height: i64, depth: i64) -> BlockState {
        let mut totals = RunningTotals::new();
        totals.add_asset_depth("BTC.BTC", depth);
        totals.add_rune_depth("BTC.BTC", depth);
        let meta = BlockMeta {
            height,
            timestamp: Nano(height * 1_000),
            hash: height.to_be_bytes().to_vec(),
        };
        BlockState::new(&meta, &totals.snapshot())
    }

    #[test]
    fn test_held_snapshot_survives_publish() {
        let latest = LatestState::new();
        assert!(latest.load().is_empty());

        latest.publish(state_at(1, 10));
        let held = latest.load();
        latest.publish(state_at(2, 20));

        assert_eq!(held.height, 1);
        assert_eq!(held.pool("BTC.BTC").map(|p| p.asset_depth), Some(10));
        assert_eq!(latest.load().height, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_torn_state() {
        let latest = LatestState::new();
        latest.publish(state_at(1, 1));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let latest = latest.clone();
            readers.push(tokio::spawn(async move {
                let mut last_height = 0;
                for _ in 0..2_000 {
                    let state = latest.load();
                    let pool = state.pool("BTC.BTC").copied().unwrap_or_default();
                    assert_eq!(pool.asset_depth, pool.rune_depth);
                    assert_eq!(pool.asset_depth, state.height);
                    assert!(state.height >= last_height);
                    last_height = state.height;
                    tokio::task::yield_now().await;
                }
            }));
        }

        for height in 2..=500 {
            latest.publish(state_at(height, height));
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_watcher_receives_height() {
        let latest = LatestState::new();
        let mut watcher = latest.subscribe();
        latest.publish(state_at(7, 1));
        assert_eq!(watcher.changed().await.unwrap(), 7);
    }
}
