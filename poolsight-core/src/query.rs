//! Read side of the indexer.
//!
//! Snapshot reads come from the published [`BlockState`] and never touch
//! storage. Historical reads go to storage and are bounded by the last
//! committed block: asking about a later moment is an error rather than an
//! empty answer.

use crate::aggregate::PoolDepth;
use crate::events::BlockMeta;
use crate::latest::{BlockState, LatestState};
use crate::store::{DepthChangeRow, EventStore, StoreError, TimeWindow};
use crate::utils::Nano;
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("cannot resolve beyond the last block (timestamp {last})")]
    BeyondLastBlock { requested: Nano, last: Nano },

    #[error("pool {0} not found")]
    PoolNotFound(String),

    #[error("invalid time window: from {from} is after to {to}")]
    InvalidWindow { from: Nano, to: Nano },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Query operations over the latest state and durable storage.
#[derive(Clone)]
pub struct QueryService {
    latest: LatestState,
    store: Arc<dyn EventStore>,
}

impl QueryService {
    pub fn new(latest: LatestState, store: Arc<dyn EventStore>) -> Self {
        Self { latest, store }
    }

    /// The whole latest state. Use this when several reads must agree.
    pub fn snapshot(&self) -> Arc<BlockState> {
        self.latest.load()
    }

    pub fn latest_block(&self) -> BlockMeta {
        self.latest.load().meta()
    }

    pub fn pool_exists(&self, pool: &str) -> bool {
        self.latest.load().pool_exists(pool)
    }

    pub fn pool_depth(&self, pool: &str) -> Result<PoolDepth, QueryError> {
        self.latest
            .load()
            .pool(pool)
            .copied()
            .ok_or_else(|| QueryError::PoolNotFound(pool.to_owned()))
    }

    /// Every pool with its depths, and the height they belong to.
    pub fn pools(&self) -> (i64, Vec<(CompactString, PoolDepth)>) {
        let state = self.latest.load();
        let pools = state
            .pools
            .iter()
            .map(|(pool, depth)| (pool.clone(), *depth))
            .collect();
        (state.height, pools)
    }

    pub fn asset_price(&self, pool: &str) -> Result<f64, QueryError> {
        Ok(self.pool_depth(pool)?.asset_price())
    }

    /// Depth changes of a pool within an inclusive window.
    pub async fn depth_history(
        &self,
        pool: &str,
        window: TimeWindow,
    ) -> Result<Vec<DepthChangeRow>, QueryError> {
        if window.from > window.to {
            return Err(QueryError::InvalidWindow {
                from: window.from,
                to: window.to,
            });
        }
        self.check_not_beyond_last(window.to)?;
        Ok(self.store.depth_history(pool, window).await?)
    }

    /// Depths of every pool at a moment. Zero means the latest block.
    pub async fn depths_at(
        &self,
        moment: Nano,
    ) -> Result<BTreeMap<CompactString, PoolDepth>, QueryError> {
        let moment = self.resolve_moment(moment)?;
        let rows = self.store.depths_at(moment).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.pool,
                    PoolDepth {
                        asset_depth: row.asset_e8,
                        rune_depth: row.rune_e8,
                        synth_depth: row.synth_e8,
                        units: row.units,
                    },
                )
            })
            .collect())
    }

    /// Status of a pool at a moment. Zero means the latest block.
    pub async fn pool_status(&self, pool: &str, moment: Nano) -> Result<String, QueryError> {
        let moment = self.resolve_moment(moment)?;
        self.store
            .pool_status(pool, moment)
            .await?
            .ok_or_else(|| QueryError::PoolNotFound(pool.to_owned()))
    }

    fn resolve_moment(&self, moment: Nano) -> Result<Nano, QueryError> {
        if moment.is_zero() {
            return Ok(self.latest.load().timestamp);
        }
        self.check_not_beyond_last(moment)?;
        Ok(moment)
    }

    fn check_not_beyond_last(&self, moment: Nano) -> Result<(), QueryError> {
        let last = self.latest.load().timestamp;
        if moment > last {
            return Err(QueryError::BeyondLastBlock {
                requested: moment,
                last,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::events::{Block, Event, Pool, Stake};
    use crate::metrics::IndexerMetrics;
    use crate::processors::BlockWriter;
    use crate::store::MemoryEventStore;

    fn stake(pool: &str, asset_e8: i64, rune_e8: i64) -> Event {
        Event::Stake(Stake {
            pool: pool.to_owned(),
            asset_tx: Some("IN".to_owned()),
            asset_chain: Some("BTC".to_owned()),
            asset_addr: Some("bc1q".to_owned()),
            asset_e8,
            rune_tx: None,
            rune_addr: None,
            rune_e8,
            stake_units: asset_e8,
        })
    }

    fn block(height: i64, events: Vec<Event>) -> Block {
        Block {
            meta: BlockMeta {
                height,
                timestamp: Nano(height * 100),
                hash: vec![height as u8],
            },
            events,
        }
    }

    async fn indexed() -> QueryService {
        let store = Arc::new(MemoryEventStore::new());
        let latest = LatestState::new();
        let mut writer = BlockWriter::new(
            store.clone(),
            latest.clone(),
            &IndexerConfig::default(),
            IndexerMetrics::new_for_testing(),
        );
        let available = Event::Pool(Pool {
            asset: "BTC.BTC".to_owned(),
            status: "available".to_owned(),
        });
        writer
            .process_block(block(1, vec![available, stake("BTC.BTC", 10, 500)]))
            .await
            .unwrap();
        writer.process_block(block(2, vec![stake("ETH.ETH", 0, 5)])).await.unwrap();
        writer.process_block(block(3, vec![stake("BTC.BTC", 10, 500)])).await.unwrap();
        QueryService::new(latest, store)
    }

    #[tokio::test]
    async fn test_snapshot_reads() {
        let query = indexed().await;
        assert_eq!(query.latest_block().height, 3);
        assert!(query.pool_exists("BTC.BTC"));
        assert!(!query.pool_exists("DOGE.DOGE"));
        assert_eq!(query.pool_depth("BTC.BTC").unwrap().rune_depth, 1_000);
        assert_eq!(query.asset_price("BTC.BTC").unwrap(), 50.0);
        assert_eq!(query.asset_price("ETH.ETH").unwrap(), 0.0);
        assert!(matches!(
            query.pool_depth("DOGE.DOGE"),
            Err(QueryError::PoolNotFound(_))
        ));
        let (height, pools) = query.pools();
        assert_eq!(height, 3);
        assert_eq!(pools.len(), 2);
    }

    #[tokio::test]
    async fn test_historical_reads() {
        let query = indexed().await;

        let history = query
            .depth_history("BTC.BTC", TimeWindow::new(Nano(0), Nano(300)))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].asset_e8, 10);
        assert_eq!(history[1].asset_e8, 20);

        let at_two = query.depths_at(Nano(200)).await.unwrap();
        assert_eq!(at_two.get("BTC.BTC").map(|d| d.asset_depth), Some(10));
        assert_eq!(at_two.get("ETH.ETH").map(|d| d.rune_depth), Some(5));

        let latest = query.depths_at(Nano::ZERO).await.unwrap();
        assert_eq!(latest.get("BTC.BTC").map(|d| d.asset_depth), Some(20));

        assert_eq!(query.pool_status("BTC.BTC", Nano::ZERO).await.unwrap(), "available");
    }

    #[tokio::test]
    async fn test_beyond_last_block_is_distinct_from_not_found() {
        let query = indexed().await;

        assert!(matches!(
            query.depths_at(Nano(301)).await,
            Err(QueryError::BeyondLastBlock { last: Nano(300), .. })
        ));
        assert!(matches!(
            query
                .depth_history("BTC.BTC", TimeWindow::new(Nano(0), Nano(301)))
                .await,
            Err(QueryError::BeyondLastBlock { .. })
        ));
        assert!(matches!(
            query
                .depth_history("BTC.BTC", TimeWindow::new(Nano(200), Nano(100)))
                .await,
            Err(QueryError::InvalidWindow { .. })
        ));
        assert!(matches!(
            query.pool_status("ETH.ETH", Nano(300)).await,
            Err(QueryError::PoolNotFound(_))
        ));
    }
}
