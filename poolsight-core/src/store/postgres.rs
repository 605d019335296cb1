use super::{
    BlockCommit, CommitOutcome, DepthChangeRow, EventStore, LostRow, StoreError, StoredBlock,
    SwapLink, TimeWindow, WithdrawLink,
};
use crate::entities::block_log::{BlockLog, GetBlockHash, GetLastBlock};
use crate::entities::event_rows::{EventRows, GetPoolStatus};
use crate::entities::linked::{FindSwapsByTx, FindWithdrawsByTx};
use crate::entities::pool_depths::{GetPoolDepthHistory, GetPoolDepthsAt, PoolDepths};
use crate::framework::DatabaseProcessor;
use crate::utils::Nano;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::{Acquire, PgPool};

/// [`EventStore`] on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    db: DatabaseProcessor,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find_swaps(&self, tx_ids: &[String], since: Nano) -> Result<Vec<SwapLink>, StoreError> {
        Ok(self
            .db
            .process(FindSwapsByTx {
                tx_ids: tx_ids.to_vec(),
                since,
            })
            .await?)
    }

    async fn find_withdraws(
        &self,
        tx_ids: &[String],
        since: Nano,
    ) -> Result<Vec<WithdrawLink>, StoreError> {
        Ok(self
            .db
            .process(FindWithdrawsByTx {
                tx_ids: tx_ids.to_vec(),
                since,
            })
            .await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CommitBlock", fields(height = commit.meta.height))]
    async fn commit_block(&self, commit: &BlockCommit) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.db.begin().await?;
        let inserted = BlockLog::insert_if_absent_tx(&mut tx, &commit.meta, &commit.agg_state).await?;
        if inserted == 0 {
            let hash = BlockLog::hash_at_tx(&mut tx, commit.meta.height)
                .await?
                .unwrap_or_default();
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyCommitted { hash });
        }
        PoolDepths::insert_many_tx(&mut tx, &commit.depth_rows).await?;

        // One savepoint per row: a bad row is dropped, the block still commits.
        let mut lost_rows = Vec::new();
        for (index, event) in commit.events.iter().enumerate() {
            let mut savepoint = tx.begin().await?;
            match EventRows::insert_tx(&mut savepoint, event.clone(), commit.meta.timestamp).await {
                Ok(()) => savepoint.commit().await?,
                Err(err) => {
                    savepoint.rollback().await?;
                    lost_rows.push(LostRow {
                        index,
                        kind: event.kind(),
                        error: err.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(CommitOutcome::Inserted { lost_rows })
    }

    async fn block_hash(&self, height: i64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.process(GetBlockHash { height }).await?)
    }

    async fn last_block(&self) -> Result<Option<StoredBlock>, StoreError> {
        Ok(self.db.process(GetLastBlock).await?)
    }

    async fn depth_history(
        &self,
        pool: &str,
        window: TimeWindow,
    ) -> Result<Vec<DepthChangeRow>, StoreError> {
        Ok(self
            .db
            .process(GetPoolDepthHistory {
                pool: pool.to_owned(),
                window,
            })
            .await?)
    }

    async fn depths_at(&self, moment: Nano) -> Result<Vec<DepthChangeRow>, StoreError> {
        Ok(self.db.process(GetPoolDepthsAt { moment }).await?)
    }

    async fn pool_status(&self, pool: &str, moment: Nano) -> Result<Option<String>, StoreError> {
        Ok(self
            .db
            .process(GetPoolStatus {
                pool: pool.to_owned(),
                moment,
            })
            .await?)
    }
}
