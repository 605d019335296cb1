use crate::framework::DatabaseProcessor;
use crate::store::{SwapLink, WithdrawLink};
use crate::utils::Nano;
use kanau::processor::Processor;

#[derive(Debug, Clone)]
/// Swaps whose tx is one of `tx_ids`, recorded at or after `since`.
pub struct FindSwapsByTx {
    pub tx_ids: Vec<String>,
    pub since: Nano,
}

impl Processor<FindSwapsByTx> for DatabaseProcessor {
    type Output = Vec<SwapLink>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindSwapsByTx")]
    async fn process(&self, query: FindSwapsByTx) -> Result<Vec<SwapLink>, sqlx::Error> {
        if query.tx_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as(
            r#"
            SELECT tx, pool, from_asset
            FROM swap_events
            WHERE tx = ANY($1) AND block_timestamp >= $2
            "#,
        )
        .bind(query.tx_ids)
        .bind(query.since)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Withdraws whose tx is one of `tx_ids`, recorded at or after `since`.
pub struct FindWithdrawsByTx {
    pub tx_ids: Vec<String>,
    pub since: Nano,
}

impl Processor<FindWithdrawsByTx> for DatabaseProcessor {
    type Output = Vec<WithdrawLink>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindWithdrawsByTx")]
    async fn process(&self, query: FindWithdrawsByTx) -> Result<Vec<WithdrawLink>, sqlx::Error> {
        if query.tx_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as(
            r#"
            SELECT tx, pool
            FROM withdraw_events
            WHERE tx = ANY($1) AND block_timestamp >= $2
            "#,
        )
        .bind(query.tx_ids)
        .bind(query.since)
        .fetch_all(&self.pool)
        .await
    }
}
