use crate::aggregate::TotalsSnapshot;
use crate::events::BlockMeta;
use crate::framework::DatabaseProcessor;
use crate::store::StoredBlock;
use crate::utils::Nano;
use kanau::processor::Processor;
use sqlx::types::Json;

#[derive(Debug, Clone, sqlx::FromRow)]
struct BlockLogRow {
    height: i64,
    timestamp: Nano,
    hash: Vec<u8>,
    agg_state: Option<Json<TotalsSnapshot>>,
}

impl From<BlockLogRow> for StoredBlock {
    fn from(row: BlockLogRow) -> Self {
        StoredBlock {
            height: row.height,
            timestamp: row.timestamp,
            hash: row.hash,
            agg_state: row.agg_state.map(|Json(state)| state),
        }
    }
}

/// Marks block heights as committed.
pub struct BlockLog;

impl BlockLog {
    /// Insert the block unless its height is already present.
    ///
    /// Returns the number of rows inserted, 0 when the height already exists.
    pub async fn insert_if_absent_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        meta: &BlockMeta,
        agg_state: &TotalsSnapshot,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO block_log (height, timestamp, hash, agg_state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (height) DO NOTHING
            "#,
        )
        .bind(meta.height)
        .bind(meta.timestamp)
        .bind(meta.hash.as_slice())
        .bind(Json(agg_state))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn hash_at_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        height: i64,
    ) -> Result<Option<Vec<u8>>, sqlx::Error> {
        sqlx::query_scalar("SELECT hash FROM block_log WHERE height = $1")
            .bind(height)
            .fetch_optional(&mut **tx)
            .await
    }
}

#[derive(Debug, Clone)]
/// Get the highest committed block with its aggregate state.
pub struct GetLastBlock;

impl Processor<GetLastBlock> for DatabaseProcessor {
    type Output = Option<StoredBlock>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLastBlock")]
    async fn process(&self, _query: GetLastBlock) -> Result<Option<StoredBlock>, sqlx::Error> {
        let row: Option<BlockLogRow> = sqlx::query_as(
            r#"
            SELECT height, timestamp, hash, agg_state
            FROM block_log
            ORDER BY height DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StoredBlock::from))
    }
}

#[derive(Debug, Clone)]
/// Get the hash committed at a height.
pub struct GetBlockHash {
    pub height: i64,
}

impl Processor<GetBlockHash> for DatabaseProcessor {
    type Output = Option<Vec<u8>>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBlockHash")]
    async fn process(&self, query: GetBlockHash) -> Result<Option<Vec<u8>>, sqlx::Error> {
        sqlx::query_scalar("SELECT hash FROM block_log WHERE height = $1")
            .bind(query.height)
            .fetch_optional(&self.pool)
            .await
    }
}
