use crate::framework::DatabaseProcessor;
use crate::store::{DepthChangeRow, TimeWindow};
use crate::utils::Nano;
use kanau::processor::Processor;

/// Append-only time series of pool depth changes.
pub struct PoolDepths;

impl PoolDepths {
    /// Insert depth rows in a single statement.
    pub async fn insert_many_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        rows: &[DepthChangeRow],
    ) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO block_pool_depths \
            (pool, asset_e8, rune_e8, synth_e8, units, block_timestamp) ",
        );

        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(row.pool.clone())
                .push_bind(row.asset_e8)
                .push_bind(row.rune_e8)
                .push_bind(row.synth_e8)
                .push_bind(row.units)
                .push_bind(row.block_timestamp);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Depth changes of one pool inside an inclusive time window, oldest first.
pub struct GetPoolDepthHistory {
    pub pool: String,
    pub window: TimeWindow,
}

impl Processor<GetPoolDepthHistory> for DatabaseProcessor {
    type Output = Vec<DepthChangeRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPoolDepthHistory")]
    async fn process(&self, query: GetPoolDepthHistory) -> Result<Vec<DepthChangeRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT pool, asset_e8, rune_e8, synth_e8, units, block_timestamp
            FROM block_pool_depths
            WHERE pool = $1 AND block_timestamp >= $2 AND block_timestamp <= $3
            ORDER BY block_timestamp, id
            "#,
        )
        .bind(query.pool)
        .bind(query.window.from)
        .bind(query.window.to)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// The most recent depth row of every pool at or before a moment.
pub struct GetPoolDepthsAt {
    pub moment: Nano,
}

impl Processor<GetPoolDepthsAt> for DatabaseProcessor {
    type Output = Vec<DepthChangeRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPoolDepthsAt")]
    async fn process(&self, query: GetPoolDepthsAt) -> Result<Vec<DepthChangeRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT DISTINCT ON (pool)
                pool, asset_e8, rune_e8, synth_e8, units, block_timestamp
            FROM block_pool_depths
            WHERE block_timestamp <= $1
            ORDER BY pool, block_timestamp DESC, id DESC
            "#,
        )
        .bind(query.moment)
        .fetch_all(&self.pool)
        .await
    }
}
