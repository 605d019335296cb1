//! One table per event kind. Every row carries the block timestamp in
//! nanoseconds.

use crate::events::Event;
use crate::framework::DatabaseProcessor;
use crate::utils::Nano;
use kanau::processor::Processor;

/// Event rows, written only as part of a block commit.
pub struct EventRows;

impl EventRows {
    /// Insert the row of a single event into its kind's table.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: Event,
        block_timestamp: Nano,
    ) -> Result<(), sqlx::Error> {
        let ts = block_timestamp;
        match event {
            Event::Add(e) => {
                sqlx::query(
                    "INSERT INTO add_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, rune_e8, memo, pool, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.rune_e8)
                .bind(e.memo)
                .bind(e.pool)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Stake(e) => {
                sqlx::query(
                    "INSERT INTO stake_events \
                    (pool, asset_tx, asset_chain, asset_addr, asset_e8, rune_tx, rune_addr, rune_e8, \
                    stake_units, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(e.pool)
                .bind(e.asset_tx)
                .bind(e.asset_chain)
                .bind(e.asset_addr)
                .bind(e.asset_e8)
                .bind(e.rune_tx)
                .bind(e.rune_addr)
                .bind(e.rune_e8)
                .bind(e.stake_units)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Withdraw(e) => {
                sqlx::query(
                    "INSERT INTO withdraw_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, emit_asset_e8, emit_rune_e8, memo, \
                    pool, stake_units, basis_points, asymmetry, imp_loss_protection_e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.emit_asset_e8)
                .bind(e.emit_rune_e8)
                .bind(e.memo)
                .bind(e.pool)
                .bind(e.stake_units)
                .bind(e.basis_points)
                .bind(e.asymmetry)
                .bind(e.imp_loss_protection_e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Swap(e) => {
                sqlx::query(
                    "INSERT INTO swap_events \
                    (tx, chain, from_addr, to_addr, from_asset, from_e8, to_asset, to_e8, memo, pool, \
                    to_e8_min, swap_slip_bp, liq_fee_e8, liq_fee_in_rune_e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.from_asset)
                .bind(e.from_e8)
                .bind(e.to_asset)
                .bind(e.to_e8)
                .bind(e.memo)
                .bind(e.pool)
                .bind(e.to_e8_min)
                .bind(e.swap_slip_bp)
                .bind(e.liq_fee_e8)
                .bind(e.liq_fee_in_rune_e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Outbound(e) => {
                sqlx::query(
                    "INSERT INTO outbound_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, memo, in_tx, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.memo)
                .bind(e.in_tx)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Fee(e) => {
                sqlx::query(
                    "INSERT INTO fee_events (tx, asset, asset_e8, pool_deduct, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(e.tx)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.pool_deduct)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Pool(e) => {
                sqlx::query(
                    "INSERT INTO pool_events (asset, status, block_timestamp) VALUES ($1, $2, $3)",
                )
                .bind(e.asset)
                .bind(e.status)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Rewards(e) => {
                sqlx::query("INSERT INTO rewards_events (bond_e8, block_timestamp) VALUES ($1, $2)")
                    .bind(e.bond_e8)
                    .bind(ts)
                    .execute(&mut **tx)
                    .await?;
                if !e.per_pool.is_empty() {
                    let mut query_builder = sqlx::QueryBuilder::new(
                        "INSERT INTO rewards_event_entries (pool, rune_e8, block_timestamp) ",
                    );
                    query_builder.push_values(e.per_pool, |mut b, coin| {
                        b.push_bind(coin.asset).push_bind(coin.e8).push_bind(ts);
                    });
                    query_builder.build().execute(&mut **tx).await?;
                }
            }
            Event::Bond(e) => {
                sqlx::query(
                    "INSERT INTO bond_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, memo, bond_type, e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.memo)
                .bind(e.bond_type)
                .bind(e.e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Gas(e) => {
                sqlx::query(
                    "INSERT INTO gas_events (asset, asset_e8, rune_e8, tx_count, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.rune_e8)
                .bind(e.tx_count)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Errata(e) => {
                sqlx::query(
                    "INSERT INTO errata_events (in_tx, asset, asset_e8, rune_e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(e.in_tx)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.rune_e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Slash(e) => {
                if e.amounts.is_empty() {
                    return Ok(());
                }
                let pool = e.pool;
                let mut query_builder = sqlx::QueryBuilder::new(
                    "INSERT INTO slash_amounts (pool, asset, asset_e8, block_timestamp) ",
                );
                query_builder.push_values(e.amounts, |mut b, coin| {
                    b.push_bind(pool.clone())
                        .push_bind(coin.asset)
                        .push_bind(coin.e8)
                        .push_bind(ts);
                });
                query_builder.build().execute(&mut **tx).await?;
            }
            Event::PoolBalanceChange(e) => {
                sqlx::query(
                    "INSERT INTO pool_balance_change_events \
                    (asset, rune_amt, rune_add, asset_amt, asset_add, reason, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(e.asset)
                .bind(e.rune_amt)
                .bind(e.rune_add)
                .bind(e.asset_amt)
                .bind(e.asset_add)
                .bind(e.reason)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Refund(e) => {
                sqlx::query(
                    "INSERT INTO refund_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, asset_2nd, asset_2nd_e8, memo, \
                    code, reason, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.asset_2nd)
                .bind(e.asset_2nd_e8)
                .bind(e.memo)
                .bind(e.code)
                .bind(e.reason)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Reserve(e) => {
                sqlx::query(
                    "INSERT INTO reserve_events \
                    (tx, chain, from_addr, to_addr, asset, asset_e8, memo, addr, e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(e.tx)
                .bind(e.chain)
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.asset_e8)
                .bind(e.memo)
                .bind(e.addr)
                .bind(e.e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::NewNode(e) => {
                sqlx::query("INSERT INTO new_node_events (node_addr, block_timestamp) VALUES ($1, $2)")
                    .bind(e.node_addr)
                    .bind(ts)
                    .execute(&mut **tx)
                    .await?;
            }
            Event::UpdateNodeAccountStatus(e) => {
                sqlx::query(
                    "INSERT INTO update_node_account_status_events \
                    (node_addr, former, current, block_timestamp) VALUES ($1, $2, $3, $4)",
                )
                .bind(e.node_addr)
                .bind(e.former)
                .bind(e.current)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::SetMimir(e) => {
                sqlx::query(
                    "INSERT INTO set_mimir_events (key, value, block_timestamp) VALUES ($1, $2, $3)",
                )
                .bind(e.key)
                .bind(e.value)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::SetVersion(e) => {
                sqlx::query(
                    "INSERT INTO set_version_events (node_addr, version, block_timestamp) \
                    VALUES ($1, $2, $3)",
                )
                .bind(e.node_addr)
                .bind(e.version)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
            Event::Transfer(e) => {
                sqlx::query(
                    "INSERT INTO transfer_events (from_addr, to_addr, asset, amount_e8, block_timestamp) \
                    VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(e.from_addr)
                .bind(e.to_addr)
                .bind(e.asset)
                .bind(e.amount_e8)
                .bind(ts)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// The most recent status of a pool at or before a moment.
pub struct GetPoolStatus {
    pub pool: String,
    pub moment: Nano,
}

impl Processor<GetPoolStatus> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPoolStatus")]
    async fn process(&self, query: GetPoolStatus) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT status
            FROM pool_events
            WHERE asset = $1 AND block_timestamp <= $2
            ORDER BY block_timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(query.pool)
        .bind(query.moment)
        .fetch_optional(&self.pool)
        .await
    }
}
