//! Resolution of outbound and fee events.
//!
//! Outbounds and fees only carry the id of the transaction that caused them.
//! They are queued while a block is recorded and resolved at the end of the
//! block by looking the id up among recent swaps and withdraws. Whatever is
//! still unmatched after a flush is dropped and counted as dead.
//!
//! Rows of the block being recorded are not in storage until the block
//! commits, so its swaps and withdraws are tracked here and consulted along
//! with the committed ones.

use crate::aggregate::RunningTotals;
use crate::metrics::IndexerMetrics;
use crate::store::{EventStore, StoreError, SwapLink, WithdrawLink};
use crate::utils::Nano;
use itertools::Itertools;
use poolsight_sdk::objects::asset::{Coin, CoinType, is_rune};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// How far back a linked event may look for its originating transaction.
pub const DEFAULT_OUTBOUND_TIMEOUT: time::Duration = time::Duration::hours(48);

type Amounts = SmallVec<[Coin; 1]>;

/// Which queue a linked event goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedKind {
    Outbound,
    Fee,
}

impl LinkedKind {
    fn label(self) -> &'static str {
        match self {
            LinkedKind::Outbound => "outbound",
            LinkedKind::Fee => "fee",
        }
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Transaction ids resolved.
    pub matched: usize,
    /// Transaction ids dropped unresolved.
    pub dead: usize,
}

/// Queues of outbound and fee amounts keyed by originating tx id.
///
/// Owned by the block writer. Both queues are empty between blocks.
#[derive(Debug)]
pub struct LinkedEvents {
    outbound_q: HashMap<String, Amounts>,
    fee_q: HashMap<String, Amounts>,
    block_swaps: Vec<SwapLink>,
    block_withdraws: Vec<WithdrawLink>,
    outbound_timeout: time::Duration,
    metrics: IndexerMetrics,
}

impl LinkedEvents {
    pub fn new(outbound_timeout: time::Duration, metrics: IndexerMetrics) -> Self {
        Self {
            outbound_q: HashMap::new(),
            fee_q: HashMap::new(),
            block_swaps: Vec::new(),
            block_withdraws: Vec::new(),
            outbound_timeout,
            metrics,
        }
    }

    pub fn enqueue(&mut self, kind: LinkedKind, tx_id: &str, amount: Coin) {
        let queue = match kind {
            LinkedKind::Outbound => &mut self.outbound_q,
            LinkedKind::Fee => &mut self.fee_q,
        };
        queue.entry(tx_id.to_owned()).or_default().push(amount);
    }

    /// Number of tx ids waiting in a queue.
    pub fn pending(&self, kind: LinkedKind) -> usize {
        match kind {
            LinkedKind::Outbound => self.outbound_q.len(),
            LinkedKind::Fee => self.fee_q.len(),
        }
    }

    /// Remember a swap of the block being recorded.
    pub fn track_swap(&mut self, link: SwapLink) {
        self.block_swaps.push(link);
    }

    /// Remember a withdraw of the block being recorded.
    pub fn track_withdraw(&mut self, link: WithdrawLink) {
        self.block_withdraws.push(link);
    }

    /// Forget the tracked swaps and withdraws once their block is done.
    pub fn end_block(&mut self) {
        self.block_swaps.clear();
        self.block_withdraws.clear();
    }

    /// Clear both queues and the tracked rows.
    pub fn reset(&mut self) {
        self.outbound_q.clear();
        self.fee_q.clear();
        self.end_block();
    }

    async fn swaps_for(
        &self,
        store: &dyn EventStore,
        tx_ids: &[String],
        since: Nano,
    ) -> Result<Vec<SwapLink>, StoreError> {
        let mut swaps = store.find_swaps(tx_ids, since).await?;
        swaps.extend(
            self.block_swaps
                .iter()
                .filter(|s| tx_ids.contains(&s.tx))
                .cloned(),
        );
        Ok(swaps)
    }

    async fn withdraws_for(
        &self,
        store: &dyn EventStore,
        tx_ids: &[String],
        since: Nano,
    ) -> Result<Vec<WithdrawLink>, StoreError> {
        let mut withdraws = store.find_withdraws(tx_ids, since).await?;
        withdraws.extend(
            self.block_withdraws
                .iter()
                .filter(|w| tx_ids.contains(&w.tx))
                .cloned(),
        );
        Ok(withdraws)
    }

    /// Resolve queued outbounds against swaps, then withdraws, and deduct
    /// them from the matched pools. Drains the queue.
    pub async fn flush_outbound(
        &mut self,
        totals: &mut RunningTotals,
        store: &dyn EventStore,
        height: i64,
        timestamp: Nano,
    ) -> FlushReport {
        if self.outbound_q.is_empty() {
            return FlushReport::default();
        }
        let mut queue = std::mem::take(&mut self.outbound_q);
        let since = timestamp.saturating_sub(self.outbound_timeout);
        let mut matched = 0;

        let tx_ids: Vec<String> = queue.keys().cloned().collect();
        match self.swaps_for(store, &tx_ids, since).await {
            Ok(swaps) => {
                for (tx, swaps) in swaps.into_iter().into_group_map_by(|s| s.tx.clone()) {
                    let Some(amounts) = queue.get(&tx) else {
                        continue;
                    };
                    if self.apply_swap_outbounds(totals, &tx, &swaps, amounts) {
                        queue.remove(&tx);
                        matched += 1;
                    }
                }
            }
            Err(err) => error!(height, error = %err, "swap lookup for outbound events failed"),
        }

        if !queue.is_empty() {
            let tx_ids: Vec<String> = queue.keys().cloned().collect();
            match self.withdraws_for(store, &tx_ids, since).await {
                Ok(withdraws) => {
                    for withdraw in withdraws {
                        let Some(amounts) = queue.remove(&withdraw.tx) else {
                            continue;
                        };
                        self.apply_withdraw_outbounds(totals, &withdraw, &amounts);
                        matched += 1;
                    }
                }
                Err(err) => {
                    error!(height, error = %err, "withdraw lookup for outbound events failed")
                }
            }
        }

        let dead = self.count_dead(LinkedKind::Outbound, height, queue);
        FlushReport { matched, dead }
    }

    /// Resolve queued fees against swaps and credit them to the matched
    /// pools. Drains the queue.
    pub async fn flush_fee(
        &mut self,
        totals: &mut RunningTotals,
        store: &dyn EventStore,
        height: i64,
        timestamp: Nano,
    ) -> FlushReport {
        if self.fee_q.is_empty() {
            return FlushReport::default();
        }
        let mut queue = std::mem::take(&mut self.fee_q);
        let since = timestamp.saturating_sub(self.outbound_timeout);
        let mut matched = 0;

        let tx_ids: Vec<String> = queue.keys().cloned().collect();
        match self.swaps_for(store, &tx_ids, since).await {
            Ok(swaps) => {
                for (tx, swaps) in swaps.into_iter().into_group_map_by(|s| s.tx.clone()) {
                    let Some(amounts) = queue.remove(&tx) else {
                        continue;
                    };
                    for amount in &amounts {
                        let pool = fee_pool(&swaps, amount);
                        if amount.is_rune() {
                            totals.add_rune_depth(pool, amount.e8);
                            self.found(LinkedKind::Fee, "swap", "rune");
                        } else {
                            totals.add_asset_depth(pool, amount.e8);
                            self.found(LinkedKind::Fee, "swap", "asset");
                        }
                    }
                    matched += 1;
                }
            }
            Err(err) => error!(height, error = %err, "swap lookup for fee events failed"),
        }

        let dead = self.count_dead(LinkedKind::Fee, height, queue);
        FlushReport { matched, dead }
    }

    /// Returns false when the swaps cannot be interpreted, leaving the
    /// amounts unresolved.
    fn apply_swap_outbounds(
        &self,
        totals: &mut RunningTotals,
        tx: &str,
        swaps: &[SwapLink],
        amounts: &Amounts,
    ) -> bool {
        match swaps {
            [swap] => {
                for amount in amounts {
                    match amount.coin_type() {
                        CoinType::Rune => {
                            totals.add_rune_depth(&swap.pool, -amount.e8);
                            self.found(LinkedKind::Outbound, "swap", "to_rune");
                        }
                        // Synths are minted when the swap is recorded.
                        CoinType::Synth => self.found(LinkedKind::Outbound, "swap", "to_synth"),
                        CoinType::Native | CoinType::Unknown => {
                            totals.add_asset_depth(&swap.pool, -amount.e8);
                            self.found(LinkedKind::Outbound, "swap", "to_asset");
                        }
                    }
                }
                true
            }
            [a, b] => {
                let (pool_in, pool_out) = match (is_rune(&a.from_asset), is_rune(&b.from_asset)) {
                    (false, true) => (a, b),
                    (true, false) => (b, a),
                    _ => {
                        error!(
                            tx,
                            first = %a.from_asset,
                            second = %b.from_asset,
                            "double swap with unexpected from assets"
                        );
                        return false;
                    }
                };
                for amount in amounts {
                    match amount.coin_type() {
                        CoinType::Rune => {
                            totals.add_rune_depth(&pool_in.pool, -amount.e8);
                            self.found(LinkedKind::Outbound, "swap", "double_rune");
                        }
                        CoinType::Synth => self.found(LinkedKind::Outbound, "swap", "to_synth"),
                        CoinType::Native | CoinType::Unknown => {
                            totals.add_asset_depth(&pool_out.pool, -amount.e8);
                            self.found(LinkedKind::Outbound, "swap", "double_asset");
                        }
                    }
                }
                true
            }
            _ => {
                error!(tx, swaps = swaps.len(), "too many swaps for one outbound transaction");
                false
            }
        }
    }

    fn apply_withdraw_outbounds(
        &self,
        totals: &mut RunningTotals,
        withdraw: &WithdrawLink,
        amounts: &Amounts,
    ) {
        for amount in amounts {
            if amount.asset == withdraw.pool {
                totals.add_asset_depth(&withdraw.pool, -amount.e8);
                self.found(LinkedKind::Outbound, "withdraw", "asset");
            } else if is_rune(&amount.asset) {
                totals.add_rune_depth(&withdraw.pool, -amount.e8);
                self.found(LinkedKind::Outbound, "withdraw", "rune");
            } else {
                warn!(
                    tx = %withdraw.tx,
                    pool = %withdraw.pool,
                    asset = %amount.asset,
                    "withdraw outbound asset does not match pool, assumed rune"
                );
                totals.add_rune_depth(&withdraw.pool, -amount.e8);
                self.found(LinkedKind::Outbound, "withdraw", "assumed_rune");
            }
        }
    }

    fn found(&self, kind: LinkedKind, ref_type: &str, class: &str) {
        self.metrics
            .linked_found
            .with_label_values(&[kind.label(), ref_type, class])
            .inc();
    }

    fn count_dead(&self, kind: LinkedKind, height: i64, queue: HashMap<String, Amounts>) -> usize {
        let dead = queue.len();
        if dead == 0 {
            return 0;
        }
        for tx in queue.keys() {
            debug!(height, tx = %tx, kind = kind.label(), "linked event unresolved");
        }
        self.metrics
            .linked_dead
            .with_label_values(&[kind.label()])
            .inc_by(dead as u64);
        info!(height, dead, kind = kind.label(), "dropped unresolved linked events");
        dead
    }
}

/// Pool a fee accrues to.
///
/// A rune fee goes to the pool that paid out rune, an asset fee to the pool
/// of that asset. Single swaps always use their only pool.
fn fee_pool<'a>(swaps: &'a [SwapLink], fee: &Coin) -> &'a str {
    let picked = match swaps {
        [swap] => Some(swap),
        _ if fee.is_rune() => swaps.iter().find(|s| !is_rune(&s.from_asset)),
        _ => swaps
            .iter()
            .find(|s| s.pool == fee.asset)
            .or_else(|| swaps.iter().find(|s| is_rune(&s.from_asset))),
    };
    picked
        .or_else(|| swaps.first())
        .map(|s| s.pool.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PoolDepth;
    use crate::events::{BlockMeta, Event, Swap, Withdraw};
    use crate::aggregate::TotalsSnapshot;
    use crate::store::{BlockCommit, MemoryEventStore};

    const HOUR: i64 = 3_600_000_000_000;

    fn meta_at(height: i64, ts: i64) -> BlockMeta {
        BlockMeta {
            height,
            timestamp: Nano(ts),
            hash: vec![height as u8],
        }
    }

    fn swap(tx: &str, pool: &str, from_asset: &str, from_e8: i64) -> Event {
        Event::Swap(Swap {
            tx: tx.to_owned(),
            chain: "THOR".to_owned(),
            from_addr: "thor1from".to_owned(),
            to_addr: "to".to_owned(),
            from_asset: from_asset.to_owned(),
            from_e8,
            to_asset: pool.to_owned(),
            to_e8: 0,
            memo: String::new(),
            pool: pool.to_owned(),
            to_e8_min: 0,
            swap_slip_bp: 0,
            liq_fee_e8: 0,
            liq_fee_in_rune_e8: 0,
        })
    }

    fn withdraw(tx: &str, pool: &str) -> Event {
        Event::Withdraw(Withdraw {
            tx: tx.to_owned(),
            chain: "THOR".to_owned(),
            from_addr: "thor1lp".to_owned(),
            to_addr: "pool".to_owned(),
            asset: "THOR.RUNE".to_owned(),
            asset_e8: 0,
            emit_asset_e8: 0,
            emit_rune_e8: 0,
            memo: String::new(),
            pool: pool.to_owned(),
            stake_units: 10,
            basis_points: 10_000,
            asymmetry: 0.0,
            imp_loss_protection_e8: 0,
        })
    }

    fn linked() -> LinkedEvents {
        LinkedEvents::new(DEFAULT_OUTBOUND_TIMEOUT, IndexerMetrics::new_for_testing())
    }

    async fn committed(store: &MemoryEventStore, meta: BlockMeta, events: Vec<Event>) {
        let commit = BlockCommit {
            meta,
            agg_state: TotalsSnapshot::default(),
            depth_rows: Vec::new(),
            events,
        };
        store.commit_block(&commit).await.unwrap();
    }

    #[tokio::test]
    async fn test_outbound_timeout_boundary_is_inclusive() {
        let store = MemoryEventStore::new();
        let events = vec![
            swap("EDGE", "BTC.BTC", "THOR.RUNE", 10),
            swap("LATE", "ETH.ETH", "THOR.RUNE", 10),
        ];
        committed(&store, meta_at(1, 0), events).await;

        let mut totals = RunningTotals::new();
        let mut linked = linked();

        linked.enqueue(LinkedKind::Outbound, "EDGE", Coin::new("BTC.BTC", 5));
        let report = linked.flush_outbound(&mut totals, &store, 2, Nano(48 * HOUR)).await;
        assert_eq!(report, FlushReport { matched: 1, dead: 0 });
        assert_eq!(totals.current("BTC.BTC").asset_depth, -5);

        linked.enqueue(LinkedKind::Outbound, "LATE", Coin::new("ETH.ETH", 5));
        let report = linked.flush_outbound(&mut totals, &store, 3, Nano(48 * HOUR + 1)).await;
        assert_eq!(report, FlushReport { matched: 0, dead: 1 });
        assert_eq!(totals.current("ETH.ETH").asset_depth, 0);
        assert_eq!(linked.metrics.dead_count("outbound"), 1);
    }

    #[tokio::test]
    async fn test_unresolved_outbound_is_dead_and_drained() {
        let store = MemoryEventStore::new();
        let mut totals = RunningTotals::new();
        let mut linked = linked();

        linked.enqueue(LinkedKind::Outbound, "X", Coin::new("BTC.BTC", 990));
        assert_eq!(linked.pending(LinkedKind::Outbound), 1);

        let report = linked.flush_outbound(&mut totals, &store, 7, Nano(HOUR)).await;
        assert_eq!(report.dead, 1);
        assert_eq!(linked.metrics.dead_count("outbound"), 1);
        assert_eq!(linked.pending(LinkedKind::Outbound), 0);
        assert_eq!(totals.snapshot(), RunningTotals::new().snapshot());

        // Nothing is retried on the next flush.
        let report = linked.flush_outbound(&mut totals, &store, 8, Nano(2 * HOUR)).await;
        assert_eq!(report, FlushReport::default());
        assert_eq!(linked.metrics.dead_count("outbound"), 1);
    }

    #[tokio::test]
    async fn test_withdraw_outbounds_deduct_by_asset() {
        let store = MemoryEventStore::new();
        let events = vec![withdraw("W1", "BTC.BTC"), withdraw("W2", "ETH.ETH")];
        committed(&store, meta_at(1, HOUR), events).await;

        let mut totals = RunningTotals::new();
        let mut linked = linked();
        linked.enqueue(LinkedKind::Outbound, "W1", Coin::new("BTC.BTC", 100));
        linked.enqueue(LinkedKind::Outbound, "W1", Coin::new("THOR.RUNE", 2_000));
        linked.enqueue(LinkedKind::Outbound, "W2", Coin::new("ETH.USDT-0XDAC", 30));

        let report = linked.flush_outbound(&mut totals, &store, 2, Nano(2 * HOUR)).await;
        assert_eq!(report, FlushReport { matched: 2, dead: 0 });
        assert_eq!(totals.current_depths("BTC.BTC"), (-100, -2_000, 0));
        assert_eq!(totals.current_depths("ETH.ETH"), (0, -30, 0));
        assert_eq!(linked.metrics.found_count("outbound", "withdraw", "assumed_rune"), 1);
        assert_eq!(linked.metrics.found_count("outbound", "withdraw", "rune"), 1);
    }

    #[tokio::test]
    async fn test_double_swap_outbound_uses_out_pool() {
        let store = MemoryEventStore::new();
        // BTC -> rune in BTC.BTC, then rune -> ETH in ETH.ETH.
        let events = vec![
            swap("D", "BTC.BTC", "BTC.BTC", 1_000),
            swap("D", "ETH.ETH", "THOR.RUNE", 50_000),
        ];
        committed(&store, meta_at(1, HOUR), events).await;

        let mut totals = RunningTotals::new();
        let mut linked = linked();
        linked.enqueue(LinkedKind::Outbound, "D", Coin::new("ETH.ETH", 700));

        let report = linked.flush_outbound(&mut totals, &store, 2, Nano(HOUR)).await;
        assert_eq!(report.matched, 1);
        assert_eq!(totals.current("ETH.ETH").asset_depth, -700);
        assert_eq!(totals.current("BTC.BTC"), PoolDepth::default());
        assert_eq!(linked.metrics.found_count("outbound", "swap", "double_asset"), 1);
    }

    #[tokio::test]
    async fn test_fee_adds_to_matched_pool() {
        let store = MemoryEventStore::new();
        let events = vec![
            swap("S1", "BTC.BTC", "BTC.BTC", 10),
            swap("S2", "ETH.ETH", "THOR.RUNE", 10),
        ];
        committed(&store, meta_at(1, HOUR), events).await;

        let mut totals = RunningTotals::new();
        let mut linked = linked();
        linked.enqueue(LinkedKind::Fee, "S1", Coin::new("THOR.RUNE", 2_000_000));
        linked.enqueue(LinkedKind::Fee, "S2", Coin::new("ETH.ETH", 3));
        linked.enqueue(LinkedKind::Fee, "NOPE", Coin::new("ETH.ETH", 3));

        let report = linked.flush_fee(&mut totals, &store, 2, Nano(HOUR)).await;
        assert_eq!(report, FlushReport { matched: 2, dead: 1 });
        assert_eq!(totals.current("BTC.BTC").rune_depth, 2_000_000);
        assert_eq!(totals.current("ETH.ETH").asset_depth, 3);
        assert_eq!(linked.metrics.dead_count("fee"), 1);
        assert_eq!(linked.pending(LinkedKind::Fee), 0);
    }

    #[tokio::test]
    async fn test_rows_of_current_block_resolve_before_commit() {
        let store = MemoryEventStore::new();
        let mut totals = RunningTotals::new();
        let mut linked = linked();

        linked.track_swap(SwapLink {
            tx: "NOW".to_owned(),
            pool: "BTC.BTC".to_owned(),
            from_asset: "THOR.RUNE".to_owned(),
        });
        linked.track_withdraw(WithdrawLink {
            tx: "OUT".to_owned(),
            pool: "ETH.ETH".to_owned(),
        });
        linked.enqueue(LinkedKind::Outbound, "NOW", Coin::new("BTC.BTC", 990));
        linked.enqueue(LinkedKind::Outbound, "OUT", Coin::new("THOR.RUNE", 40));
        linked.enqueue(LinkedKind::Fee, "NOW", Coin::new("THOR.RUNE", 7));

        let report = linked.flush_outbound(&mut totals, &store, 1, Nano(HOUR)).await;
        assert_eq!(report, FlushReport { matched: 2, dead: 0 });
        let report = linked.flush_fee(&mut totals, &store, 1, Nano(HOUR)).await;
        assert_eq!(report, FlushReport { matched: 1, dead: 0 });
        assert_eq!(totals.current_depths("BTC.BTC"), (-990, 7, 0));
        assert_eq!(totals.current_depths("ETH.ETH"), (0, -40, 0));

        // Tracked rows belong to one block only.
        linked.end_block();
        linked.enqueue(LinkedKind::Outbound, "NOW", Coin::new("BTC.BTC", 1));
        let report = linked.flush_outbound(&mut totals, &store, 2, Nano(2 * HOUR)).await;
        assert_eq!(report, FlushReport { matched: 0, dead: 1 });
    }
}
