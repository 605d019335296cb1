//! Per-event handling.
//!
//! Every event is applied to the running totals, either directly or through
//! the linked-event queues, and buffered as a row for the block commit. Rows
//! are written in the same transaction that marks the block committed, so an
//! interrupted block leaves nothing behind. A row that fails to write is
//! logged and counted by the writer but never stops the block: the totals are
//! the source of truth for the published state.

use crate::aggregate::{
    FlushReport, LinkedEvents, LinkedKind, RunningTotals, TotalsSnapshot,
};
use crate::events::{BlockMeta, Event};
use crate::metrics::IndexerMetrics;
use crate::store::{EventStore, SwapLink, WithdrawLink};
use poolsight_sdk::objects::asset::{Coin, CoinType, native_pool};
use std::sync::Arc;
use tracing::{debug, warn};

const SUSPENDED: &str = "suspended";

pub struct EventRecorder {
    store: Arc<dyn EventStore>,
    totals: RunningTotals,
    linked: LinkedEvents,
    block_events: Vec<Event>,
    metrics: IndexerMetrics,
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn EventStore>,
        outbound_timeout: time::Duration,
        metrics: IndexerMetrics,
    ) -> Self {
        Self {
            store,
            totals: RunningTotals::new(),
            linked: LinkedEvents::new(outbound_timeout, metrics.clone()),
            block_events: Vec::new(),
            metrics,
        }
    }

    pub fn totals(&self) -> &RunningTotals {
        &self.totals
    }

    /// Replace the running totals, e.g. from a committed block's state.
    ///
    /// Anything recorded since the last commit is discarded.
    pub fn restore_totals(&mut self, snapshot: &TotalsSnapshot) {
        self.totals = RunningTotals::from_snapshot(snapshot);
        self.linked.reset();
        self.block_events.clear();
    }

    /// Apply the event to the running totals and buffer its row for the
    /// block commit.
    pub fn record(&mut self, event: &Event) {
        self.apply(event);
        match event {
            Event::Swap(e) => self.linked.track_swap(SwapLink {
                tx: e.tx.clone(),
                pool: e.pool.clone(),
                from_asset: e.from_asset.clone(),
            }),
            Event::Withdraw(e) => self.linked.track_withdraw(WithdrawLink {
                tx: e.tx.clone(),
                pool: e.pool.clone(),
            }),
            _ => {}
        }
        self.block_events.push(event.clone());
        self.metrics.events_recorded.with_label_values(&[event.kind()]).inc();
    }

    /// Events recorded since the last call, in order. Ends the block for
    /// linked-event lookups.
    pub fn take_block_events(&mut self) -> Vec<Event> {
        self.linked.end_block();
        std::mem::take(&mut self.block_events)
    }

    /// Resolve the outbounds queued in this block, then the fees.
    pub async fn flush_linked(&mut self, meta: &BlockMeta) -> (FlushReport, FlushReport) {
        let outbound = self
            .linked
            .flush_outbound(&mut self.totals, self.store.as_ref(), meta.height, meta.timestamp)
            .await;
        let fee = self
            .linked
            .flush_fee(&mut self.totals, self.store.as_ref(), meta.height, meta.timestamp)
            .await;
        (outbound, fee)
    }

    fn apply(&mut self, event: &Event) {
        let totals = &mut self.totals;
        match event {
            Event::Add(e) => {
                totals.add_asset_depth(&e.pool, e.asset_e8);
                totals.add_rune_depth(&e.pool, e.rune_e8);
            }
            Event::Stake(e) => {
                totals.add_asset_depth(&e.pool, e.asset_e8);
                totals.add_rune_depth(&e.pool, e.rune_e8);
                totals.add_units(&e.pool, e.stake_units);
            }
            Event::Withdraw(e) => {
                totals.add_units(&e.pool, -e.stake_units);
                if e.imp_loss_protection_e8 != 0 {
                    totals.add_rune_depth(&e.pool, e.imp_loss_protection_e8);
                }
                if e.asset == e.pool && e.asset_e8 != 0 {
                    totals.add_asset_depth(&e.pool, -e.asset_e8);
                }
            }
            Event::Swap(e) => {
                // Input leg only. The output leaves through an outbound.
                match CoinType::of(&e.from_asset) {
                    CoinType::Rune => totals.add_rune_depth(&e.pool, e.from_e8),
                    CoinType::Synth => {
                        totals.add_synth_depth(&native_pool(&e.from_asset), -e.from_e8)
                    }
                    CoinType::Native | CoinType::Unknown => {
                        totals.add_asset_depth(&e.pool, e.from_e8)
                    }
                }
                if CoinType::of(&e.to_asset) == CoinType::Synth {
                    totals.add_synth_depth(&native_pool(&e.to_asset), e.to_e8);
                }
            }
            Event::Outbound(e) => self.linked.enqueue(
                LinkedKind::Outbound,
                &e.in_tx,
                Coin::new(e.asset.clone(), e.asset_e8),
            ),
            Event::Fee(e) => self.linked.enqueue(
                LinkedKind::Fee,
                &e.tx,
                Coin::new(e.asset.clone(), e.asset_e8),
            ),
            Event::Pool(e) => {
                if e.status.eq_ignore_ascii_case(SUSPENDED) {
                    debug!(pool = %e.asset, "pool suspended, zeroing depths");
                    totals.reset_pool(&e.asset);
                }
            }
            Event::Rewards(e) => {
                for reward in &e.per_pool {
                    totals.add_rune_depth(&reward.asset, reward.e8);
                }
            }
            Event::Gas(e) => {
                totals.add_asset_depth(&e.asset, -e.asset_e8);
                totals.add_rune_depth(&e.asset, e.rune_e8);
            }
            Event::Errata(e) => {
                totals.add_asset_depth(&e.asset, e.asset_e8);
                totals.add_rune_depth(&e.asset, e.rune_e8);
            }
            Event::Slash(e) => {
                for amount in &e.amounts {
                    match amount.coin_type() {
                        CoinType::Rune => totals.add_rune_depth(&e.pool, amount.e8),
                        CoinType::Native => totals.add_asset_depth(&e.pool, amount.e8),
                        CoinType::Synth => totals.add_synth_depth(&e.pool, amount.e8),
                        CoinType::Unknown => {
                            warn!(pool = %e.pool, asset = %amount.asset, "slash of unknown asset ignored")
                        }
                    }
                }
            }
            Event::PoolBalanceChange(e) => {
                let rune = if e.rune_add { e.rune_amt } else { -e.rune_amt };
                let asset = if e.asset_add { e.asset_amt } else { -e.asset_amt };
                totals.add_rune_depth(&e.asset, rune);
                totals.add_asset_depth(&e.asset, asset);
            }
            Event::Bond(_)
            | Event::Refund(_)
            | Event::Reserve(_)
            | Event::NewNode(_)
            | Event::UpdateNodeAccountStatus(_)
            | Event::SetMimir(_)
            | Event::SetVersion(_)
            | Event::Transfer(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DEFAULT_OUTBOUND_TIMEOUT;
    use crate::events::{Add, Outbound, Pool, PoolBalanceChange, Swap};
    use crate::store::MemoryEventStore;
    use crate::utils::Nano;

    fn meta() -> BlockMeta {
        BlockMeta {
            height: 10,
            timestamp: Nano(1_000),
            hash: vec![0xab],
        }
    }

    fn recorder(store: Arc<MemoryEventStore>) -> EventRecorder {
        EventRecorder::new(store, DEFAULT_OUTBOUND_TIMEOUT, IndexerMetrics::new_for_testing())
    }

    fn add(pool: &str, asset_e8: i64, rune_e8: i64) -> Event {
        Event::Add(Add {
            tx: "ADD1".to_owned(),
            chain: "BTC".to_owned(),
            from_addr: "bc1q".to_owned(),
            to_addr: "vault".to_owned(),
            asset: pool.to_owned(),
            asset_e8,
            rune_e8,
            memo: String::new(),
            pool: pool.to_owned(),
        })
    }

    fn swap(from_asset: &str, from_e8: i64, to_asset: &str, to_e8: i64, pool: &str) -> Event {
        Event::Swap(Swap {
            tx: "SWAP1".to_owned(),
            chain: "THOR".to_owned(),
            from_addr: "thor1".to_owned(),
            to_addr: "bc1q".to_owned(),
            from_asset: from_asset.to_owned(),
            from_e8,
            to_asset: to_asset.to_owned(),
            to_e8,
            memo: String::new(),
            pool: pool.to_owned(),
            to_e8_min: 0,
            swap_slip_bp: 0,
            liq_fee_e8: 0,
            liq_fee_in_rune_e8: 0,
        })
    }

    #[tokio::test]
    async fn test_swap_input_leg_applies_immediately() {
        let store = Arc::new(MemoryEventStore::new());
        let mut recorder = recorder(store.clone());

        recorder.record(&add("BTC.BTC", 1_000_000, 10_000_000));
        recorder.record(&swap("THOR.RUNE", 10_000, "BTC.BTC", 990, "BTC.BTC"));

        assert_eq!(recorder.totals().current_depths("BTC.BTC"), (1_000_000, 10_010_000, 0));
        // Rows wait for the block commit.
        assert_eq!(store.event_count("swap").await, 0);
        let rows = recorder.take_block_events();
        assert_eq!(rows.iter().map(Event::kind).collect::<Vec<_>>(), vec!["add", "swap"]);
        assert!(recorder.take_block_events().is_empty());
    }

    #[tokio::test]
    async fn test_outbound_resolves_against_uncommitted_swap() {
        let store = Arc::new(MemoryEventStore::new());
        let mut recorder = recorder(store.clone());

        recorder.record(&add("BTC.BTC", 1_000_000, 10_000_000));
        recorder.record(&swap("THOR.RUNE", 10_000, "BTC.BTC", 990, "BTC.BTC"));
        recorder.record(&Event::Outbound(Outbound {
            tx: Some("OUT1".to_owned()),
            chain: "BTC".to_owned(),
            from_addr: "vault".to_owned(),
            to_addr: "bc1q".to_owned(),
            asset: "BTC.BTC".to_owned(),
            asset_e8: 990,
            memo: "OUT:SWAP1".to_owned(),
            in_tx: "SWAP1".to_owned(),
        }));

        let (outbound, _) = recorder.flush_linked(&meta()).await;
        assert_eq!(outbound.matched, 1);
        assert_eq!(recorder.totals().current_depths("BTC.BTC"), (999_010, 10_010_000, 0));
    }

    #[tokio::test]
    async fn test_restore_discards_uncommitted_rows() {
        let store = Arc::new(MemoryEventStore::new());
        let mut recorder = recorder(store);

        recorder.record(&add("ETH.ETH", 5, 50));
        recorder.restore_totals(&TotalsSnapshot::default());

        assert_eq!(recorder.totals().current_depths("ETH.ETH"), (0, 0, 0));
        assert!(recorder.take_block_events().is_empty());
    }

    #[tokio::test]
    async fn test_synth_mint_and_burn() {
        let store = Arc::new(MemoryEventStore::new());
        let mut recorder = recorder(store);

        recorder.record(&swap("THOR.RUNE", 400, "BTC/BTC", 4, "BTC.BTC"));
        assert_eq!(recorder.totals().current_depths("BTC.BTC"), (0, 400, 4));

        recorder.record(&swap("BTC/BTC", 1, "THOR.RUNE", 100, "BTC.BTC"));
        assert_eq!(recorder.totals().current_depths("BTC.BTC"), (0, 400, 3));
    }

    #[tokio::test]
    async fn test_suspended_pool_and_balance_change() {
        let store = Arc::new(MemoryEventStore::new());
        let mut recorder = recorder(store);

        recorder.record(&add("BNB.BNB", 70, 700));
        recorder.record(&Event::PoolBalanceChange(PoolBalanceChange {
            asset: "BNB.BNB".to_owned(),
            rune_amt: 100,
            rune_add: false,
            asset_amt: 30,
            asset_add: true,
            reason: "donate".to_owned(),
        }));
        assert_eq!(recorder.totals().current_depths("BNB.BNB"), (100, 600, 0));

        recorder.record(&Event::Pool(Pool {
            asset: "BNB.BNB".to_owned(),
            status: "Suspended".to_owned(),
        }));
        assert_eq!(recorder.totals().current_depths("BNB.BNB"), (0, 0, 0));
    }
}
