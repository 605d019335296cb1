//! In-memory running totals per pool.
//!
//! The block writer is the only mutator. Everything handed out of here is a
//! copy, so later mutation never shows through a snapshot.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Pool identifier to signed accumulator.
pub type DepthMap = BTreeMap<CompactString, i64>;

/// All four accumulators of one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDepth {
    pub asset_depth: i64,
    pub rune_depth: i64,
    pub synth_depth: i64,
    pub units: i64,
}

impl PoolDepth {
    /// Rune per unit of asset. Returns 0 for an empty asset side.
    pub fn asset_price(&self) -> f64 {
        asset_price(self.asset_depth, self.rune_depth)
    }
}

/// Rune per unit of asset, or 0 when `asset_depth` is 0.
pub fn asset_price(asset_depth: i64, rune_depth: i64) -> f64 {
    if asset_depth == 0 {
        return 0.0;
    }
    rune_depth as f64 / asset_depth as f64
}

/// Independent copy of every accumulator map.
///
/// Also the persisted aggregate state of a committed block, used to restore
/// the running totals on a cold start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsSnapshot {
    #[serde(default)]
    pub asset_e8: DepthMap,
    #[serde(default)]
    pub rune_e8: DepthMap,
    #[serde(default)]
    pub synth_e8: DepthMap,
    #[serde(default)]
    pub units: DepthMap,
}

impl TotalsSnapshot {
    /// Union of pool identifiers across all four maps.
    pub fn pools(&self) -> BTreeSet<&CompactString> {
        self.asset_e8
            .keys()
            .chain(self.rune_e8.keys())
            .chain(self.synth_e8.keys())
            .chain(self.units.keys())
            .collect()
    }

    pub fn depth_of(&self, pool: &str) -> PoolDepth {
        PoolDepth {
            asset_depth: self.asset_e8.get(pool).copied().unwrap_or_default(),
            rune_depth: self.rune_e8.get(pool).copied().unwrap_or_default(),
            synth_depth: self.synth_e8.get(pool).copied().unwrap_or_default(),
            units: self.units.get(pool).copied().unwrap_or_default(),
        }
    }

    /// Per-pool depths for every pool known to the snapshot.
    pub fn pool_depths(&self) -> BTreeMap<CompactString, PoolDepth> {
        self.pools()
            .into_iter()
            .map(|pool| (pool.clone(), self.depth_of(pool)))
            .collect()
    }
}

/// Running totals of every pool.
///
/// Entries are created lazily with an implicit starting value of zero.
/// Values may go negative while a block is being applied.
#[derive(Debug, Default)]
pub struct RunningTotals {
    asset_e8: HashMap<CompactString, i64>,
    rune_e8: HashMap<CompactString, i64>,
    synth_e8: HashMap<CompactString, i64>,
    units: HashMap<CompactString, i64>,
}

fn add_to(map: &mut HashMap<CompactString, i64>, pool: &str, delta: i64) {
    match map.get_mut(pool) {
        Some(value) => *value += delta,
        None => {
            map.insert(CompactString::from(pool), delta);
        }
    }
}

fn set_in(map: &mut HashMap<CompactString, i64>, pool: &str, value: i64) {
    map.insert(CompactString::from(pool), value);
}

fn copy_of(map: &HashMap<CompactString, i64>) -> DepthMap {
    map.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn fill(map: &DepthMap) -> HashMap<CompactString, i64> {
    map.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

impl RunningTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild running totals from a persisted snapshot.
    pub fn from_snapshot(snapshot: &TotalsSnapshot) -> Self {
        Self {
            asset_e8: fill(&snapshot.asset_e8),
            rune_e8: fill(&snapshot.rune_e8),
            synth_e8: fill(&snapshot.synth_e8),
            units: fill(&snapshot.units),
        }
    }

    // -- Add ------------------------------------------------------------

    pub fn add_asset_depth(&mut self, pool: &str, delta_e8: i64) {
        add_to(&mut self.asset_e8, pool, delta_e8);
    }

    pub fn add_rune_depth(&mut self, pool: &str, delta_e8: i64) {
        add_to(&mut self.rune_e8, pool, delta_e8);
    }

    pub fn add_synth_depth(&mut self, pool: &str, delta_e8: i64) {
        add_to(&mut self.synth_e8, pool, delta_e8);
    }

    pub fn add_units(&mut self, pool: &str, delta: i64) {
        add_to(&mut self.units, pool, delta);
    }

    // -- Set ------------------------------------------------------------

    pub fn set_asset_depth(&mut self, pool: &str, value_e8: i64) {
        set_in(&mut self.asset_e8, pool, value_e8);
    }

    pub fn set_rune_depth(&mut self, pool: &str, value_e8: i64) {
        set_in(&mut self.rune_e8, pool, value_e8);
    }

    pub fn set_synth_depth(&mut self, pool: &str, value_e8: i64) {
        set_in(&mut self.synth_e8, pool, value_e8);
    }

    pub fn set_units(&mut self, pool: &str, value: i64) {
        set_in(&mut self.units, pool, value);
    }

    /// Zero every accumulator of the pool.
    pub fn reset_pool(&mut self, pool: &str) {
        self.set_asset_depth(pool, 0);
        self.set_rune_depth(pool, 0);
        self.set_synth_depth(pool, 0);
        self.set_units(pool, 0);
    }

    // -- Read -----------------------------------------------------------

    /// Asset, rune and synth depth of the pool.
    pub fn current_depths(&self, pool: &str) -> (i64, i64, i64) {
        let depth = self.current(pool);
        (depth.asset_depth, depth.rune_depth, depth.synth_depth)
    }

    pub fn current(&self, pool: &str) -> PoolDepth {
        PoolDepth {
            asset_depth: self.asset_e8.get(pool).copied().unwrap_or_default(),
            rune_depth: self.rune_e8.get(pool).copied().unwrap_or_default(),
            synth_depth: self.synth_e8.get(pool).copied().unwrap_or_default(),
            units: self.units.get(pool).copied().unwrap_or_default(),
        }
    }

    pub fn snapshot_asset_depths(&self) -> DepthMap {
        copy_of(&self.asset_e8)
    }

    pub fn snapshot_rune_depths(&self) -> DepthMap {
        copy_of(&self.rune_e8)
    }

    pub fn snapshot_synth_depths(&self) -> DepthMap {
        copy_of(&self.synth_e8)
    }

    pub fn snapshot_units(&self) -> DepthMap {
        copy_of(&self.units)
    }

    pub fn snapshot(&self) -> TotalsSnapshot {
        TotalsSnapshot {
            asset_e8: self.snapshot_asset_depths(),
            rune_e8: self.snapshot_rune_depths(),
            synth_e8: self.snapshot_synth_depths(),
            units: self.snapshot_units(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation_and_negative_values() {
        let mut totals = RunningTotals::new();
        assert_eq!(totals.current_depths("BTC.BTC"), (0, 0, 0));

        totals.add_asset_depth("BTC.BTC", -50);
        totals.add_rune_depth("BTC.BTC", 20);
        totals.add_rune_depth("BTC.BTC", 5);
        totals.add_units("BTC.BTC", 7);

        assert_eq!(totals.current_depths("BTC.BTC"), (-50, 25, 0));
        assert_eq!(totals.current("BTC.BTC").units, 7);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut totals = RunningTotals::new();
        totals.add_asset_depth("ETH.ETH", 100);
        totals.add_synth_depth("ETH.ETH", 3);

        let mut assets = totals.snapshot_asset_depths();
        let snapshot = totals.snapshot();

        totals.add_asset_depth("ETH.ETH", 1);
        totals.add_asset_depth("BTC.BTC", 9);
        assert_eq!(assets.get("ETH.ETH"), Some(&100));
        assert_eq!(snapshot.asset_e8.get("ETH.ETH"), Some(&100));
        assert!(!snapshot.asset_e8.contains_key("BTC.BTC"));

        assets.insert("ETH.ETH".into(), 0);
        assert_eq!(totals.current("ETH.ETH").asset_depth, 101);
    }

    #[test]
    fn test_restore_and_reset() {
        let mut totals = RunningTotals::new();
        totals.add_asset_depth("BTC.BTC", 10);
        totals.add_rune_depth("BTC.BTC", 20);
        totals.add_units("BNB.BNB", 4);

        let snapshot = totals.snapshot();
        let mut restored = RunningTotals::from_snapshot(&snapshot);
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(snapshot.pools().len(), 2);

        restored.reset_pool("BTC.BTC");
        assert_eq!(restored.current("BTC.BTC"), PoolDepth::default());
    }

    #[test]
    fn test_asset_price_zero_depth() {
        assert_eq!(asset_price(0, 500), 0.0);
        assert_eq!(asset_price(4, 10), 2.5);
    }
}
