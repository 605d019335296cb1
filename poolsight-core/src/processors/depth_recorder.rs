//! Compact time series of pool depths.
//!
//! After each block the new totals are compared with the last recorded ones.
//! Only pools where something changed get a row, and that row always carries
//! all four values so any past state can be read from a single row.

use crate::aggregate::{DepthMap, TotalsSnapshot};
use crate::store::DepthChangeRow;
use crate::utils::Nano;
use compact_str::CompactString;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct DepthRecorder {
    previous: TotalsSnapshot,
}

/// `(changed, value)` of one accumulator. A pool missing from the new map
/// reads as 0, and counts as a change if it was there before.
fn diff_at_key(pool: &str, old: &DepthMap, new: &DepthMap) -> (bool, i64) {
    match (old.get(pool), new.get(pool)) {
        (old_value, Some(&value)) => (old_value != Some(&value), value),
        (old_value, None) => (old_value.is_some(), 0),
    }
}

impl DepthRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already recorded state, e.g. after a restart.
    pub fn with_previous(previous: TotalsSnapshot) -> Self {
        Self { previous }
    }

    /// Rows for every pool whose values differ from the last saved state.
    pub fn diff(&self, timestamp: Nano, new: &TotalsSnapshot) -> Vec<DepthChangeRow> {
        let old = &self.previous;
        let pools: BTreeSet<&CompactString> = old.pools().into_iter().chain(new.pools()).collect();

        pools
            .into_iter()
            .filter_map(|pool| {
                let (asset_changed, asset_e8) = diff_at_key(pool, &old.asset_e8, &new.asset_e8);
                let (rune_changed, rune_e8) = diff_at_key(pool, &old.rune_e8, &new.rune_e8);
                let (synth_changed, synth_e8) = diff_at_key(pool, &old.synth_e8, &new.synth_e8);
                let (units_changed, units) = diff_at_key(pool, &old.units, &new.units);
                (asset_changed || rune_changed || synth_changed || units_changed).then(|| {
                    DepthChangeRow {
                        pool: pool.clone(),
                        asset_e8,
                        rune_e8,
                        synth_e8,
                        units,
                        block_timestamp: timestamp,
                    }
                })
            })
            .collect()
    }

    /// Make `recorded` the baseline for the next diff.
    pub fn save(&mut self, recorded: TotalsSnapshot) {
        self.previous = recorded;
    }

    /// Diff against the baseline and move the baseline forward.
    pub fn update(&mut self, timestamp: Nano, new: &TotalsSnapshot) -> Vec<DepthChangeRow> {
        let rows = self.diff(timestamp, new);
        self.save(new.clone());
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RunningTotals;

    #[test]
    fn test_rows_only_when_changed_with_full_tuple() {
        let mut recorder = DepthRecorder::new();
        let mut totals = RunningTotals::new();
        let mut rows = Vec::new();

        // Call 1: P changes.
        totals.add_asset_depth("P", 10);
        totals.add_units("Q", 1);
        rows.extend(recorder.update(Nano(1), &totals.snapshot()));
        // Call 2: only Q changes.
        totals.add_units("Q", 1);
        rows.extend(recorder.update(Nano(2), &totals.snapshot()));
        // Call 3: P changes again.
        totals.add_rune_depth("P", 20);
        rows.extend(recorder.update(Nano(3), &totals.snapshot()));
        // Call 4: nothing changes.
        rows.extend(recorder.update(Nano(4), &totals.snapshot()));

        let p_rows: Vec<_> = rows.iter().filter(|r| r.pool == "P").collect();
        assert_eq!(p_rows.len(), 2);
        assert_eq!(
            (p_rows[0].asset_e8, p_rows[0].rune_e8, p_rows[0].synth_e8, p_rows[0].units),
            (10, 0, 0, 0)
        );
        assert_eq!(p_rows[0].block_timestamp, Nano(1));
        assert_eq!(
            (p_rows[1].asset_e8, p_rows[1].rune_e8, p_rows[1].synth_e8, p_rows[1].units),
            (10, 20, 0, 0)
        );
        assert_eq!(p_rows[1].block_timestamp, Nano(3));
        assert_eq!(rows.iter().filter(|r| r.pool == "Q").count(), 2);
    }

    #[test]
    fn test_disappearing_pool_is_a_change() {
        let mut old = TotalsSnapshot::default();
        old.asset_e8.insert("GONE".into(), 5);
        old.rune_e8.insert("GONE".into(), 50);
        let recorder = DepthRecorder::with_previous(old);

        let rows = recorder.diff(Nano(9), &TotalsSnapshot::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pool, "GONE");
        assert_eq!((rows[0].asset_e8, rows[0].rune_e8), (0, 0));
    }

    #[test]
    fn test_restored_baseline_emits_nothing() {
        let mut totals = RunningTotals::new();
        totals.add_asset_depth("BTC.BTC", 3);
        let recorder = DepthRecorder::with_previous(totals.snapshot());
        assert!(recorder.diff(Nano(1), &totals.snapshot()).is_empty());
    }
}
