//! Running totals and the linked-event resolver that feeds them.

pub mod linked;
pub mod totals;

pub use linked::{DEFAULT_OUTBOUND_TIMEOUT, FlushReport, LinkedEvents, LinkedKind};
pub use totals::{DepthMap, PoolDepth, RunningTotals, TotalsSnapshot, asset_price};
