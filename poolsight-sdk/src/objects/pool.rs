use serde::{Deserialize, Serialize};

/// Depths of a single pool as of the latest committed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDepthResponse {
    pub pool: String,
    pub asset_depth: i64,
    pub rune_depth: i64,
    pub synth_depth: i64,
    pub units: i64,
    /// Rune per unit of asset, 0 when the pool holds no asset.
    pub asset_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolsResponse {
    pub height: i64,
    pub pools: Vec<PoolDepthResponse>,
}

/// The most recently committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestBlockResponse {
    pub height: i64,
    /// Chain time in unix nanoseconds.
    pub timestamp: i64,
    /// Block hash, hex encoded.
    pub hash: String,
}

/// Time window for history queries, unix nanoseconds, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub from: i64,
    pub to: i64,
}

/// Query parameters for point-in-time lookups.
///
/// A missing or zero `at` means the latest committed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentQuery {
    #[serde(default)]
    pub at: Option<i64>,
}

/// One persisted depth change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthHistoryItem {
    pub asset_depth: i64,
    pub rune_depth: i64,
    pub synth_depth: i64,
    pub units: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthHistoryResponse {
    pub pool: String,
    pub items: Vec<DepthHistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatusResponse {
    pub pool: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
