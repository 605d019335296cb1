//! Asset notation.
//!
//! Assets are written `CHAIN.SYMBOL` for layer-1 assets (`BTC.BTC`) and
//! `CHAIN/SYMBOL` for synthetic assets (`BTC/BTC`). The native currency is
//! rune, which has carried several identifiers over the life of the chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifiers the native rune currency has been issued under.
pub const RUNE_ASSETS: [&str; 3] = ["THOR.RUNE", "BNB.RUNE-67C", "BNB.RUNE-B1A"];

/// The native rune asset on the current chain.
pub const NATIVE_RUNE: &str = "THOR.RUNE";

/// Classification of an asset string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinType {
    Rune,
    Native,
    Synth,
    Unknown,
}

impl CoinType {
    pub fn of(asset: &str) -> Self {
        if is_rune(asset) {
            CoinType::Rune
        } else if asset.contains('/') {
            CoinType::Synth
        } else if asset.contains('.') {
            CoinType::Native
        } else {
            CoinType::Unknown
        }
    }
}

/// Whether the asset is one of the rune identifiers.
pub fn is_rune(asset: &str) -> bool {
    RUNE_ASSETS.contains(&asset)
}

/// The pool an asset trades in.
///
/// Synths live in the pool of their layer-1 asset, so `BTC/BTC` maps to
/// `BTC.BTC`. Everything else is returned unchanged.
pub fn native_pool(asset: &str) -> String {
    match CoinType::of(asset) {
        CoinType::Synth => asset.replacen('/', ".", 1),
        _ => asset.to_owned(),
    }
}

/// Error returned when a coin string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCoinError {
    #[error("coin {0:?} is not of the form \"<amount> <asset>\"")]
    Format(String),
    #[error("coin amount {0:?} is not an integer")]
    Amount(String),
}

/// An amount of some asset in E8 units.
///
/// The textual form is `"<e8> <asset>"`, e.g. `"10000 THOR.RUNE"`, which is
/// also how it is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coin {
    pub asset: String,
    pub e8: i64,
}

impl Coin {
    pub fn new(asset: impl Into<String>, e8: i64) -> Self {
        Self {
            asset: asset.into(),
            e8,
        }
    }

    pub fn coin_type(&self) -> CoinType {
        CoinType::of(&self.asset)
    }

    pub fn is_rune(&self) -> bool {
        is_rune(&self.asset)
    }
}

impl FromStr for Coin {
    type Err = ParseCoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, asset) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| ParseCoinError::Format(s.to_owned()))?;
        let asset = asset.trim();
        if asset.is_empty() {
            return Err(ParseCoinError::Format(s.to_owned()));
        }
        let e8 = amount
            .parse::<i64>()
            .map_err(|_| ParseCoinError::Amount(amount.to_owned()))?;
        Ok(Coin::new(asset, e8))
    }
}

impl TryFrom<String> for Coin {
    type Error = ParseCoinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coin> for String {
    fn from(coin: Coin) -> Self {
        coin.to_string()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.e8, self.asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_type_classification() {
        assert_eq!(CoinType::of("THOR.RUNE"), CoinType::Rune);
        assert_eq!(CoinType::of("BNB.RUNE-B1A"), CoinType::Rune);
        assert_eq!(CoinType::of("BTC.BTC"), CoinType::Native);
        assert_eq!(CoinType::of("BTC/BTC"), CoinType::Synth);
        assert_eq!(CoinType::of("RUNE"), CoinType::Unknown);
    }

    #[test]
    fn test_native_pool_of_synth() {
        assert_eq!(native_pool("ETH/USDC-0XA0B8"), "ETH.USDC-0XA0B8");
        assert_eq!(native_pool("ETH.ETH"), "ETH.ETH");
    }

    #[test]
    fn test_parse_coin() {
        let coin: Coin = "10000 THOR.RUNE".parse().unwrap();
        assert_eq!(coin, Coin::new(NATIVE_RUNE, 10_000));
        assert!(coin.is_rune());

        assert_eq!(
            "10000".parse::<Coin>(),
            Err(ParseCoinError::Format("10000".to_owned()))
        );
        assert_eq!(
            "ten BTC.BTC".parse::<Coin>(),
            Err(ParseCoinError::Amount("ten".to_owned()))
        );
    }

    #[test]
    fn test_coin_serializes_as_string() {
        let coin = Coin::new("BTC.BTC", 990);
        let json = serde_json::to_string(&coin).unwrap();
        assert_eq!(json, "\"990 BTC.BTC\"");
        let back: Coin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coin);
    }
}
