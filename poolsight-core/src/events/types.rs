//! Chain event definitions.
//!
//! Events are decoded upstream and handed to the indexer inside a [`Block`].
//! They are write-once: the recorder consumes each event exactly once and
//! persists it as an immutable row.

use crate::utils::Nano;
use poolsight_sdk::objects::asset::Coin;
use serde::{Deserialize, Serialize};

/// Height, chain time and hash of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub height: i64,
    pub timestamp: Nano,
    #[serde(with = "hex::serde")]
    pub hash: Vec<u8>,
}

/// A block as delivered by the fetch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    pub meta: BlockMeta,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Liquidity added to a pool without minting units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Add {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub asset_e8: i64,
    pub rune_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub pool: String,
}

/// Liquidity provision that mints units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub pool: String,
    #[serde(default)]
    pub asset_tx: Option<String>,
    #[serde(default)]
    pub asset_chain: Option<String>,
    #[serde(default)]
    pub asset_addr: Option<String>,
    pub asset_e8: i64,
    #[serde(default)]
    pub rune_tx: Option<String>,
    #[serde(default)]
    pub rune_addr: Option<String>,
    pub rune_e8: i64,
    pub stake_units: i64,
}

/// Liquidity withdrawal. The emitted amounts leave through outbounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdraw {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    /// Coin sent along with the withdraw request.
    pub asset: String,
    pub asset_e8: i64,
    pub emit_asset_e8: i64,
    pub emit_rune_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub pool: String,
    pub stake_units: i64,
    pub basis_points: i64,
    #[serde(default)]
    pub asymmetry: f64,
    #[serde(default)]
    pub imp_loss_protection_e8: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub from_asset: String,
    pub from_e8: i64,
    pub to_asset: String,
    pub to_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub pool: String,
    #[serde(default)]
    pub to_e8_min: i64,
    #[serde(default)]
    pub swap_slip_bp: i64,
    #[serde(default)]
    pub liq_fee_e8: i64,
    #[serde(default)]
    pub liq_fee_in_rune_e8: i64,
}

/// Funds leaving the network. `in_tx` links it to the originating swap or
/// withdraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    #[serde(default)]
    pub tx: Option<String>,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub asset_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub in_tx: String,
}

/// Network fee charged on an outbound, linked to its swap through `tx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub tx: String,
    pub asset: String,
    pub asset_e8: i64,
    #[serde(default)]
    pub pool_deduct: i64,
}

/// Pool status change, e.g. `available`, `staged` or `suspended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub asset: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    pub bond_e8: i64,
    #[serde(default)]
    pub per_pool: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub asset_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub bond_type: String,
    pub e8: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gas {
    pub asset: String,
    pub asset_e8: i64,
    pub rune_e8: i64,
    pub tx_count: i64,
}

/// Correction of a previously recorded inbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errata {
    pub in_tx: String,
    pub asset: String,
    pub asset_e8: i64,
    pub rune_e8: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slash {
    pub pool: String,
    #[serde(default)]
    pub amounts: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalanceChange {
    pub asset: String,
    pub rune_amt: i64,
    pub rune_add: bool,
    pub asset_amt: i64,
    pub asset_add: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub asset_e8: i64,
    #[serde(default)]
    pub asset_2nd: Option<String>,
    #[serde(default)]
    pub asset_2nd_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub code: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub tx: String,
    pub chain: String,
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub asset_e8: i64,
    #[serde(default)]
    pub memo: String,
    pub addr: String,
    pub e8: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub node_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNodeAccountStatus {
    pub node_addr: String,
    pub former: String,
    pub current: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMimir {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVersion {
    pub node_addr: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from_addr: String,
    pub to_addr: String,
    pub asset: String,
    pub amount_e8: i64,
}

/// Every event kind the indexer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Add(Add),
    Stake(Stake),
    Withdraw(Withdraw),
    Swap(Swap),
    Outbound(Outbound),
    Fee(Fee),
    Pool(Pool),
    Rewards(Rewards),
    Bond(Bond),
    Gas(Gas),
    Errata(Errata),
    Slash(Slash),
    PoolBalanceChange(PoolBalanceChange),
    Refund(Refund),
    Reserve(Reserve),
    NewNode(NewNode),
    UpdateNodeAccountStatus(UpdateNodeAccountStatus),
    SetMimir(SetMimir),
    SetVersion(SetVersion),
    Transfer(Transfer),
}

impl Event {
    /// Stable name of the event kind, used for metric labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Add(_) => "add",
            Event::Stake(_) => "stake",
            Event::Withdraw(_) => "withdraw",
            Event::Swap(_) => "swap",
            Event::Outbound(_) => "outbound",
            Event::Fee(_) => "fee",
            Event::Pool(_) => "pool",
            Event::Rewards(_) => "rewards",
            Event::Bond(_) => "bond",
            Event::Gas(_) => "gas",
            Event::Errata(_) => "errata",
            Event::Slash(_) => "slash",
            Event::PoolBalanceChange(_) => "pool_balance_change",
            Event::Refund(_) => "refund",
            Event::Reserve(_) => "reserve",
            Event::NewNode(_) => "new_node",
            Event::UpdateNodeAccountStatus(_) => "update_node_account_status",
            Event::SetMimir(_) => "set_mimir",
            Event::SetVersion(_) => "set_version",
            Event::Transfer(_) => "transfer",
        }
    }

    /// Transaction id carried by the event, if any.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Event::Add(e) => Some(&e.tx),
            Event::Stake(e) => e.asset_tx.as_deref().or(e.rune_tx.as_deref()),
            Event::Withdraw(e) => Some(&e.tx),
            Event::Swap(e) => Some(&e.tx),
            Event::Outbound(e) => e.tx.as_deref(),
            Event::Fee(e) => Some(&e.tx),
            Event::Bond(e) => Some(&e.tx),
            Event::Errata(e) => Some(&e.in_tx),
            Event::Refund(e) => Some(&e.tx),
            Event::Reserve(e) => Some(&e.tx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_from_json() {
        let json = r#"{
            "height": 42,
            "timestamp": 1618000000000000000,
            "hash": "beef",
            "events": [
                {"type": "swap", "tx": "A1", "chain": "THOR", "from_addr": "thor1",
                 "to_addr": "bc1", "from_asset": "THOR.RUNE", "from_e8": 10000,
                 "to_asset": "BTC.BTC", "to_e8": 990, "pool": "BTC.BTC"},
                {"type": "rewards", "bond_e8": 5, "per_pool": ["7 THOR.RUNE"]}
            ]
        }"#;
        let block: Block = serde_json::from_str(json).unwrap();
        assert_eq!(block.meta.height, 42);
        assert_eq!(block.meta.hash, vec![0xbe, 0xef]);
        assert_eq!(block.events.len(), 2);
        assert_eq!(block.events[0].kind(), "swap");
        assert_eq!(block.events[0].tx_id(), Some("A1"));
        match &block.events[1] {
            Event::Rewards(r) => assert_eq!(r.per_pool, vec![Coin::new("THOR.RUNE", 7)]),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
