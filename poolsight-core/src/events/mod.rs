//! Event model and the channel that carries blocks into the indexer.
//!
//! # Block Flow
//!
//! 1. A block source decodes blocks and sends them on the block channel
//! 2. `BlockWriter` records every event through the `EventRecorder`
//! 3. Linked outbounds and fees are resolved at the end of the block
//! 4. The block is committed and a new `BlockState` is published

pub mod channels;
pub mod types;

pub use channels::{BlockReceiver, BlockSender, DEFAULT_CHANNEL_BUFFER, block_channel};

pub use types::{
    Add, Block, BlockMeta, Bond, Errata, Event, Fee, Gas, NewNode, Outbound, Pool,
    PoolBalanceChange, Refund, Reserve, Rewards, SetMimir, SetVersion, Slash, Stake, Swap,
    Transfer, UpdateNodeAccountStatus, Withdraw,
};
