//! Block channel factory.
//!
//! The block source and the block writer are connected by a single bounded
//! channel. Blocks must arrive in height order, so there is exactly one
//! receiver and it is owned by the writer.

use super::types::Block;
use tokio::sync::mpsc;

/// Default buffer size for the block channel.
///
/// Large enough to absorb fetch bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for blocks.
pub type BlockSender = mpsc::Sender<Block>;
/// Receiver handle for blocks.
pub type BlockReceiver = mpsc::Receiver<Block>;

/// Create a new block channel.
pub fn block_channel() -> (BlockSender, BlockReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
