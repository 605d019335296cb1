//! Block processing pipeline.
//!
//! - `BlockWriter`: receives blocks, drives the cycle below, commits
//! - `EventRecorder`: persists each event and applies it to the totals
//! - `DepthRecorder`: turns committed totals into depth-change rows

pub mod block_writer;
pub mod depth_recorder;
pub mod recorder;

pub use block_writer::{BlockError, BlockOutcome, BlockWriter, WriterState};
pub use depth_recorder::DepthRecorder;
pub use recorder::EventRecorder;
