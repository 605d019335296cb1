//! PostgreSQL queries, one query struct per statement.

pub mod block_log;
pub mod event_rows;
pub mod linked;
pub mod pool_depths;
