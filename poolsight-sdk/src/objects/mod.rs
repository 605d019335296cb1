pub mod asset;
pub mod pool;
