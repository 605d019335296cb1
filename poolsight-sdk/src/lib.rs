//! Shared types for poolsight.
//!
//! Asset notation helpers used by the indexer engine, plus the JSON objects
//! returned by the poolsight HTTP API.

pub mod objects;
