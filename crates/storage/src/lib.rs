//! Storage layer for the table batch engine
//!
//! This crate provides:
//! - MetadataStore: the persistence trait the executor consumes
//! - StagedWrite: mutations staged by a change-set, applied at commit
//! - ShardedStore: DashMap-backed in-memory store with atomic per-partition commits
//! - MonotonicClock: strictly increasing timestamps for ETag minting

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;
pub mod traits;

pub use sharded::{MonotonicClock, Shard, ShardedStore};
pub use traits::{MetadataStore, StagedWrite};
