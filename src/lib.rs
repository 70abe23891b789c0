//! A bounded, thread-safe least-recently-used map.
//!
//! [`LruCache`] holds at most `capacity` entries.  Inserting a new key into
//! a full cache evicts the entry that was used longest ago and hands it to an
//! optional [`EvictionListener`](listener::EvictionListener).  Reads only take
//! a per-shard read lock; growth and eviction are serialised by one small
//! maintenance lock.

mod builder;
mod cache;
mod error;
mod metrics;
mod recency;
mod store;
pub mod listener;
pub mod view;

pub use builder::CacheBuilder;
pub use cache::LruCache;
pub use error::{CacheError, Result};
pub use metrics::stats::Metrics;
