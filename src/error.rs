//! Error types.
//!
//! Only construction and view mutation can fail.  Every map operation on a
//! built [`LruCache`](crate::LruCache) is total.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("capacity must be greater than 0, got {0}")]
    InvalidCapacity(usize),

    #[error("shard count must be a non-zero power of two, got {0}")]
    InvalidShardCount(usize),

    #[error("touch buffer capacity must be greater than 0")]
    InvalidTouchBufferCapacity,

    #[error("compaction slack must be greater than 0")]
    InvalidCompactionSlack,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

pub type Result<T> = std::result::Result<T, CacheError>;
