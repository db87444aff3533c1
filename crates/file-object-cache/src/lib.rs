//! Disk-backed cache for serializable values, one file per key
//!
//! Values are bincode-encoded and written as flat files under a configured
//! root directory. All operations on a cache instance are serialized behind
//! a single lock, so concurrent callers never interleave disk work.

mod cache;
mod error;

pub use cache::{ObjectCache, DEFAULT_TTL};
pub use error::{CacheError, Result};
