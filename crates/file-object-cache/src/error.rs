//! Error types for the file object cache

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cached entry for key '{0}'")]
    NotFound(String),

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode value: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode value for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: bincode::Error,
    },

    #[error("cache clear aborted after removing {removed} entries: {source}")]
    PartialClear {
        removed: usize,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CacheError>;
