//! Errors for the block sources.

use alloy_eips::BlockNumberOrTag;
use thiserror::Error;

/// An error returned by a [crate::BlockSource].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockSourceError {
    /// The request could not be completed by the transport.
    #[error("transport error: {0}")]
    Transport(String),
    /// The requested block is not known to the source.
    #[error("block not found: {0}")]
    NotFound(String),
    /// The block was retrieved but could not be decoded.
    #[error("failed to decode block {0}: {1}")]
    Decode(String, String),
    /// The block tag cannot be resolved by this source.
    #[error("unsupported block tag: {0}")]
    UnsupportedTag(BlockNumberOrTag),
    /// The local store failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The source was closed.
    #[error("block source is closed")]
    Closed,
    /// The block source location could not be parsed.
    #[error("invalid block source location: {0}")]
    InvalidLocation(String),
}

impl From<rocksdb::Error> for BlockSourceError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.into_string())
    }
}
