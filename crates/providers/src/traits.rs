//! The block source capability.

use crate::{Block, BlockSourceError};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use async_trait::async_trait;

/// Describes the functionality of a source of full blocks.
///
/// The pipeline depends on this trait only. Implementations are either remote (JSON-RPC) or a
/// local read-only store.
#[async_trait]
pub trait BlockSource: Send {
    /// Fetches the block with the given number, with all of its transactions.
    /// [BlockNumberOrTag::Latest] resolves to the current head of the source.
    async fn block_by_number(&mut self, number: BlockNumberOrTag)
        -> Result<Block, BlockSourceError>;

    /// Fetches the block with the given hash, with all of its transactions.
    async fn block_by_hash(&mut self, hash: B256) -> Result<Block, BlockSourceError>;

    /// Releases the underlying connection. Later calls return [BlockSourceError::Closed].
    async fn close(&mut self);
}

/// Opens independent [BlockSource]s.
///
/// Every call to [Connector::connect] yields a source with its own connection, so parallel
/// fetchers never share one.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The source type produced by this connector.
    type Source: BlockSource + 'static;

    /// Opens a new block source.
    async fn connect(&self) -> Result<Self::Source, BlockSourceError>;
}
