//! A [BlockSource] that fetches raw blocks over Ethereum JSON-RPC.

use crate::{Block, BlockSource, BlockSourceError};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Bytes, B256, U64};
use alloy_provider::{Provider, ReqwestProvider};
use async_trait::async_trait;
use tracing::{debug, trace};

/// The [AlloyBlockSource] is a concrete implementation of the [BlockSource] trait, providing
/// blocks over Ethereum JSON-RPC using an alloy provider as the backend.
///
/// **Note**:
/// This source fetches blocks using the `debug_getRawBlock` method. The RPC must support this
/// namespace.
#[derive(Debug, Clone)]
pub struct AlloyBlockSource {
    /// The inner Ethereum JSON-RPC provider.
    inner: ReqwestProvider,
    /// Whether [BlockSource::close] was called.
    closed: bool,
}

impl AlloyBlockSource {
    /// Creates a new [AlloyBlockSource] with the given alloy provider.
    pub const fn new(inner: ReqwestProvider) -> Self {
        Self { inner, closed: false }
    }

    /// Creates a new [AlloyBlockSource] from the provided [reqwest::Url].
    pub fn new_http(url: reqwest::Url) -> Self {
        let inner = ReqwestProvider::new_http(url);
        Self::new(inner)
    }

    /// Returns the latest block number.
    pub async fn latest_block_number(&self) -> Result<u64, BlockSourceError> {
        self.ensure_open()?;
        self.inner.get_block_number().await.map_err(|e| BlockSourceError::Transport(e.to_string()))
    }

    /// Returns the raw RLP encoding of the block with the given number.
    pub async fn raw_block_by_number(&self, number: u64) -> Result<Bytes, BlockSourceError> {
        self.ensure_open()?;
        trace!(target: "rpc", "Fetching raw block {number}");
        self.inner
            .raw_request("debug_getRawBlock".into(), [U64::from(number)])
            .await
            .map_err(|e| BlockSourceError::Transport(e.to_string()))
    }

    /// Returns the raw RLP encoding of the block with the given hash.
    pub async fn raw_block_by_hash(&self, hash: B256) -> Result<Bytes, BlockSourceError> {
        self.ensure_open()?;
        trace!(target: "rpc", "Fetching raw block {hash}");
        self.inner
            .raw_request("debug_getRawBlock".into(), [hash])
            .await
            .map_err(|e| BlockSourceError::Transport(e.to_string()))
    }

    const fn ensure_open(&self) -> Result<(), BlockSourceError> {
        if self.closed {
            return Err(BlockSourceError::Closed);
        }
        Ok(())
    }
}

/// Decodes a raw block, reporting failures against `id`.
fn decode(id: String, raw: Bytes) -> Result<Block, BlockSourceError> {
    // Some nodes answer unknown blocks with an empty payload instead of an error.
    if raw.is_empty() {
        return Err(BlockSourceError::NotFound(id));
    }
    Block::decode_raw(raw.as_ref()).map_err(|e| BlockSourceError::Decode(id, e.to_string()))
}

#[async_trait]
impl BlockSource for AlloyBlockSource {
    async fn block_by_number(
        &mut self,
        number: BlockNumberOrTag,
    ) -> Result<Block, BlockSourceError> {
        let number = match number {
            BlockNumberOrTag::Number(n) => n,
            BlockNumberOrTag::Latest => {
                let head = self.latest_block_number().await?;
                debug!(target: "rpc", "Resolved latest block to {head}");
                head
            }
            tag => return Err(BlockSourceError::UnsupportedTag(tag)),
        };
        let raw = self.raw_block_by_number(number).await?;
        decode(number.to_string(), raw)
    }

    async fn block_by_hash(&mut self, hash: B256) -> Result<Block, BlockSourceError> {
        let raw = self.raw_block_by_hash(hash).await?;
        decode(hash.to_string(), raw)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
