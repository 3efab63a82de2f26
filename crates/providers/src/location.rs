//! Selection of a block source backend from a location string.

use crate::{AlloyBlockSource, Block, BlockSource, BlockSourceError, Connector, LocalBlockSource};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use async_trait::async_trait;
use std::{fmt, path::PathBuf, str::FromStr};

/// Where blocks are read from.
///
/// Locations starting with `http://` or `https://` are JSON-RPC endpoints. Anything else is
/// the path of a local block store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSourceLocation {
    /// A JSON-RPC endpoint.
    Rpc(reqwest::Url),
    /// A local block store directory.
    Local(PathBuf),
}

impl FromStr for BlockSourceLocation {
    type Err = BlockSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BlockSourceError::InvalidLocation("empty location".to_string()));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = s
                .parse::<reqwest::Url>()
                .map_err(|e| BlockSourceError::InvalidLocation(format!("{s}: {e}")))?;
            return Ok(Self::Rpc(url));
        }
        Ok(Self::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for BlockSourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[async_trait]
impl Connector for BlockSourceLocation {
    type Source = AnyBlockSource;

    async fn connect(&self) -> Result<Self::Source, BlockSourceError> {
        match self {
            Self::Rpc(url) => Ok(AnyBlockSource::Rpc(AlloyBlockSource::new_http(url.clone()))),
            Self::Local(path) => LocalBlockSource::open(path).map(AnyBlockSource::Local),
        }
    }
}

/// A [BlockSource] backed by either of the available backends.
#[derive(Debug)]
pub enum AnyBlockSource {
    /// A JSON-RPC backend.
    Rpc(AlloyBlockSource),
    /// A local store backend.
    Local(LocalBlockSource),
}

#[async_trait]
impl BlockSource for AnyBlockSource {
    async fn block_by_number(
        &mut self,
        number: BlockNumberOrTag,
    ) -> Result<Block, BlockSourceError> {
        match self {
            Self::Rpc(source) => source.block_by_number(number).await,
            Self::Local(source) => source.block_by_number(number).await,
        }
    }

    async fn block_by_hash(&mut self, hash: B256) -> Result<Block, BlockSourceError> {
        match self {
            Self::Rpc(source) => source.block_by_hash(hash).await,
            Self::Local(source) => source.block_by_hash(hash).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Rpc(source) => source.close().await,
            Self::Local(source) => source.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::raw_empty_block, LocalBlockStore};

    #[test]
    fn test_parse_location() {
        let rpc = "https://mainnet.optimism.io".parse::<BlockSourceLocation>().unwrap();
        assert!(matches!(rpc, BlockSourceLocation::Rpc(_)));

        let local = "./data/blocks".parse::<BlockSourceLocation>().unwrap();
        assert_eq!(local, BlockSourceLocation::Local(PathBuf::from("./data/blocks")));
        assert_eq!(local.to_string(), "./data/blocks");

        assert!(matches!(
            "".parse::<BlockSourceLocation>(),
            Err(BlockSourceError::InvalidLocation(_))
        ));
        assert!(matches!(
            "http://".parse::<BlockSourceLocation>(),
            Err(BlockSourceError::InvalidLocation(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_local_store() {
        let dir = tempfile::tempdir().unwrap();
        LocalBlockStore::open(dir.path()).unwrap().insert_raw(&raw_empty_block(3)).unwrap();

        let location = BlockSourceLocation::Local(dir.path().to_path_buf());
        let mut first = location.connect().await.unwrap();
        let mut second = location.connect().await.unwrap();
        assert!(matches!(first, AnyBlockSource::Local(_)));

        first.close().await;
        let block = second.block_by_number(BlockNumberOrTag::Number(3)).await.unwrap();
        assert_eq!(block.number, 3);
    }

    #[tokio::test]
    async fn test_connect_rpc_is_lazy() {
        let location = "http://127.0.0.1:1".parse::<BlockSourceLocation>().unwrap();
        let source = location.connect().await.unwrap();
        assert!(matches!(source, AnyBlockSource::Rpc(_)));
    }
}
