//! A [BlockSource] that reads blocks from a local [rocksdb] store.
//!
//! Store layout:
//!
//! | Key                                        | Value                                  |
//! |--------------------------------------------|----------------------------------------|
//! | `b` ++ block number (8 bytes, big-endian)  | RLP encoded block                      |
//! | `h` ++ block hash (32 bytes)               | block number (8 bytes, big-endian)     |
//! | `LastBlock`                                | highest block number stored (8 bytes)  |

use crate::{Block, BlockSource, BlockSourceError};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, trace};

const BLOCK_PREFIX: u8 = b'b';
const HASH_PREFIX: u8 = b'h';
const HEAD_KEY: &[u8] = b"LastBlock";

fn block_key(number: u64) -> [u8; 9] {
    let mut key = [BLOCK_PREFIX; 9];
    key[1..].copy_from_slice(&number.to_be_bytes());
    key
}

fn hash_key(hash: B256) -> [u8; 33] {
    let mut key = [HASH_PREFIX; 33];
    key[1..].copy_from_slice(hash.as_slice());
    key
}

fn decode_number(id: &str, value: &[u8]) -> Result<u64, BlockSourceError> {
    <[u8; 8]>::try_from(value).map(u64::from_be_bytes).map_err(|_| {
        BlockSourceError::Decode(id.to_string(), format!("invalid block number of {} bytes", value.len()))
    })
}

/// Reads the head pointer of the store, if any block was stored.
fn read_head(db: &DB) -> Result<Option<u64>, BlockSourceError> {
    db.get_pinned(HEAD_KEY)?.map(|value| decode_number("head", &value)).transpose()
}

fn read_block(db: &DB, number: u64) -> Result<Block, BlockSourceError> {
    trace!(target: "local", "Reading block {number}");
    let raw = db
        .get_pinned(block_key(number))?
        .ok_or_else(|| BlockSourceError::NotFound(number.to_string()))?;
    Block::decode_raw(&raw).map_err(|e| BlockSourceError::Decode(number.to_string(), e.to_string()))
}

/// A read-only [BlockSource] over a local block store.
///
/// Reads and block decoding run on tokio's blocking pool, so fetchers sharing a runtime do not
/// stall each other on disk access.
#[derive(Debug)]
pub struct LocalBlockSource {
    /// The store location.
    path: PathBuf,
    /// The open database, or [None] once closed.
    db: Option<Arc<DB>>,
}

impl LocalBlockSource {
    /// Opens the store at `path` in read-only mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockSourceError> {
        let path = path.as_ref().to_path_buf();
        let db = DB::open_for_read_only(&Options::default(), &path, false)?;
        debug!(target: "local", "Opened block store at {}", path.display());
        Ok(Self { path, db: Some(Arc::new(db)) })
    }

    /// Runs `read` against the store on the blocking pool.
    async fn read<T, F>(&self, read: F) -> Result<T, BlockSourceError>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T, BlockSourceError> + Send + 'static,
    {
        let db = self.db.clone().ok_or(BlockSourceError::Closed)?;
        tokio::task::spawn_blocking(move || read(&db))
            .await
            .map_err(|e| BlockSourceError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl BlockSource for LocalBlockSource {
    async fn block_by_number(
        &mut self,
        number: BlockNumberOrTag,
    ) -> Result<Block, BlockSourceError> {
        let number = match number {
            BlockNumberOrTag::Number(n) => Some(n),
            BlockNumberOrTag::Latest => None,
            tag => return Err(BlockSourceError::UnsupportedTag(tag)),
        };
        self.read(move |db| {
            let number = match number {
                Some(n) => n,
                None => {
                    read_head(db)?.ok_or_else(|| BlockSourceError::NotFound("latest".to_string()))?
                }
            };
            read_block(db, number)
        })
        .await
    }

    async fn block_by_hash(&mut self, hash: B256) -> Result<Block, BlockSourceError> {
        self.read(move |db| {
            let id = hash.to_string();
            let value = db
                .get_pinned(hash_key(hash))?
                .ok_or_else(|| BlockSourceError::NotFound(id.clone()))?;
            let number = decode_number(&id, &value)?;
            read_block(db, number)
        })
        .await
    }

    async fn close(&mut self) {
        if self.db.take().is_some() {
            debug!(target: "local", "Closed block store at {}", self.path.display());
        }
    }
}

/// A writable local block store, used to populate stores read by [LocalBlockSource].
#[derive(Debug)]
pub struct LocalBlockStore {
    db: DB,
}

impl LocalBlockStore {
    /// Opens the store at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockSourceError> {
        let db = DB::open(&Self::db_options(), path.as_ref())?;
        Ok(Self { db })
    }

    fn db_options() -> Options {
        let mut options = Options::default();
        options.set_compression_type(rocksdb::DBCompressionType::Snappy);
        options.create_if_missing(true);
        options
    }

    /// Decodes and stores a raw RLP encoded block, indexing it by number and hash. The head
    /// pointer only moves forward.
    pub fn insert_raw(&self, raw: &[u8]) -> Result<Block, BlockSourceError> {
        let block = Block::decode_raw(raw)
            .map_err(|e| BlockSourceError::Decode("raw".to_string(), e.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.put(block_key(block.number), raw);
        batch.put(hash_key(block.hash), block.number.to_be_bytes());
        if self.head()?.map_or(true, |head| block.number > head) {
            batch.put(HEAD_KEY, block.number.to_be_bytes());
        }
        self.db.write(batch)?;

        trace!(target: "local", "Stored block {} ({})", block.number, block.hash);
        Ok(block)
    }

    /// Returns the highest block number stored.
    pub fn head(&self) -> Result<Option<u64>, BlockSourceError> {
        read_head(&self.db)
    }
}
