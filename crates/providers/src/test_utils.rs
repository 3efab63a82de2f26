//! Test utilities for the block sources.

use crate::{Block, BlockSource, BlockSourceError, Connector};
use alloy_consensus::{BlockBody, Header, SignableTransaction, TxEip1559, TxLegacy};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{
    keccak256, Address, Bytes, PrimitiveSignature, Sealable, TxKind, B256, U256,
};
use async_trait::async_trait;
use op_alloy_consensus::{OpTxEnvelope, TxDeposit};
use spin::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

/// Returns the raw RLP encoding of an OP stack block, as served by `debug_getRawBlock`.
pub fn raw_block(number: u64, transactions: Vec<OpTxEnvelope>) -> Vec<u8> {
    let block = alloy_consensus::Block {
        header: Header { number, ..Default::default() },
        body: BlockBody { transactions, ommers: Vec::new(), withdrawals: None },
    };
    alloy_rlp::encode(&block)
}

/// Returns the raw RLP encoding of a block with no transactions, ommers or withdrawals.
pub fn raw_empty_block(number: u64) -> Vec<u8> {
    raw_block(number, Vec::new())
}

/// Returns a deposit, a legacy and an EIP-1559 transaction, in that order.
pub fn sample_transactions() -> Vec<OpTxEnvelope> {
    let signature = PrimitiveSignature::new(U256::from(0xdead_beef_u64), U256::from(0xcafe_u64), false);

    let deposit = TxDeposit {
        source_hash: B256::repeat_byte(0x11),
        from: Address::repeat_byte(0x22),
        to: TxKind::Call(Address::repeat_byte(0x33)),
        mint: Some(1_000_000),
        value: U256::from(1_000_000),
        gas_limit: 100_000,
        is_system_transaction: false,
        input: Bytes::new(),
    };
    let legacy = TxLegacy {
        chain_id: Some(10),
        nonce: 7,
        gas_price: 1_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x44)),
        value: U256::from(12_345),
        input: Bytes::new(),
    };
    let eip1559 = TxEip1559 {
        chain_id: 10,
        nonce: 8,
        gas_limit: 60_000,
        max_fee_per_gas: 2_000_000,
        max_priority_fee_per_gas: 1_000,
        to: TxKind::Call(Address::repeat_byte(0x55)),
        input: Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb, 0, 0, 0, 0, 0, 0, 0, 1]),
        ..Default::default()
    };

    vec![
        OpTxEnvelope::Deposit(deposit.seal_slow()),
        OpTxEnvelope::Legacy(legacy.into_signed(signature)),
        OpTxEnvelope::Eip1559(eip1559.into_signed(signature)),
    ]
}

/// Builds a [Block] holding the given encoded transactions. The hash is derived from the number.
pub fn block_with_transactions(number: u64, transactions: Vec<Bytes>) -> Block {
    Block { number, hash: keccak256(number.to_be_bytes()), transactions }
}

#[derive(Debug, Default)]
struct MockState {
    blocks: BTreeMap<u64, Block>,
    failures: HashMap<u64, u32>,
    attempts: HashMap<u64, u32>,
    connections: usize,
}

/// A [Connector] over an in-memory chain with scripted failures.
///
/// All sources opened by one connector share the chain, failure scripts and attempt counters.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Creates a connector serving the given blocks.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let connector = Self::default();
        blocks.into_iter().for_each(|block| connector.insert_block(block));
        connector
    }

    /// Inserts a block into the chain.
    pub fn insert_block(&self, block: Block) {
        self.state.lock().blocks.insert(block.number, block);
    }

    /// Makes the next `times` fetches of block `number` fail with a transport error.
    pub fn fail_times(&self, number: u64, times: u32) {
        self.state.lock().failures.insert(number, times);
    }

    /// Returns how many times block `number` was requested.
    pub fn attempts(&self, number: u64) -> u32 {
        self.state.lock().attempts.get(&number).copied().unwrap_or_default()
    }

    /// Returns how many sources were opened.
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Source = MockBlockSource;

    async fn connect(&self) -> Result<Self::Source, BlockSourceError> {
        self.state.lock().connections += 1;
        Ok(MockBlockSource { state: Arc::clone(&self.state), closed: false })
    }
}

/// A [BlockSource] opened by a [MockConnector].
#[derive(Debug)]
pub struct MockBlockSource {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

#[async_trait]
impl BlockSource for MockBlockSource {
    async fn block_by_number(
        &mut self,
        number: BlockNumberOrTag,
    ) -> Result<Block, BlockSourceError> {
        if self.closed {
            return Err(BlockSourceError::Closed);
        }
        let mut state = self.state.lock();
        let number = match number {
            BlockNumberOrTag::Number(n) => n,
            BlockNumberOrTag::Latest => {
                return state
                    .blocks
                    .values()
                    .next_back()
                    .cloned()
                    .ok_or_else(|| BlockSourceError::NotFound("latest".to_string()));
            }
            tag => return Err(BlockSourceError::UnsupportedTag(tag)),
        };

        *state.attempts.entry(number).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(&number).filter(|r| **r > 0) {
            *remaining -= 1;
            return Err(BlockSourceError::Transport(format!("injected failure for block {number}")));
        }
        state.blocks.get(&number).cloned().ok_or_else(|| BlockSourceError::NotFound(number.to_string()))
    }

    async fn block_by_hash(&mut self, hash: B256) -> Result<Block, BlockSourceError> {
        if self.closed {
            return Err(BlockSourceError::Closed);
        }
        self.state
            .lock()
            .blocks
            .values()
            .find(|block| block.hash == hash)
            .cloned()
            .ok_or_else(|| BlockSourceError::NotFound(hash.to_string()))
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let connector = MockConnector::with_blocks([block_with_transactions(1, vec![])]);
        connector.fail_times(1, 2);

        let mut source = connector.connect().await.unwrap();
        for _ in 0..2 {
            let err = source.block_by_number(BlockNumberOrTag::Number(1)).await.unwrap_err();
            assert!(matches!(err, BlockSourceError::Transport(_)));
        }
        let block = source.block_by_number(BlockNumberOrTag::Number(1)).await.unwrap();
        assert_eq!(block.number, 1);
        assert_eq!(connector.attempts(1), 3);
    }

    #[tokio::test]
    async fn test_sources_share_state() {
        let connector = MockConnector::with_blocks([
            block_with_transactions(4, vec![]),
            block_with_transactions(9, vec![]),
        ]);
        let mut a = connector.connect().await.unwrap();
        let mut b = connector.connect().await.unwrap();
        assert_eq!(connector.connections(), 2);

        let latest = a.block_by_number(BlockNumberOrTag::Latest).await.unwrap();
        assert_eq!(latest.number, 9);
        let by_hash = b.block_by_hash(latest.hash).await.unwrap();
        assert_eq!(by_hash, latest);

        a.close().await;
        assert_eq!(
            a.block_by_number(BlockNumberOrTag::Number(4)).await.unwrap_err(),
            BlockSourceError::Closed
        );
        assert!(b.block_by_number(BlockNumberOrTag::Number(4)).await.is_ok());
    }

    #[test]
    fn test_raw_empty_block_decodes() {
        let block = Block::decode_raw(&raw_empty_block(42)).unwrap();
        assert_eq!(block.number, 42);
        assert!(block.transactions.is_empty());
    }
}
