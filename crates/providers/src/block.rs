//! The block data model handed from the block sources to the pipeline.

use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Decodable;
use op_alloy_consensus::OpTxEnvelope;

/// An OP stack block as encoded by `debug_getRawBlock`.
type OpBlock = alloy_consensus::Block<OpTxEnvelope>;

/// A fetched block, reduced to what compression accounting needs.
///
/// Every transaction is held as its canonical EIP-2718 envelope encoding: the bare RLP list for
/// legacy transactions and the type byte followed by the RLP payload for typed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The encoded transactions, in block order.
    pub transactions: Vec<Bytes>,
}

impl Block {
    /// Decodes a raw RLP encoded OP stack block, as returned by `debug_getRawBlock`.
    pub fn decode_raw(mut raw: &[u8]) -> Result<Self, alloy_rlp::Error> {
        OpBlock::decode(&mut raw).map(Self::from)
    }
}

impl From<OpBlock> for Block {
    fn from(block: OpBlock) -> Self {
        Self {
            number: block.header.number,
            hash: block.header.hash_slow(),
            transactions: block
                .body
                .transactions
                .iter()
                .map(|tx| Bytes::from(tx.encoded_2718()))
                .collect(),
        }
    }
}
