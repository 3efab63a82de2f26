//! Classification and normalization of encoded transactions.
//!
//! Transactions arrive as EIP-2718 envelopes: legacy transactions are a bare RLP list, typed
//! transactions start with their type byte.

use crate::TransactionError;

/// The type byte of OP stack deposit transactions.
pub const DEPOSIT_TX_TYPE: u8 = 0x7e;

/// Length of the signature suffix removed when signature trimming is enabled.
pub const SIGNATURE_LEN: usize = 68;

/// Largest type byte of a typed transaction envelope.
const MAX_TX_TYPE: u8 = 0x7f;

/// Smallest RLP list prefix, which starts every legacy transaction.
const RLP_LIST_PREFIX: u8 = 0xc0;

/// The kind of an encoded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// A legacy transaction.
    Legacy,
    /// A typed transaction with the given type byte.
    Typed(u8),
    /// A deposit transaction, which is never paid for by users.
    Deposit,
}

impl TxKind {
    /// Returns true for deposit transactions.
    pub const fn is_deposit(&self) -> bool {
        matches!(self, Self::Deposit)
    }
}

/// Classifies an encoded transaction by its leading byte.
pub const fn classify(payload: &[u8]) -> Result<TxKind, TransactionError> {
    match payload.first() {
        None => Err(TransactionError::Empty),
        Some(&DEPOSIT_TX_TYPE) => Ok(TxKind::Deposit),
        Some(&ty) if ty <= MAX_TX_TYPE => Ok(TxKind::Typed(ty)),
        Some(&prefix) if prefix >= RLP_LIST_PREFIX => Ok(TxKind::Legacy),
        Some(&prefix) => Err(TransactionError::InvalidPrefix(prefix)),
    }
}

/// Removes the signature suffix from `payload`. Payloads shorter than the suffix are returned
/// unchanged.
pub fn trim_signature(payload: &[u8]) -> &[u8] {
    payload.len().checked_sub(SIGNATURE_LEN).map_or(payload, |len| &payload[..len])
}
