//! Error types for the pipeline.

use dacost_compression::CompressionError;
use dacost_providers::BlockSourceError;
use thiserror::Error;

/// An error that terminates a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration cannot describe a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A block source could not be opened.
    #[error("failed to connect to the block source: {0}")]
    Connect(BlockSourceError),
    /// The starting block could not be resolved.
    #[error("failed to resolve the starting block: {0}")]
    StartBlock(BlockSourceError),
    /// The compression engine failed, leaving the estimator state undefined.
    #[error("compression engine failure: {0}")]
    Compression(#[from] CompressionError),
    /// The output could not be opened.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
    /// A pipeline task panicked or was aborted.
    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// An encoded transaction that cannot be classified.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionError {
    /// The payload is empty.
    #[error("empty transaction payload")]
    Empty,
    /// The leading byte is neither a transaction type nor an RLP list prefix.
    #[error("invalid envelope prefix {0:#04x}")]
    InvalidPrefix(u8),
}
