#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod macros;

#[cfg(feature = "metrics")]
pub mod metrics;

mod errors;
pub use errors::{PipelineError, TransactionError};

pub mod config;
pub use config::{ArrivalOrder, PipelineConfig, StartBlock};

pub mod retry;
pub use retry::RetryPolicy;

pub mod coordinator;

pub mod fetcher;
pub use fetcher::{FetchOutcome, Fetcher};

pub mod order;
pub use order::ReorderBuffer;

pub mod transaction;
pub use transaction::TxKind;

pub mod estimator;
pub use estimator::{Estimator, EstimatorStats};

pub mod record;
pub use record::{EstimationResult, RecordReader, RECORD_LEN};

pub mod writer;
pub use writer::{ResultWriter, WriterStats};

mod pipeline;
pub use pipeline::{Pipeline, PipelineSummary};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
