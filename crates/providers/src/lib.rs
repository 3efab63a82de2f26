#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod block;
pub use block::Block;

mod errors;
pub use errors::BlockSourceError;

mod traits;
pub use traits::{BlockSource, Connector};

mod rpc;
pub use rpc::AlloyBlockSource;

mod local;
pub use local::{LocalBlockSource, LocalBlockStore};

mod location;
pub use location::{AnyBlockSource, BlockSourceLocation};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
