#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod errors;
pub use errors::CompressionError;

mod fastlz;
pub use fastlz::flz_compress_len;

mod zlib;
pub use zlib::ZlibBatchEstimator;
