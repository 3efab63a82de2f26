//! Error types for the compression estimators.

use miniz_oxide::MZError;

/// An error raised by the underlying compression engine.
///
/// A failed write leaves the estimator window in an undefined state, so callers should treat
/// these errors as fatal for the estimator that produced them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompressionError {
    /// The DEFLATE stream rejected the write.
    #[error("deflate stream error: {0:?}")]
    Stream(MZError),
    /// The DEFLATE stream stopped making progress with input left to compress.
    #[error("deflate stream stalled with {pending} bytes pending")]
    Stalled {
        /// Bytes of the write that were not consumed.
        pending: usize,
    },
}
