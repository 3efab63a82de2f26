//! A zlib batch compressor simulator over a bounded sliding window.

use crate::CompressionError;
use miniz_oxide::{
    deflate::{
        core::{create_comp_flags_from_zip_params, CompressionStrategy, CompressorOxide},
        stream::deflate,
        CompressionLevel,
    },
    MZFlush,
};

/// Size of the short window. Once the rolling session grows past it, writes are mirrored into
/// the short session.
const WINDOW_HALF: usize = 64 * 1024;

/// Size of the full window. Once the rolling session grows past it, the sessions rotate.
const WINDOW_FULL: usize = 128 * 1024;

/// Trailing bytes of every sync flush that do not belong to the written payload.
const FLUSH_MARKER_LEN: usize = 2;

/// zlib wrapper around a 32KB DEFLATE window.
const ZLIB_WINDOW_BITS: i32 = 15;

/// Output headroom reserved past the worst case DEFLATE expansion of a write.
const FLUSH_HEADROOM: usize = 64;

const SHORT: usize = 0;
const ROLLING: usize = 1;

/// A zlib stream at maximum compression together with everything it has emitted so far.
struct DeflateSession {
    compressor: Box<CompressorOxide>,
    output: Vec<u8>,
}

impl DeflateSession {
    fn new() -> Self {
        let flags = create_comp_flags_from_zip_params(
            CompressionLevel::BestCompression as i32,
            ZLIB_WINDOW_BITS,
            CompressionStrategy::Default as i32,
        );
        Self { compressor: Box::new(CompressorOxide::new(flags)), output: Vec::new() }
    }

    const fn len(&self) -> usize {
        self.output.len()
    }

    /// Compresses `input` into the session and sync-flushes, so every input byte is reflected
    /// in the output.
    fn write_flush(&mut self, mut input: &[u8]) -> Result<(), CompressionError> {
        loop {
            let start = self.output.len();
            let reserved = input.len() + input.len() / 8 + FLUSH_HEADROOM;
            self.output.resize(start + reserved, 0);

            let res = deflate(&mut self.compressor, input, &mut self.output[start..], MZFlush::Sync);
            self.output.truncate(start + res.bytes_written);
            res.status.map_err(CompressionError::Stream)?;

            input = &input[res.bytes_consumed..];
            if input.is_empty() && res.bytes_written < reserved {
                return Ok(());
            }
            if res.bytes_consumed == 0 && res.bytes_written == 0 {
                return Err(CompressionError::Stalled { pending: input.len() });
            }
        }
    }

    /// Drops the emitted output and starts a new stream.
    fn reset(&mut self) {
        self.compressor.reset();
        self.output.clear();
    }
}

impl core::fmt::Debug for DeflateSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeflateSession").field("len", &self.output.len()).finish()
    }
}

/// Simulates a zlib compressor at maximum compression working on large transaction batches.
///
/// Two sessions approximate a sliding window of 64–128KB of compressed history: the rolling
/// session receives every write, while the short session only starts receiving writes once the
/// rolling session has grown past 64KB. When the rolling session exceeds 128KB it is discarded
/// and the short session, which holds the most recent half of the window, takes its place.
///
/// The estimator is stateful and order dependent. It should be bootstrapped with a number of
/// representative payloads before its output is used.
#[derive(Debug)]
pub struct ZlibBatchEstimator {
    sessions: [DeflateSession; 2],
    rotations: u64,
}

impl Default for ZlibBatchEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibBatchEstimator {
    /// Creates a new [ZlibBatchEstimator] with empty windows.
    pub fn new() -> Self {
        Self { sessions: [DeflateSession::new(), DeflateSession::new()], rotations: 0 }
    }

    /// Compresses `payload` into the window and returns the number of compressed bytes it added.
    pub fn write(&mut self, payload: &[u8]) -> Result<u32, CompressionError> {
        let before = self.sessions[ROLLING].len();
        self.sessions[ROLLING].write_flush(payload)?;
        let after = self.sessions[ROLLING].len();

        if after > WINDOW_HALF {
            self.sessions[SHORT].write_flush(payload)?;
        }
        if after > WINDOW_FULL {
            self.sessions[ROLLING].reset();
            self.sessions.swap(SHORT, ROLLING);
            self.rotations += 1;
        }

        let delta = (after - before).saturating_sub(FLUSH_MARKER_LEN);
        Ok(u32::try_from(delta).unwrap_or(u32::MAX))
    }

    /// Length of the compressed output held by the rolling session.
    pub const fn rolling_len(&self) -> usize {
        self.sessions[ROLLING].len()
    }

    /// Length of the compressed output held by the short session.
    pub const fn short_len(&self) -> usize {
        self.sessions[SHORT].len()
    }

    /// Number of window rotations performed so far.
    pub const fn rotations(&self) -> u64 {
        self.rotations
    }
}
