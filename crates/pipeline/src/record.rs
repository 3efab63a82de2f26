//! The binary output record.
//!
//! Every record is five little-endian `u32` fields with no framing:
//!
//! ```text
//! <u32 block_number><u32 best><u32 fastlz><u32 zeroes><u32 non_zeroes>
//! ```

use std::io::{self, Read};

/// The encoded length of an [EstimationResult].
pub const RECORD_LEN: usize = 20;

/// The estimates for a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimationResult {
    /// The block holding the transaction, truncated to 32 bits.
    pub block_number: u32,
    /// The marginal size added to the zlib window.
    pub best: u32,
    /// The FastLZ level 1 compressed length.
    pub fastlz: u32,
    /// The number of zero bytes in the payload.
    pub zeroes: u32,
    /// The number of non-zero bytes in the payload.
    pub non_zeroes: u32,
}

impl EstimationResult {
    /// Returns the length of the estimated payload.
    pub const fn payload_len(&self) -> u64 {
        self.zeroes as u64 + self.non_zeroes as u64
    }

    /// Encodes the record.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let fields = [self.block_number, self.best, self.fastlz, self.zeroes, self.non_zeroes];
        for (chunk, field) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decodes a record.
    pub fn decode(bytes: &[u8; RECORD_LEN]) -> Self {
        let field = |i: usize| {
            u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        Self {
            block_number: field(0),
            best: field(1),
            fastlz: field(2),
            zeroes: field(3),
            non_zeroes: field(4),
        }
    }
}

/// Iterates the records of an output stream.
///
/// A stream that ends in the middle of a record yields an [io::ErrorKind::UnexpectedEof] error.
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    /// Creates a new [RecordReader].
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_record(&mut self) -> io::Result<Option<EstimationResult>> {
        let mut buf = [0u8; RECORD_LEN];
        let mut filled = 0;
        while filled < RECORD_LEN {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_LEN => Ok(Some(EstimationResult::decode(&buf))),
            partial => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated record of {partial} bytes"),
            )),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<EstimationResult>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}
