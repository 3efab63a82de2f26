//! Exact FastLZ level 1 output length.
//!
//! [flz_compress_len] walks the input exactly like the level 1 encoder does, but only counts the
//! bytes each literal run and match instruction would occupy. The hash table is local to every
//! call, so no history is carried from one payload to the next.

/// Number of slots in the 3-byte fingerprint table.
const HASH_TABLE_SIZE: usize = 1 << 13;

/// Maximum backward distance a level 1 match may reference.
const MAX_DISTANCE: usize = 0x1fff;

/// Bytes at the end of the input that the match finder never scans.
const INPUT_MARGIN: usize = 13;

/// Longest literal run encoded behind a single control byte.
const MAX_LITERAL_RUN: usize = 32;

/// Longest match encoded by a single match instruction.
const MAX_MATCH_RUN: usize = 262;

/// Match lengths (minus one) below this threshold fit the short 2-byte instruction.
const SHORT_MATCH_LIMIT: usize = 6;

/// Returns the number of bytes FastLZ level 1 would emit when compressing `input`.
///
/// Inputs shorter than 13 bytes are always emitted as literals.
///
/// ```
/// use dacost_compression::flz_compress_len;
///
/// assert_eq!(flz_compress_len(b"hello"), 6);
/// assert!(flz_compress_len(&[0u8; 1000]) < 32);
/// ```
pub fn flz_compress_len(input: &[u8]) -> u32 {
    let mut table = [0usize; HASH_TABLE_SIZE];
    let ip_limit = input.len().saturating_sub(INPUT_MARGIN);

    let mut cost = 0usize;
    let mut anchor = 0usize;
    let mut ip = 2usize;

    while ip < ip_limit {
        let mut reference;
        loop {
            let seq = read_u24(input, ip);
            let slot = hash(seq);
            reference = table[slot];
            table[slot] = ip;
            let distance = ip.wrapping_sub(reference);
            if ip >= ip_limit {
                break;
            }
            ip += 1;
            if distance <= MAX_DISTANCE && seq == read_u24(input, reference) {
                break;
            }
        }
        if ip >= ip_limit {
            break;
        }

        ip -= 1;
        if ip > anchor {
            cost += literal_cost(ip - anchor);
        }

        let len = match_len(input, reference + 3, ip + 3, ip_limit + 9);
        cost += match_cost(len);

        // The encoder re-seeds the table with the two positions at the end of the match.
        ip += len;
        table[hash(read_u24(input, ip))] = ip;
        ip += 1;
        table[hash(read_u24(input, ip))] = ip;
        ip += 1;
        anchor = ip;
    }

    cost += literal_cost(input.len() - anchor);
    u32::try_from(cost).unwrap_or(u32::MAX)
}

/// Reads the little-endian 24-bit value starting at `i`.
#[inline]
fn read_u24(input: &[u8], i: usize) -> u32 {
    u32::from(input[i]) | (u32::from(input[i + 1]) << 8) | (u32::from(input[i + 2]) << 16)
}

/// Fibonacci hash of a 3-byte sequence into the fingerprint table.
#[inline]
const fn hash(seq: u32) -> usize {
    (seq.wrapping_mul(2_654_435_769) >> 19) as usize & (HASH_TABLE_SIZE - 1)
}

/// Length of the run starting at `q` that repeats the bytes at `p`, bounded by `end`.
///
/// The first mismatching byte is included in the count, as the encoder does.
#[inline]
fn match_len(input: &[u8], p: usize, q: usize, end: usize) -> usize {
    input[q..end]
        .iter()
        .zip(&input[p..])
        .position(|(a, b)| a != b)
        .map_or(end - q, |mismatch| mismatch + 1)
}

/// Bytes occupied by a literal run of `len` bytes.
#[inline]
const fn literal_cost(len: usize) -> usize {
    let remainder = len % MAX_LITERAL_RUN;
    let full = (MAX_LITERAL_RUN + 1) * (len / MAX_LITERAL_RUN);
    if remainder == 0 {
        full
    } else {
        full + remainder + 1
    }
}

/// Bytes occupied by the match instructions covering a match of `len`.
#[inline]
const fn match_cost(len: usize) -> usize {
    let len = len - 1;
    let full = 3 * (len / MAX_MATCH_RUN);
    if len % MAX_MATCH_RUN >= SHORT_MATCH_LIMIT {
        full + 3
    } else {
        full + 2
    }
}
