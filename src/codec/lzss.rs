//! LZSS variant used for packed entries.
//!
//! Stream layout: groups of up to eight items, each group led by a flag
//! byte read LSB first. A set bit is a literal byte; a clear bit is a
//! two-byte back reference:
//!
//! ```text
//! b1 = distance & 0xFF
//! b2 = ((distance >> 4) & 0xF0) | (length - 3)
//! ```
//!
//! Distances reaching before the start of the output produce spaces. The
//! payload is followed by a little-endian `u32` holding the wrapping sum of
//! all decoded bytes.

use std::io;

use crate::{Error, Result};

/// Largest back-reference distance.
pub const WINDOW_SIZE: usize = 4095;

/// Shortest back reference.
pub const MIN_MATCH: usize = 3;

/// Longest back reference.
pub const MAX_MATCH: usize = 18;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 4;

const HASH_BITS: u32 = 12;
const MAX_CHAIN: usize = 64;
const NO_POS: usize = usize::MAX;

/// Wrapping byte sum stored after the payload.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(byte as u32))
}

fn truncated(subject: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("packed data for '{}' is truncated", subject),
    ))
}

/// Decodes a packed entry.
///
/// `subject` names the entry in error messages.
///
/// # Errors
///
/// Fails on truncated input, a back reference of distance zero, or a
/// checksum mismatch.
pub fn decompress(packed: &[u8], original_size: u64, subject: &str) -> Result<Vec<u8>> {
    let expected = usize::try_from(original_size).map_err(|_| truncated(subject))?;
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0usize;

    while out.len() < expected {
        let flags = *packed.get(pos).ok_or_else(|| truncated(subject))?;
        pos += 1;

        for bit in 0..8 {
            if out.len() >= expected {
                break;
            }
            if flags & (1 << bit) != 0 {
                out.push(*packed.get(pos).ok_or_else(|| truncated(subject))?);
                pos += 1;
                continue;
            }

            let pair = packed.get(pos..pos + 2).ok_or_else(|| truncated(subject))?;
            pos += 2;
            let distance = pair[0] as usize | ((pair[1] as usize & 0xF0) << 4);
            let length = (pair[1] as usize & 0x0F) + MIN_MATCH;
            if distance == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("packed data for '{}' has a zero-distance reference", subject),
                )));
            }

            let length = length.min(expected - out.len());
            for _ in 0..length {
                let byte = match out.len().checked_sub(distance) {
                    Some(from) => out[from],
                    None => b' ',
                };
                out.push(byte);
            }
        }
    }

    let stored = packed
        .get(pos..pos + CHECKSUM_SIZE)
        .ok_or_else(|| truncated(subject))?;
    let expected_sum = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual_sum = checksum(&out);
    if expected_sum != actual_sum {
        return Err(Error::ChecksumMismatch {
            subject: subject.to_string(),
            expected: expected_sum as u64,
            actual: actual_sum as u64,
        });
    }

    Ok(out)
}

fn hash(data: &[u8], pos: usize) -> usize {
    let v = (data[pos] as u32) << 16 | (data[pos + 1] as u32) << 8 | data[pos + 2] as u32;
    (v.wrapping_mul(2_654_435_761) >> (32 - HASH_BITS)) as usize
}

struct MatchFinder<'a> {
    data: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl<'a> MatchFinder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            head: vec![NO_POS; 1 << HASH_BITS],
            prev: vec![NO_POS; data.len()],
        }
    }

    fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH <= self.data.len() {
            let h = hash(self.data, pos);
            self.prev[pos] = self.head[h];
            self.head[h] = pos;
        }
    }

    /// Longest match for `pos` as (length, distance).
    fn longest(&self, pos: usize) -> (usize, usize) {
        let data = self.data;
        if pos + MIN_MATCH > data.len() {
            return (0, 0);
        }
        let limit = MAX_MATCH.min(data.len() - pos);
        let mut best = (0, 0);
        let mut candidate = self.head[hash(data, pos)];
        let mut chain = 0;

        while candidate != NO_POS && chain < MAX_CHAIN {
            let distance = pos - candidate;
            if distance > WINDOW_SIZE {
                break;
            }
            let length = (0..limit)
                .take_while(|&i| data[candidate + i] == data[pos + i])
                .count();
            if length > best.0 {
                best = (length, distance);
                if length == limit {
                    break;
                }
            }
            candidate = self.prev[candidate];
            chain += 1;
        }
        best
    }
}

/// Packs `data`, appending the checksum.
///
/// Greedy parse over a hash chain; the output always decodes with
/// [`decompress`] but may be larger than the input for incompressible data.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1 + CHECKSUM_SIZE);
    let mut finder = MatchFinder::new(data);
    let mut flag_index = 0;
    let mut bit = 8;
    let mut pos = 0;

    while pos < data.len() {
        if bit == 8 {
            flag_index = out.len();
            out.push(0);
            bit = 0;
        }

        let (length, distance) = finder.longest(pos);
        if length >= MIN_MATCH {
            out.push((distance & 0xFF) as u8);
            out.push((((distance >> 4) & 0xF0) as u8) | (length - MIN_MATCH) as u8);
            for p in pos..pos + length {
                finder.insert(p);
            }
            pos += length;
        } else {
            out[flag_index] |= 1 << bit;
            out.push(data[pos]);
            finder.insert(pos);
            pos += 1;
        }
        bit += 1;
    }

    out.extend_from_slice(&checksum(data).to_le_bytes());
    out
}
