//! Vendor error-detection sum over the payload bit-string.
//!
//! The payload is split into 8-bit groups starting at a protocol-defined
//! offset. Each group is bit-reversed and summed as an unsigned byte; the
//! expected checksum is the low 8 bits of that sum rendered as a binary
//! string and then character-reversed. The reversal before the sum and the
//! reversal after it are both part of the scheme and must not be reordered.

use crate::error::{IrTransError, Result};
use crate::CHECKSUM_GROUP_BITS;

/// Derive the expected checksum string for a payload bit-string.
///
/// `skip` is the index of the first payload symbol that enters the grouping;
/// a trailing partial group participates with the symbols it has. Fails with
/// `ChecksumError` when a grouped symbol is not a binary digit.
pub fn derive(payload: &str, skip: usize) -> Result<String> {
    let symbols: Vec<char> = payload.chars().collect();
    let mut sum: u32 = 0;
    let mut start = skip;
    while start < symbols.len() {
        let end = (start + CHECKSUM_GROUP_BITS).min(symbols.len());
        let reversed: String = symbols[start..end].iter().rev().collect();
        let value =
            u32::from_str_radix(&reversed, 2).map_err(|_| IrTransError::ChecksumError)?;
        sum += value;
        start = end;
    }
    let expected: String = format!("{:08b}", sum & 0xff).chars().rev().collect();
    Ok(expected)
}

/// Whether `checksum` is the correct sum for `payload`.
pub fn validate(payload: &str, checksum: &str, skip: usize) -> bool {
    match derive(payload, skip) {
        Ok(expected) => expected == checksum,
        Err(_) => false,
    }
}
