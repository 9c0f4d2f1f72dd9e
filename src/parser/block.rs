//! Block compression transform.
//!
//! The capture runtime compresses every block with raw LZ4 and then
//! compresses the result again. Neither round stores its decompressed size,
//! so decoding grows the destination buffer until the round fits.

use crate::utils::config::MAX_LZ4_EXPANSION;
use crate::utils::error::BlockError;
use log::trace;
use lz4_flex::block::DecompressError;

const MIN_OUTPUT_CAPACITY: usize = 4096;

/// Reverse both compression rounds of a block payload
///
/// **Public** - main entry point for block decoding
///
/// # Errors
/// * `BlockError::DecompressionError` - either round is corrupt or truncated
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, BlockError> {
    let inner = decompress_round(compressed, 1)?;
    decompress_round(&inner, 2)
}

/// Apply both compression rounds, producing a block payload
///
/// **Public** - used by the trace writer and round-trip tests
pub fn compress_twice(raw: &[u8]) -> Vec<u8> {
    let inner = lz4_flex::block::compress(raw);
    lz4_flex::block::compress(&inner)
}

/// Decompress one round into a growable buffer
///
/// **Private** - the output size is unknown, so start from a guess and double
/// while the codec reports the destination as too small
fn decompress_round(input: &[u8], round: u8) -> Result<Vec<u8>, BlockError> {
    let limit = input
        .len()
        .saturating_mul(MAX_LZ4_EXPANSION)
        .saturating_add(MIN_OUTPUT_CAPACITY);
    let mut capacity = input.len().saturating_mul(4).clamp(MIN_OUTPUT_CAPACITY, limit);
    let mut output = vec![0u8; capacity];

    loop {
        match lz4_flex::block::decompress_into(input, &mut output) {
            Ok(written) => {
                output.truncate(written);
                trace!("Round {}: {} -> {} bytes", round, input.len(), written);
                return Ok(output);
            }
            Err(DecompressError::OutputTooSmall { .. }) if capacity < limit => {
                capacity = capacity.saturating_mul(2).min(limit);
                output.resize(capacity, 0);
            }
            Err(e) => {
                return Err(BlockError::DecompressionError {
                    round,
                    reason: e.to_string(),
                })
            }
        }
    }
}
