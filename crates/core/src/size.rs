//! Overflow-checked byte arithmetic and progress computation.
//!
//! Byte counts are u64 throughout; values above 2^53 must survive every
//! computation here without precision loss, so floating point is never used.

/// Add two byte counts, failing loudly on overflow.
pub fn checked_add_bytes(a: u64, b: u64) -> crate::Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| crate::Error::SizeOverflow(format!("{a} + {b} exceeds u64")))
}

/// Number of chunks needed to cover `total_size` at `chunk_size` per chunk.
///
/// Rejects a zero chunk size rather than dividing by it.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> crate::Result<u64> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize {
            size: 0,
            min: crate::MIN_CHUNK_SIZE,
            max: crate::MAX_CHUNK_SIZE,
        });
    }
    Ok(total_size.div_ceil(chunk_size))
}

/// Progress percentage, capped at 100.
///
/// Defined as `min(100, floor(uploaded * 100 / total))`; a zero total is 0,
/// never a divide-by-zero. The multiply is widened to u128 so counts near
/// u64::MAX cannot overflow.
pub fn progress_percentage(uploaded_bytes: u64, total_size: u64) -> u8 {
    if total_size == 0 {
        return 0;
    }
    let pct = (uploaded_bytes as u128 * 100) / total_size as u128;
    pct.min(100) as u8
}

/// Expected size of the chunk at `index`, accounting for the remainder in
/// the final position.
pub fn expected_chunk_size(index: u64, total_size: u64, chunk_size: u64) -> u64 {
    let offset = index.saturating_mul(chunk_size);
    if offset >= total_size {
        return 0;
    }
    (total_size - offset).min(chunk_size)
}
