//! Payload masking (RFC 6455 Section 5.3).
//!
//! A mask key is the 32-bit key in wire order, so byte `i` of a frame payload
//! is XORed with `key[i % 4]`, i.e. `(k >> (3 - i % 4) * 8) & 0xFF` for the
//! big-endian key `k`. Positions count from the start of the frame payload.

/// Convert a 32-bit key into its wire-order bytes.
#[inline]
#[must_use]
pub const fn mask_key(key: u32) -> [u8; 4] {
    key.to_be_bytes()
}

/// Scalar byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Mask `data` as if it started at payload position `offset`.
///
/// Used when a payload is streamed in chunks: each chunk is unmasked with the
/// number of payload bytes already processed for the frame.
#[inline]
pub fn apply_mask_offset(data: &mut [u8], mask: [u8; 4], offset: u64) {
    let shift = (offset % 4) as usize;
    let rotated = [
        mask[shift],
        mask[(shift + 1) % 4],
        mask[(shift + 2) % 4],
        mask[(shift + 3) % 4],
    ];
    apply_mask_fast(data, rotated);
}

/// Word-at-a-time masking, equivalent to [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}
