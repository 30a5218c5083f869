//! Varint codec
//!
//! Non-negative integers packed 7 bits per byte, least significant group
//! first, with the continuation bit (`0x80`) set on every byte but the last.
//! Used for value lengths in the value logs and for data offsets in slots.
//!
//! ```text
//!   300 = 0b10_0101100  →  [1010_1100] [0000_0010]
//!                            ^cont       ^last
//! ```

use crate::error::{PalError, Result};

/// Widest encoding of a u64 (ceil(64 / 7))
pub const MAX_PACKED_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;

/// Number of bytes `pack(n)` produces
pub fn packed_len(mut n: u64) -> usize {
    let mut len = 1;
    while n > PAYLOAD as u64 {
        n >>= 7;
        len += 1;
    }
    len
}

/// Pack `n` at the start of `buf`, returning the number of bytes written.
///
/// Panics if `buf` is shorter than `packed_len(n)`.
pub fn pack_into(mut n: u64, buf: &mut [u8]) -> usize {
    let mut pos = 0;
    loop {
        let byte = (n & PAYLOAD as u64) as u8;
        n >>= 7;
        if n == 0 {
            buf[pos] = byte;
            return pos + 1;
        }
        buf[pos] = byte | CONTINUATION;
        pos += 1;
    }
}

/// Pack `n` into a fresh buffer
pub fn pack(n: u64) -> Vec<u8> {
    let mut buf = [0u8; MAX_PACKED_LEN];
    let len = pack_into(n, &mut buf);
    buf[..len].to_vec()
}

/// Unpack the integer starting at `bytes[pos]`.
///
/// Returns the value and the position just past its last byte. Trailing
/// zero padding after the terminating byte is never read.
pub fn unpack(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    let mut n: u64 = 0;
    let mut shift: u32 = 0;
    let mut cursor = pos;

    loop {
        let byte = *bytes.get(cursor).ok_or_else(|| {
            PalError::Corruption(format!("truncated varint starting at byte {}", pos))
        })?;
        cursor += 1;

        // Only one payload bit is left in the tenth byte.
        if shift == 63 && byte > 1 {
            return Err(PalError::Corruption(format!(
                "varint starting at byte {} overflows 64 bits",
                pos
            )));
        }

        n |= ((byte & PAYLOAD) as u64) << shift;
        if byte & CONTINUATION == 0 {
            return Ok((n, cursor));
        }

        shift += 7;
        if shift > 63 {
            return Err(PalError::Corruption(format!(
                "varint starting at byte {} is longer than {} bytes",
                pos, MAX_PACKED_LEN
            )));
        }
    }
}
