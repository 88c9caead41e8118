//! QInt: packs up to four `u32` fields into a single leading byte (four
//! 2-bit width-minus-one selectors) followed by each field's bytes at its
//! own declared width (1..=4), little-endian, concatenated back to back.
//!
//! Used for the numeric posting format: `delta · exponent · mantissa`
//! packed tightly instead of paying a full varint continuation bit per
//! byte.

use crate::error::{CoreError, Result};

const MAX_FIELDS: usize = 4;

fn width_for(value: u32) -> u8 {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFF_FFFF {
        3
    } else {
        4
    }
}

/// Encode up to four `u32`s. `values.len()` must be in `1..=4`.
pub fn qint_encode(values: &[u32]) -> Result<Vec<u8>> {
    if values.is_empty() || values.len() > MAX_FIELDS {
        return Err(CoreError::corruption("qint_encode: length must be 1..=4"));
    }

    let mut leading: u8 = 0;
    let mut body = Vec::with_capacity(values.len() * 2);

    for (i, &v) in values.iter().enumerate() {
        let width = width_for(v);
        leading |= ((width - 1) & 0x03) << (i * 2);
        let bytes = v.to_le_bytes();
        body.extend_from_slice(&bytes[..width as usize]);
    }

    let mut out = Vec::with_capacity(1 + body.len());
    out.push(leading);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode `len` fields (1..=4) from `bytes`, which must start at the
/// leading byte. Returns `(values, bytes_consumed)`.
pub fn qint_decode(bytes: &[u8], len: usize) -> Result<(Vec<u32>, usize)> {
    if len == 0 || len > MAX_FIELDS {
        return Err(CoreError::corruption("qint_decode: length must be 1..=4"));
    }
    if bytes.is_empty() {
        return Err(CoreError::corruption("qint_decode: empty input"));
    }

    let leading = bytes[0];
    let mut widths = [0u8; MAX_FIELDS];
    for (i, w) in widths.iter_mut().enumerate().take(len) {
        *w = ((leading >> (i * 2)) & 0x03) + 1;
    }

    let mut pos = 1usize;
    let mut values = Vec::with_capacity(len);
    for &w in widths.iter().take(len) {
        let w = w as usize;
        if pos + w > bytes.len() {
            return Err(CoreError::corruption("qint_decode: truncated field"));
        }
        let mut buf = [0u8; 4];
        buf[..w].copy_from_slice(&bytes[pos..pos + w]);
        values.push(u32::from_le_bytes(buf));
        pos += w;
    }

    Ok((values, pos))
}
