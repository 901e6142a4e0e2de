//! Views of a data block as interleaved complex integer samples.

use crate::error::{Error, Result};

/// Borrow 8-bit data as `[re, im]` pairs without copying.
pub fn complex_i8_view(data: &[u8]) -> Result<&[[i8; 2]]> {
    bytemuck::try_cast_slice(data)
        .map_err(|_| Error::InvalidValue("8-bit complex data must have an even length"))
}

/// Decode a data block into `[re, im]` pairs.
///
/// 8-bit data is two's-complement bytes. 4-bit data packs one sample per
/// byte, real part in the high nibble, each sign-extended.
pub fn complex_i8(data: &[u8], nbits: i64) -> Result<Vec<[i8; 2]>> {
    match nbits {
        8 => Ok(complex_i8_view(data)?.to_vec()),
        4 => Ok(data
            .iter()
            .map(|&b| {
                let b = b as i8;
                [b >> 4, (b << 4) >> 4]
            })
            .collect()),
        other => Err(Error::UnsupportedBitDepth(other)),
    }
}
