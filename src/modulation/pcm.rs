//! 16-bit PCM conversions

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::SAMPLE_BYTES;
use crate::error::ModulationError;

/// Convert a working sample to int16: truncate toward zero, saturate at the
/// type bounds, NaN maps to 0.
#[inline]
pub fn to_sample(value: f64) -> i16 {
    value as i16
}

/// Serialize samples as little-endian int16 bytes
pub fn encode<I>(samples: I) -> Bytes
where
    I: IntoIterator<Item = i16>,
    I::IntoIter: ExactSizeIterator,
{
    let samples = samples.into_iter();
    let mut buf = BytesMut::with_capacity(samples.len() * SAMPLE_BYTES);
    for sample in samples {
        buf.put_i16_le(sample);
    }
    buf.freeze()
}

/// Parse little-endian int16 bytes
pub fn decode(bytes: &[u8]) -> Result<Vec<i16>, ModulationError> {
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(ModulationError::InvalidSignalType(format!(
            "{} bytes is not a whole number of int16 samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
