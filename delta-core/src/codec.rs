//! Deterministic binary codec
//!
//! Every consensus-critical encoding (block hashes, transaction ids, the
//! signed bytes of atomic transactions) goes through this module so that
//! all nodes produce byte-identical output: big-endian, fixed-width
//! integers, length-prefixed sequences, no trailing bytes on decode.

use crate::{CoreError, CoreResult};
use bincode::config::{BigEndian, Configuration, Fixint};

/// Codec configuration shared by every encoder and decoder
pub const CONFIG: Configuration<BigEndian, Fixint> = bincode::config::standard()
    .with_big_endian()
    .with_fixed_int_encoding();

/// Encode a value with the canonical configuration
pub fn encode<T: bincode::Encode>(value: &T) -> CoreResult<Vec<u8>> {
    bincode::encode_to_vec(value, CONFIG).map_err(|e| CoreError::Encoding(e.to_string()))
}

/// Decode a value, rejecting any trailing bytes
pub fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> CoreResult<T> {
    let (value, read) = bincode::decode_from_slice::<T, _>(bytes, CONFIG)
        .map_err(|e| CoreError::Decoding(e.to_string()))?;
    if read != bytes.len() {
        return Err(CoreError::Decoding(format!(
            "{} trailing bytes after value",
            bytes.len() - read
        )));
    }
    Ok(value)
}
