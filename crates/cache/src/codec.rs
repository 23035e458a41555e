//! Disk blob encoding: JSON compressed with gzip.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Serialize `value` to JSON and gzip it.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(value).map_err(|e| CacheError::Codec(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::fast());
    encoder
        .write_all(&json)
        .map_err(|e| CacheError::Codec(e.to_string()))?;
    encoder.finish().map_err(|e| CacheError::Codec(e.to_string()))
}

/// Gunzip `blob` and deserialize the JSON inside.
pub fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T, CacheError> {
    if !is_gzip(blob) {
        return Err(CacheError::Codec("blob is not gzip data".to_string()));
    }
    let mut json = Vec::new();
    GzDecoder::new(blob)
        .read_to_end(&mut json)
        .map_err(|e| CacheError::Codec(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| CacheError::Codec(e.to_string()))
}

/// Check the gzip magic bytes.
#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}
