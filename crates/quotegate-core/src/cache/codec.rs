//! Stored payload framing: one flag byte followed by raw or gzip-compressed JSON.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::CacheError;

const FLAG_RAW: u8 = 0;
const FLAG_GZIP: u8 = 1;

/// Frames `json`, compressing it when it is larger than `threshold` bytes.
pub fn encode(json: &[u8], threshold: usize) -> Result<Vec<u8>, CacheError> {
    if json.len() <= threshold {
        let mut framed = Vec::with_capacity(json.len() + 1);
        framed.push(FLAG_RAW);
        framed.extend_from_slice(json);
        return Ok(framed);
    }

    let mut encoder = GzEncoder::new(vec![FLAG_GZIP], Compression::default());
    encoder
        .write_all(json)
        .map_err(|error| CacheError::Codec(error.to_string()))?;
    encoder
        .finish()
        .map_err(|error| CacheError::Codec(error.to_string()))
}

/// Reverses [`encode`].
pub fn decode(stored: &[u8]) -> Result<Vec<u8>, CacheError> {
    match stored.split_first() {
        Some((&FLAG_RAW, body)) => Ok(body.to_vec()),
        Some((&FLAG_GZIP, body)) => {
            let mut json = Vec::with_capacity(body.len() * 4);
            GzDecoder::new(body)
                .read_to_end(&mut json)
                .map_err(|error| CacheError::Codec(error.to_string()))?;
            Ok(json)
        }
        Some((flag, _)) => Err(CacheError::Codec(format!("unknown payload flag {flag}"))),
        None => Err(CacheError::Codec(String::from("empty payload"))),
    }
}

pub fn is_compressed(stored: &[u8]) -> bool {
    stored.first() == Some(&FLAG_GZIP)
}
