//! Payload text encoding: base64, optionally over gzip.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;

/// Largest payload a compressed node may inflate to.
pub const MAX_PAYLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// Payload text that could not be decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Decode element text into payload bytes.
///
/// Whitespace inside the base64 text (line wrapping) is ignored.
pub fn decode_payload(text: &str, compressed: bool) -> Result<Vec<u8>, CodecError> {
    decode_with_limit(text, compressed, MAX_PAYLOAD_BYTES)
}

fn decode_with_limit(text: &str, compressed: bool, limit: u64) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = STANDARD.decode(cleaned.as_bytes())?;
    if !compressed {
        return Ok(raw);
    }
    // One byte past the limit tells an oversized stream apart from one that fits exactly.
    let mut bytes = Vec::new();
    GzDecoder::new(raw.as_slice())
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(bytes)
}

/// Encode payload bytes as element text.
pub fn encode_payload(bytes: &[u8], compressed: bool) -> std::io::Result<String> {
    if !compressed {
        return Ok(STANDARD.encode(bytes));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    let gzipped = encoder.finish()?;
    Ok(STANDARD.encode(gzipped))
}

/// KeePass writes booleans as `True`/`False`; accept any casing.
pub fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

pub fn format_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
