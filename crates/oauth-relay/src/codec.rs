//! Compressed session values.
//!
//! Provider sessions are marshaled to strings that can be large (tokens,
//! endpoints, raw profile data). They are gzip-compressed before they are
//! placed in the session so cookie-backed stores stay under the browser's
//! per-cookie limit. Session values are strings, so the compressed bytes
//! are stored base64-encoded.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::AuthResult;
use crate::error::AuthError;

/// Compresses a string into a gzip stream.
///
/// Encoding does not fail for any input. The `Result` only carries the
/// encoder's `io::Result` signature through without a panic path.
///
/// # Errors
///
/// None in practice: the sink is a `Vec`, whose writes always succeed.
pub fn encode(value: &str) -> AuthResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(value.as_bytes())
        .map_err(|e| AuthError::store(format!("failed to write gzipped data: {e}")))?;
    encoder
        .finish()
        .map_err(|e| AuthError::store(format!("failed to close gzip writer: {e}")))
}

/// Decompresses a gzip stream produced by [`encode`].
///
/// # Errors
///
/// Returns [`AuthError::CorruptPayload`] if `bytes` is not a complete gzip
/// stream or does not decompress to UTF-8.
pub fn decode(bytes: &[u8]) -> AuthResult<String> {
    if bytes.is_empty() {
        return Err(AuthError::corrupt_payload("empty gzip stream"));
    }

    let mut decoder = GzDecoder::new(bytes);
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .map_err(|e| AuthError::corrupt_payload(format!("failed to read gzipped data: {e}")))?;

    String::from_utf8(buf)
        .map_err(|e| AuthError::corrupt_payload(format!("decompressed data is not UTF-8: {e}")))
}

/// Compresses `value` into the string form stored in a session.
pub fn encode_session_value(value: &str) -> AuthResult<String> {
    Ok(STANDARD.encode(encode(value)?))
}

/// Reverses [`encode_session_value`].
pub fn decode_session_value(stored: &str) -> AuthResult<String> {
    let bytes = STANDARD
        .decode(stored)
        .map_err(|e| AuthError::corrupt_payload(format!("invalid base64: {e}")))?;
    decode(&bytes)
}
