//! Configuration <-> share token transform.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::debug;

use sqs_types::{CodecError, Configuration};

/// URL-safe text representing a compressed configuration.
pub type ShareToken = String;

/// Upper bound on the decompressed size of a token.
pub const MAX_DECODED_BYTES: u64 = 64 * 1024 * 1024;

fn encoding_error(message: impl ToString) -> CodecError {
    CodecError::Encoding {
        message: message.to_string(),
    }
}

fn decoding_error(message: impl ToString) -> CodecError {
    CodecError::Decoding {
        message: message.to_string(),
    }
}

/// Serialise `config` to JSON and gzip it.
///
/// Object keys are emitted in sorted order and the compression level is
/// fixed, so equal configurations produce equal bytes.
pub fn compress(config: &Configuration) -> Result<Vec<u8>, CodecError> {
    let text = serde_json::to_vec(config).map_err(encoding_error)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(text.len() / 2), Compression::default());
    encoder.write_all(&text).map_err(encoding_error)?;
    encoder.finish().map_err(encoding_error)
}

/// Inverse of [`compress`]. Fails on a corrupt or truncated gzip stream and on
/// payloads that are not well-formed JSON.
pub fn decompress(bytes: &[u8]) -> Result<Configuration, CodecError> {
    let mut text = Vec::new();
    GzDecoder::new(bytes)
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut text)
        .map_err(|e| decoding_error(format!("decompression failed: {e}")))?;

    if text.len() as u64 > MAX_DECODED_BYTES {
        return Err(decoding_error(format!(
            "decompressed payload exceeds {MAX_DECODED_BYTES} bytes"
        )));
    }

    serde_json::from_slice(&text).map_err(|e| decoding_error(format!("invalid JSON: {e}")))
}

/// Encode `config` as a share token (URL-safe base64 alphabet, no padding).
pub fn encode(config: &Configuration) -> Result<ShareToken, CodecError> {
    let bytes = compress(config)?;
    let token = URL_SAFE_NO_PAD.encode(&bytes);
    debug!(compressed = bytes.len(), token_len = token.len(), "encoded share token");
    Ok(token)
}

/// Decode a share token back into a configuration.
///
/// Accepts the URL-safe and the standard base64 alphabet, padded or not, so
/// tokens produced by browsers (`btoa`) decode as well.
pub fn decode(token: &str) -> Result<Configuration, CodecError> {
    let bytes = decode_transport(token.trim())?;
    let config = decompress(&bytes)?;
    debug!(token_len = token.len(), "decoded share token");
    Ok(config)
}

fn decode_transport(token: &str) -> Result<Vec<u8>, CodecError> {
    if token.is_empty() {
        return Err(decoding_error("empty token"));
    }

    let unpadded = token.trim_end_matches('=');
    let result = if unpadded.contains(['+', '/']) {
        STANDARD_NO_PAD.decode(unpadded)
    } else {
        URL_SAFE_NO_PAD.decode(unpadded)
    };
    result.map_err(|e| decoding_error(format!("invalid base64: {e}")))
}
