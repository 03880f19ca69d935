//! Message payload codecs and end-of-stream sentinels.
//!
//! A caller-level "no more messages" signal travels in-band: `None` on a
//! string send becomes the UTF-8 string `"\u{0004}"`, `None` on a byte
//! send becomes the single byte `0x04`, and a received plaintext equal to
//! either literal surfaces as `None` again. Callers that need to transmit
//! those exact literals as data must frame them differently themselves.
//!
//! Integers travel as 4 bytes big-endian.

use crate::{Error, Result};

/// UTF-8 end-of-stream sentinel for string messages.
pub const STRING_SENTINEL: &str = "\u{0004}";

/// End-of-stream sentinel for byte messages.
pub const BYTES_SENTINEL: &[u8] = &[0x04];

/// Encode an optional string; `None` becomes the sentinel.
pub fn encode_str(message: Option<&str>) -> Vec<u8> {
    message.unwrap_or(STRING_SENTINEL).as_bytes().to_vec()
}

/// Decode a received string payload; the sentinel surfaces as `None`.
///
/// # Errors
///
/// Fails with `InvalidMessage` when the payload is not valid UTF-8.
pub fn decode_str(plain: Vec<u8>) -> Result<Option<String>> {
    let text = String::from_utf8(plain)
        .map_err(|e| Error::InvalidMessage(format!("string payload is not UTF-8: {e}")))?;
    if text == STRING_SENTINEL {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

/// Encode an optional byte message; `None` becomes the sentinel.
pub fn encode_bytes(message: Option<&[u8]>) -> Vec<u8> {
    message.unwrap_or(BYTES_SENTINEL).to_vec()
}

/// Decode a received byte payload; the sentinel surfaces as `None`.
pub fn decode_bytes(plain: Vec<u8>) -> Option<Vec<u8>> {
    if plain == BYTES_SENTINEL {
        None
    } else {
        Some(plain)
    }
}

/// Encode a 32-bit integer as 4 bytes big-endian.
pub fn encode_i32(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Decode a received integer payload.
///
/// # Errors
///
/// Fails with `InvalidMessage` when the payload is not exactly 4 bytes.
pub fn decode_i32(plain: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = plain.try_into().map_err(|_| {
        Error::InvalidMessage(format!(
            "integer payload must be 4 bytes, got {}",
            plain.len()
        ))
    })?;
    Ok(i32::from_be_bytes(bytes))
}
