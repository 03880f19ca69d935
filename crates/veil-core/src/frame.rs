//! Length-prefixed framing.
//!
//! Every stream transmission is `[len: u32 big-endian][payload: len bytes]`.
//! A zero length is a valid empty payload. Headers are validated against
//! the channel's maximum frame size before any body allocation happens, so
//! a hostile header cannot make the receiver reserve memory.

use crate::{Error, Result};

/// Length-prefix size in bytes.
pub const HEADER_LEN: usize = 4;

/// Encode the header for a payload of `len` bytes.
///
/// # Errors
///
/// Fails with `FrameTooLarge` when `len` exceeds `max_frame_size`; a
/// channel never puts an oversized frame on the wire.
pub fn encode_header(len: usize, max_frame_size: u32) -> Result<[u8; HEADER_LEN]> {
    if len as u64 > u64::from(max_frame_size) {
        return Err(Error::FrameTooLarge {
            len: len as u64,
            max: max_frame_size,
        });
    }
    Ok((len as u32).to_be_bytes())
}

/// Decode and validate a received header, returning the body length.
///
/// # Errors
///
/// Fails with `FrameTooLarge` when the announced length exceeds
/// `max_frame_size`.
pub fn decode_header(header: [u8; HEADER_LEN], max_frame_size: u32) -> Result<u32> {
    let len = u32::from_be_bytes(header);
    if len > max_frame_size {
        return Err(Error::FrameTooLarge {
            len: u64::from(len),
            max: max_frame_size,
        });
    }
    Ok(len)
}
