//! Length-delimited framing.
//!
//! Layout on the wire: `[length: u32 big endian][body: length bytes]`. Used for
//! CBOR relay messages and for UTF-8 sync messages on the peer channel.
//!
//! # Invariants
//!
//! - A body never exceeds [`MAX_FRAME_SIZE`]. The limit is enforced on both
//!   encode and decode, and the decoder checks the prefix before buffering the
//!   body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted frame body (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Write one frame containing `body`.
pub fn encode_frame(body: &[u8], dst: &mut impl BufMut) -> Result<()> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
    }

    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Validate a length prefix and return the body size it announces.
pub fn body_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }
    Ok(len)
}

/// Split one complete frame body off the front of `src`.
///
/// Returns `Ok(None)` when `src` does not yet hold a complete frame; bytes are
/// consumed only when a frame is returned.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    let Some(prefix) = src.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };

    let mut raw = [0u8; LENGTH_PREFIX_SIZE];
    raw.copy_from_slice(prefix);
    let len = body_len(raw)?;

    if src.len() < LENGTH_PREFIX_SIZE + len {
        src.reserve(LENGTH_PREFIX_SIZE + len - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Decode exactly one frame from a complete buffer.
///
/// Trailing bytes after the frame are ignored.
pub fn decode_exact(bytes: &[u8]) -> Result<&[u8]> {
    let Some(prefix) = bytes.get(..LENGTH_PREFIX_SIZE) else {
        return Err(ProtocolError::FrameTruncated { expected: LENGTH_PREFIX_SIZE, actual: bytes.len() });
    };

    let mut raw = [0u8; LENGTH_PREFIX_SIZE];
    raw.copy_from_slice(prefix);
    let len = body_len(raw)?;

    bytes.get(LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len).ok_or(ProtocolError::FrameTruncated {
        expected: len,
        actual: bytes.len() - LENGTH_PREFIX_SIZE,
    })
}
