//! Chat stream framing.
//!
//! Every payload travels as one length-prefixed frame:
//!
//! ```text
//! +----------------------+---------------------------+
//! | Length (4B, BE u32)  | Payload (Length bytes)    |
//! +----------------------+---------------------------+
//! ```
//!
//! A stream may only end on a frame boundary. Frames longer than
//! [`MAX_FRAME_LEN`] are rejected on both sides.

use std::io;

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HostError;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum payload size of a single frame (64 KiB)
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Build the wire bytes for one frame.
///
/// # Errors
///
/// Returns [`HostError::FrameTooLarge`] if `payload` exceeds [`MAX_FRAME_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, HostError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(HostError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    // Cannot truncate: bounded by MAX_FRAME_LEN above
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary.
///
/// # Errors
///
/// - [`io::ErrorKind::UnexpectedEof`] if the stream ends inside a frame
/// - [`io::ErrorKind::InvalidData`] if the announced length exceeds
///   [`MAX_FRAME_LEN`]
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside frame header",
                ));
            }
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}
