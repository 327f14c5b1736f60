//! Length-prefixed frame protocol
//!
//! Every JPEG sent by the device travels as one message:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (L bytes)        │
//! │ Big-endian u32   │ JPEG bitstream           │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! There is no magic number, checksum or sequence number. A receiver reads
//! exactly four bytes, interprets them as `L`, then reads exactly `L` bytes.
//! The server-to-device direction carries unframed text and is not handled here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Size of the length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default receiver-side cap on a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes the big-endian length prefix for a payload of `len` bytes
pub fn encode_header(len: usize) -> Result<[u8; LENGTH_PREFIX_LEN], TransportError> {
    let len = u32::try_from(len).map_err(|_| TransportError::PayloadTooLarge(len))?;
    Ok(len.to_be_bytes())
}

/// Builds a complete wire message in one contiguous buffer
pub fn encode_message(payload: &[u8]) -> Result<Bytes, TransportError> {
    let header = encode_header(payload.len())?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Writes one framed payload and flushes.
///
/// Returns the number of bytes put on the wire, prefix included.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<usize, TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = encode_header(payload.len())?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(LENGTH_PREFIX_LEN + payload.len())
}

/// Reads one framed payload.
///
/// Returns `Ok(None)` on a clean end of stream before the first prefix byte;
/// a stream ending inside a message is an `UnexpectedEof` error.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Bytes>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Incremental decoder for byte streams that arrive in arbitrary chunks
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Takes one complete message off the front of `buf`, if present
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        if buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > self.max_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }

        if buf.len() < LENGTH_PREFIX_LEN + len {
            buf.reserve(LENGTH_PREFIX_LEN + len - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_LEN);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
