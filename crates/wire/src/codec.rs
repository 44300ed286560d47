//! Length-prefixed JSON framing
//!
//! A frame is a 4-byte big-endian length `L` followed by exactly `L` bytes of
//! UTF-8 JSON. A malformed length or a short read is a connection-level
//! failure: callers tear the connection down rather than resynchronise.

use fleet_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Serialize a value into a complete frame
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let length = u32::try_from(body.len()).map_err(|_| Error::FrameTooLarge {
        length: body.len(),
        limit: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode exactly one complete in-memory frame
pub fn decode_frame<T: DeserializeOwned>(frame: &[u8], max_len: usize) -> Result<T> {
    if frame.len() < LENGTH_PREFIX_BYTES {
        return Err(Error::ConnectionClosed {
            context: "frame shorter than its length prefix".to_string(),
        });
    }

    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    prefix.copy_from_slice(&frame[..LENGTH_PREFIX_BYTES]);
    let length = checked_length(prefix, max_len)?;

    let body = &frame[LENGTH_PREFIX_BYTES..];
    if body.len() < length {
        return Err(Error::ConnectionClosed {
            context: format!("frame body truncated: {} of {} bytes", body.len(), length),
        });
    }
    if body.len() > length {
        return Err(Error::Protocol {
            message: format!(
                "{} trailing bytes after {}-byte frame body",
                body.len() - length,
                length
            ),
        });
    }

    Ok(serde_json::from_slice(body)?)
}

/// Write one frame and flush
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, returning `None` if the peer closed cleanly between frames
pub async fn try_read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];

    // A zero-byte read before the prefix starts is an orderly close.
    let first = reader.read(&mut prefix[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    read_exact_or_closed(reader, &mut prefix[1..], "reading frame length").await?;

    let length = checked_length(prefix, max_len)?;
    let mut body = vec![0u8; length];
    read_exact_or_closed(reader, &mut body, "reading frame body").await?;

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Read one frame; a closed stream is an error
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    try_read_frame(reader, max_len)
        .await?
        .ok_or_else(|| Error::ConnectionClosed {
            context: "stream closed before frame".to_string(),
        })
}

/// Write a single unframed control byte and flush
pub async fn write_control<W>(writer: &mut W, byte: u8) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[byte]).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single unframed control byte
pub async fn read_control<R>(reader: &mut R) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    read_exact_or_closed(reader, &mut byte, "reading control reply").await?;
    Ok(byte[0])
}

fn checked_length(prefix: [u8; LENGTH_PREFIX_BYTES], max_len: usize) -> Result<usize> {
    let length = u32::from_be_bytes(prefix) as usize;
    if length > max_len {
        return Err(Error::FrameTooLarge {
            length,
            limit: max_len,
        });
    }
    Ok(length)
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8], context: &str) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed {
            context: context.to_string(),
        }),
        Err(e) => Err(Error::Io(e)),
    }
}
