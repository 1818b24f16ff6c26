//! Length-prefixed frame codec
//!
//! Frame layout: `u32` big-endian payload length, then the payload encoded
//! with the configured [`WireFormat`].

use bytes::BytesMut;
use contracts::WireFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};

/// Upper bound for one frame (LiDAR-heavy step results included)
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn encode<T: Serialize>(value: &T, format: WireFormat) -> Result<Vec<u8>> {
    match format {
        WireFormat::Bincode => {
            bincode::serialize(value).map_err(|e| TransportError::codec(format!("bincode: {e}")))
        }
        WireFormat::Json => {
            serde_json::to_vec(value).map_err(|e| TransportError::codec(format!("json: {e}")))
        }
    }
}

pub fn decode<T: DeserializeOwned>(payload: &[u8], format: WireFormat) -> Result<T> {
    match format {
        WireFormat::Bincode => bincode::deserialize(payload)
            .map_err(|e| TransportError::codec(format!("bincode: {e}"))),
        WireFormat::Json => serde_json::from_slice(payload)
            .map_err(|e| TransportError::codec(format!("json: {e}"))),
    }
}

/// Encode and write one frame
pub async fn write_frame<W, T>(writer: &mut W, value: &T, format: WireFormat) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = encode(value, format)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame; `None` on a clean end of stream
pub async fn read_frame<R, T>(reader: &mut R, format: WireFormat) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::ConnectionClosed
        } else {
            TransportError::Io(e)
        }
    })?;
    decode(&payload, format).map(Some)
}
