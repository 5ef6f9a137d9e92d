//! Async frame envelope over any byte stream.

use crate::codec::{decode, encode, FrameKind, Message, ProtocolError};
use crate::MAX_FRAME_LEN;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A frame as read from the wire, before payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn decode(&self) -> Result<Message, ProtocolError> {
        let kind = FrameKind::try_from(self.kind)?;
        decode(kind, &self.payload)
    }
}

/// Reads one frame. Returns `Ok(None)` when the peer closed the stream
/// cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<RawFrame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 5];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(RawFrame {
        kind: header[0],
        payload,
    }))
}

/// Reads and decodes one message. Malformed payloads are returned as errors
/// without closing the stream; callers decide whether to keep reading.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(frame) => frame.decode().map(Some),
        None => Ok(None),
    }
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let (kind, payload) = encode(message)?;
    let mut frame = Vec::with_capacity(5 + payload.len());
    frame.push(kind as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
