//! Length-prefixed JSON frames
//!
//! Wire format: `[u32 big-endian length][JSON payload]`, payload at most
//! [`MAX_FRAME_SIZE`] bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in either direction (1 MiB)
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Relay task closed")]
    Closed,
}

fn map_eof(e: std::io::Error) -> RelayError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        RelayError::ConnectionClosed
    } else {
        RelayError::Io(e)
    }
}

/// Read one frame and decode it as `T`.
///
/// A malformed payload yields [`RelayError::Protocol`] with the stream still
/// positioned at the next frame, so callers may skip it and keep reading.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, RelayError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_eof)?;

    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(RelayError::Protocol("Empty frame".into()));
    }
    if len > MAX_FRAME_SIZE {
        // The payload is not consumed, so the stream cannot be resynchronised
        return Err(RelayError::ConnectionClosed);
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(map_eof)?;

    serde_json::from_slice(&payload).map_err(|e| RelayError::Protocol(format!("Invalid JSON: {}", e)))
}

/// Encode `message` and write it as one frame
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<(), RelayError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message)
        .map_err(|e| RelayError::Protocol(format!("Serialization failed: {}", e)))?;

    let len = payload.len() as u32;
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(RelayError::Protocol(format!(
            "Message too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ClientMessage, ServerMessage, ViewingAreaModel};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_frame(&mut client, &ClientMessage::EnterArea { area_id: "Area1".into() })
            .await
            .unwrap();
        write_frame(&mut client, &ClientMessage::LeaveArea).await.unwrap();

        let first: ClientMessage = read_frame(&mut server).await.unwrap();
        let second: ClientMessage = read_frame(&mut server).await.unwrap();
        assert_eq!(first, ClientMessage::EnterArea { area_id: "Area1".into() });
        assert_eq!(second, ClientMessage::LeaveArea);
    }

    #[tokio::test]
    async fn test_bad_json_leaves_stream_usable() {
        let mut buf = Vec::new();
        let garbage = b"{not json";
        buf.extend_from_slice(&(garbage.len() as u32).to_be_bytes());
        buf.extend_from_slice(garbage);
        write_frame(&mut buf, &ServerMessage::AreaUpdate { area: ViewingAreaModel::new("A") })
            .await
            .unwrap();

        let mut cursor = Cursor::new(buf);
        let bad = read_frame::<ServerMessage, _>(&mut cursor).await;
        assert!(matches!(bad, Err(RelayError::Protocol(_))));

        let good: ServerMessage = read_frame(&mut cursor).await.unwrap();
        assert!(matches!(good, ServerMessage::AreaUpdate { .. }));
    }

    #[tokio::test]
    async fn test_empty_frame_rejected() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 0]);
        let result = read_frame::<ClientMessage, _>(&mut cursor).await;
        assert!(matches!(result, Err(RelayError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_closes() {
        let len = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(len.to_vec());
        let result = read_frame::<ClientMessage, _>(&mut cursor).await;
        assert!(matches!(result, Err(RelayError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::new());
        let result = read_frame::<ClientMessage, _>(&mut cursor).await;
        assert!(matches!(result, Err(RelayError::ConnectionClosed)));
    }
}
