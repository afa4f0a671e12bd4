//! Framed connections over any byte stream.
//!
//! Frames (all integers big-endian):
//! - request header: `len:u16` `name:utf8[len]`
//! - body frame:     `len:u32` `payload[len]`
//! - response:       `status:u8`, then a body frame (ok), an error message
//!   frame (error), or a pushed event frame (watch notification)
//!
//! Writes are buffered; callers flush explicitly after the last frame of a
//! message. EOF between frames surfaces as the distinguished
//! [`ProtocolError::PeerClosed`].

use std::io::ErrorKind;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{WireFormat, MAX_FRAME_SIZE};

/// Response status: ok, body frame follows.
pub const STATUS_OK: u8 = 0;
/// Response status: error, message frame follows.
pub const STATUS_ERROR: u8 = 1;
/// Reserved status for asynchronous watch notifications.
pub const STATUS_PUSH: u8 = 2;

/// Trait alias for protocol streams.
pub trait StreamIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamIo for T {}

/// An erased transport: TCP, Unix socket, or an in-memory duplex in tests.
pub type BoxedStream = Box<dyn StreamIo>;

/// The read half of a framed connection.
pub struct FrameReader {
    io: BufReader<ReadHalf<BoxedStream>>,
}

/// The write half of a framed connection.
pub struct FrameWriter {
    io: BufWriter<WriteHalf<BoxedStream>>,
}

/// A whole framed connection (both halves).
///
/// The server splits it so responses and pushed notifications can share the
/// write half; the client keeps it whole.
pub struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Connection {
    pub fn new(stream: BoxedStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader {
                io: BufReader::new(read_half),
            },
            writer: FrameWriter {
                io: BufWriter::new(write_half),
            },
        }
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }

    pub fn reader(&mut self) -> &mut FrameReader {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut FrameWriter {
        &mut self.writer
    }

    pub async fn read_header(&mut self) -> ProtocolResult<String> {
        self.reader.read_header().await
    }

    pub async fn write_header(&mut self, name: &str) -> ProtocolResult<()> {
        self.writer.write_header(name).await
    }

    pub async fn read_status(&mut self) -> ProtocolResult<u8> {
        self.reader.read_status().await
    }

    pub async fn read_value<T: DeserializeOwned>(
        &mut self,
        format: WireFormat,
    ) -> ProtocolResult<T> {
        self.reader.read_value(format).await
    }

    pub async fn write_value<T: Serialize>(
        &mut self,
        format: WireFormat,
        value: &T,
    ) -> ProtocolResult<()> {
        self.writer.write_value(format, value).await
    }

    pub async fn read_error_message(&mut self) -> ProtocolResult<String> {
        self.reader.read_error_message().await
    }

    pub async fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.reader.read_u32().await
    }

    pub async fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.writer.write_u32(value).await
    }

    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush().await
    }
}

/// Translate EOF into the distinguished peer-closed condition.
fn map_eof(e: std::io::Error) -> ProtocolError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::PeerClosed
    } else {
        ProtocolError::Io(e)
    }
}

impl FrameReader {
    /// Read a request header. EOF here means the peer hung up cleanly.
    pub async fn read_header(&mut self) -> ProtocolResult<String> {
        let mut len_buf = [0u8; 2];
        self.io.read_exact(&mut len_buf).await.map_err(map_eof)?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut name = vec![0u8; len];
        self.io.read_exact(&mut name).await.map_err(map_eof)?;
        String::from_utf8(name)
            .map_err(|_| ProtocolError::Framing("command name is not valid UTF-8".into()))
    }

    /// Read a response status byte.
    pub async fn read_status(&mut self) -> ProtocolResult<u8> {
        let mut buf = [0u8; 1];
        self.io.read_exact(&mut buf).await.map_err(map_eof)?;
        Ok(buf[0])
    }

    /// Read one length-prefixed body frame.
    pub async fn read_frame(&mut self) -> ProtocolResult<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.io.read_exact(&mut len_buf).await.map_err(map_eof)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut payload = vec![0u8; len];
        self.io.read_exact(&mut payload).await.map_err(map_eof)?;
        Ok(payload)
    }

    /// Read and decode one body frame.
    pub async fn read_value<T: DeserializeOwned>(
        &mut self,
        format: WireFormat,
    ) -> ProtocolResult<T> {
        let payload = self.read_frame().await?;
        format.decode(&payload)
    }

    /// Read an error-response message.
    pub async fn read_error_message(&mut self) -> ProtocolResult<String> {
        let payload = self.read_frame().await?;
        String::from_utf8(payload)
            .map_err(|_| ProtocolError::Framing("error message is not valid UTF-8".into()))
    }

    pub async fn read_u32(&mut self) -> ProtocolResult<u32> {
        let mut buf = [0u8; 4];
        self.io.read_exact(&mut buf).await.map_err(map_eof)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl FrameWriter {
    /// Write a request header.
    pub async fn write_header(&mut self, name: &str) -> ProtocolResult<()> {
        let bytes = name.as_bytes();
        let len = u16::try_from(bytes.len())
            .map_err(|_| ProtocolError::Framing(format!("command name too long: {name:?}")))?;
        self.io.write_all(&len.to_be_bytes()).await?;
        self.io.write_all(bytes).await?;
        Ok(())
    }

    /// Write a response status byte.
    pub async fn write_status(&mut self, status: u8) -> ProtocolResult<()> {
        self.io.write_all(&[status]).await?;
        Ok(())
    }

    /// Write one length-prefixed body frame.
    pub async fn write_frame(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        self.io
            .write_all(&(payload.len() as u32).to_be_bytes())
            .await?;
        self.io.write_all(payload).await?;
        Ok(())
    }

    /// Encode and write one body frame.
    pub async fn write_value<T: Serialize>(
        &mut self,
        format: WireFormat,
        value: &T,
    ) -> ProtocolResult<()> {
        let payload = format.encode(value)?;
        self.write_frame(&payload).await
    }

    /// Write a complete error response (status, message, flush).
    pub async fn reply_error(&mut self, message: &str) -> ProtocolResult<()> {
        self.write_status(STATUS_ERROR).await?;
        self.write_frame(message.as_bytes()).await?;
        self.flush().await
    }

    pub async fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.io.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.io.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Connection, Connection) {
        let (a, b) = tokio::io::duplex(1024 * 1024);
        (
            Connection::new(Box::new(a)),
            Connection::new(Box::new(b)),
        )
    }

    #[tokio::test]
    async fn header_roundtrip() {
        let (mut client, mut server) = pair();
        client.write_header("tree.find").await.unwrap();
        client.flush().await.unwrap();
        assert_eq!(server.read_header().await.unwrap(), "tree.find");
    }

    #[tokio::test]
    async fn value_roundtrip() {
        let (mut client, mut server) = pair();
        let value = vec![1u32, 2, 3];
        client
            .write_value(WireFormat::Binary, &value)
            .await
            .unwrap();
        client.flush().await.unwrap();
        let decoded: Vec<u32> = server.read_value(WireFormat::Binary).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn error_reply_roundtrip() {
        let (mut client, mut server) = pair();
        server.writer().reply_error("unknown command").await.unwrap();
        assert_eq!(client.read_status().await.unwrap(), STATUS_ERROR);
        assert_eq!(
            client.read_error_message().await.unwrap(),
            "unknown command"
        );
    }

    #[tokio::test]
    async fn eof_between_frames_is_peer_closed() {
        let (client, mut server) = pair();
        drop(client);
        let err = server.read_header().await.unwrap_err();
        assert!(matches!(err, ProtocolError::PeerClosed));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_peer_closed() {
        let (mut client, mut server) = pair();
        // A header claiming 10 bytes, but only 3 arrive before the close.
        client.writer().write_u32(10).await.unwrap();
        client
            .writer()
            .io
            .write_all(b"abc")
            .await
            .unwrap();
        client.flush().await.unwrap();
        drop(client);
        let err = server.reader().read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::PeerClosed));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocation() {
        let (mut client, mut server) = pair();
        client
            .write_u32((MAX_FRAME_SIZE + 1) as u32)
            .await
            .unwrap();
        client.flush().await.unwrap();
        let err = server.reader().read_frame().await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn status_bytes() {
        let (mut client, mut server) = pair();
        server.writer().write_status(STATUS_PUSH).await.unwrap();
        server.flush().await.unwrap();
        assert_eq!(client.read_status().await.unwrap(), STATUS_PUSH);
    }

    #[tokio::test]
    async fn unflushed_writes_do_not_arrive() {
        let (mut client, mut server) = pair();
        client.write_header("ping").await.unwrap();
        // No flush: the server must still be waiting.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            server.read_header(),
        )
        .await;
        assert!(pending.is_err(), "header should not arrive before flush");
        client.flush().await.unwrap();
        assert_eq!(server.read_header().await.unwrap(), "ping");
    }
}
