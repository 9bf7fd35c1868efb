//! Message-at-a-time transport over any async byte stream.
//!
//! The reader and writer halves are separate so a connection can keep a
//! receive loop and a writer task running side by side.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::Frame;
use crate::message::{Message, ProtocolError};

const READ_BUFFER_CAPACITY: usize = 65536;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("stream ended in the middle of a frame ({0} bytes buffered)")]
    Truncated(usize),
}

impl From<crate::frame::FrameError> for TransportError {
    fn from(e: crate::frame::FrameError) -> Self {
        Self::Protocol(ProtocolError::Frame(e))
    }
}

pub struct MessageReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Receive the next message.
    ///
    /// `Ok(None)` means the peer closed the stream cleanly on a frame
    /// boundary.
    pub async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf)? {
                return Ok(Some(Message::from_frame(&frame)?));
            }

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Truncated(self.buf.len()));
            }
        }
    }
}

pub struct MessageWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = message.to_frame()?;
        self.buf.clear();
        frame.encode(&mut self.buf);
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and close the write side.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MessageKind;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(client);
        let mut reader = MessageReader::new(server);

        writer.send(&Message::connect("alice")).await.unwrap();
        writer.send(&Message::send("bob", "hi")).await.unwrap();
        writer.shutdown().await.unwrap();

        let first = reader.recv().await.unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::Connect);
        assert_eq!(first.sender_name, "alice");

        let second = reader.recv().await.unwrap().unwrap();
        assert_eq!(second, Message::send("bob", "hi"));

        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_message_spans_reads() {
        // Pipe smaller than the frame forces several partial reads.
        let (client, server) = tokio::io::duplex(64);
        let body = "x".repeat(10_000);
        let expected = Message::send("bob", body.clone());

        let send = tokio::spawn(async move {
            let mut writer = MessageWriter::new(client);
            writer.send(&Message::send("bob", body)).await.unwrap();
        });

        let mut reader = MessageReader::new(server);
        let received = reader.recv().await.unwrap().unwrap();
        assert_eq!(received, expected);
        send.await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        client
            .write_all(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x01])
            .await
            .unwrap();
        drop(client);

        let mut reader = MessageReader::new(server);
        let result = reader.recv().await;
        assert!(matches!(result, Err(TransportError::Truncated(9))));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        client
            .write_all(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xC1])
            .await
            .unwrap();

        let mut reader = MessageReader::new(server);
        let result = reader.recv().await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }
}
