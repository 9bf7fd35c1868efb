use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{Frame, FrameError, MessageKind};

/// Reserved separator between recipient and text in client input
/// (`name: message`). Registered names may not contain it.
pub const NAME_DELIMITER: char = ':';

/// Sender name stamped on every message the server originates.
pub const SERVER_NAME: &str = "SERVER";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// One unit of exchange between client and server.
///
/// The meaning of `sender_name` depends on direction: on an inbound SEND it
/// names the intended recipient, on an outbound SEND it names whoever
/// actually sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub sender_name: String,
    pub body: String,
}

/// Everything but the kind, which lives in the frame header.
#[derive(Debug, Serialize, Deserialize)]
struct MessagePayload {
    sender_name: String,
    body: String,
}

impl Message {
    pub fn new(kind: MessageKind, sender_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            sender_name: sender_name.into(),
            body: body.into(),
        }
    }

    pub fn connect(name: impl Into<String>) -> Self {
        Self::new(MessageKind::Connect, name, "")
    }

    pub fn send(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(MessageKind::Send, name, body)
    }

    pub fn list() -> Self {
        Self::new(MessageKind::List, "", "")
    }

    pub fn disconnect() -> Self {
        Self::new(MessageKind::Disconnect, "", "")
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, SERVER_NAME, reason)
    }

    /// LIST reply: one name per line.
    pub fn roster<S: AsRef<str>>(names: &[S]) -> Self {
        let body = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(MessageKind::List, SERVER_NAME, body)
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let payload = MessagePayload {
            sender_name: self.sender_name.clone(),
            body: self.body.clone(),
        };
        let encoded = rmp_serde::to_vec(&payload)?;
        Ok(Frame::new(self.kind, encoded)?)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let payload: MessagePayload = rmp_serde::from_slice(&frame.payload)?;
        Ok(Self {
            kind: frame.kind,
            sender_name: payload.sender_name,
            body: payload.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_through_frame() {
        let original = Message::send("bob", "hi there");

        let frame = original.to_frame().unwrap();
        assert_eq!(frame.kind, MessageKind::Send);

        let decoded = Message::from_frame(&frame).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_roster_joins_with_newlines() {
        let msg = Message::roster(&["alice", "bob"]);
        assert_eq!(msg.kind, MessageKind::List);
        assert_eq!(msg.sender_name, SERVER_NAME);
        assert_eq!(msg.body, "alice\nbob");

        let empty = Message::roster::<&str>(&[]);
        assert_eq!(empty.body, "");
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        let frame = Frame::new(MessageKind::Send, vec![0xC1]).unwrap();
        let result = Message::from_frame(&frame);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let msg = Message::send("bob", "x".repeat(70_000));
        let result = msg.to_frame();
        assert!(matches!(
            result,
            Err(ProtocolError::Frame(FrameError::PayloadTooLarge(_)))
        ));
    }
}
