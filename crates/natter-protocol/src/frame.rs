use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload too large: {0} bytes (max 65536)")]
    PayloadTooLarge(usize),
}

/// Request/response kind carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connect,
    Send,
    List,
    Disconnect,
    Error,
    /// A kind byte this build does not know about. Kept rather than rejected
    /// so the server can answer it instead of dropping the connection.
    Unknown(u8),
}

impl From<u8> for MessageKind {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Connect,
            0x02 => Self::Send,
            0x03 => Self::List,
            0x04 => Self::Disconnect,
            0x05 => Self::Error,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Connect => 0x01,
            MessageKind::Send => 0x02,
            MessageKind::List => 0x03,
            MessageKind::Disconnect => 0x04,
            MessageKind::Error => 0x05,
            MessageKind::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("CONNECT"),
            Self::Send => f.write_str("SEND"),
            Self::List => f.write_str("LIST"),
            Self::Disconnect => f.write_str("DISCONNECT"),
            Self::Error => f.write_str("ERROR"),
            Self::Unknown(b) => write!(f, "UNKNOWN({b:#04x})"),
        }
    }
}

/// Wire frame: [kind: 1][flags: 1][reserved: 2][length: 4][payload: N]
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: MessageKind,
    pub flags: u8,
    pub payload: Bytes,
}

pub const HEADER_SIZE: usize = 8;
pub const MAX_PAYLOAD_SIZE: usize = 65536;

impl Frame {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            kind,
            flags: 0,
            payload,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.kind.into());
        buf.put_u8(self.flags);
        buf.put_u16(0); // reserved
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Split one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched until the whole frame
    /// has arrived.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        if length > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(length));
        }

        let total_size = HEADER_SIZE + length;
        if buf.len() < total_size {
            return Ok(None);
        }

        let kind = MessageKind::from(buf[0]);
        let flags = buf[1];
        // skip reserved bytes [2..4]

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(length).freeze();

        Ok(Some(Self {
            kind,
            flags,
            payload,
        }))
    }
}
