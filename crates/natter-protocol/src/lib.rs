pub mod frame;
pub mod message;
pub mod transport;

pub use frame::{Frame, FrameError, MessageKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{Message, ProtocolError, NAME_DELIMITER, SERVER_NAME};
pub use transport::{MessageReader, MessageWriter, TransportError};
