use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use natter_protocol::{Message, MessageReader, MessageWriter, TransportError};

use crate::dispatcher;
use crate::registry::{ConnectionHandle, ConnectionId, Registry};

/// How long a closing session lets its writer flush before giving up on a
/// peer that is not reading.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no name yet.
    Open,
    Named,
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum Exit {
    Disconnected,
    EndOfStream,
    Failed(TransportError),
}

/// Frees the connection's name however the session ends, including when
/// the task is aborted or panics.
struct Registration {
    registry: Registry,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(name) = self.registry.deregister(self.id) {
            info!(
                "{} released name {:?} ({} online)",
                self.id,
                name,
                self.registry.len()
            );
        }
    }
}

/// One accepted connection: a receive loop feeding the dispatcher plus a
/// writer task draining the connection's outbox.
pub struct Session<R, W> {
    id: ConnectionId,
    registry: Registry,
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
    outbox_capacity: usize,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(registry: Registry, reader: R, writer: W, outbox_capacity: usize) -> Self {
        Self {
            id: ConnectionId::next(),
            registry,
            reader: MessageReader::new(reader),
            writer: MessageWriter::new(writer),
            outbox_capacity,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn run(self) -> Exit {
        let Session {
            id,
            registry,
            mut reader,
            mut writer,
            outbox_capacity,
        } = self;

        let (tx, mut rx) = mpsc::channel::<Message>(outbox_capacity);
        let handle = ConnectionHandle::new(id, tx);
        let registration = Registration {
            registry: registry.clone(),
            id,
        };

        let mut send_handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = writer.send(&message).await {
                    debug!("{}: write failed: {}", id, e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut state = SessionState::Open;
        let exit = loop {
            let message = match reader.recv().await {
                Ok(Some(message)) => message,
                Ok(None) => break Exit::EndOfStream,
                Err(e) => {
                    warn!("{}: receive failed: {}", id, e);
                    break Exit::Failed(e);
                }
            };

            let dispatch = dispatcher::handle(message, &handle, &registry);
            if dispatch.named.is_some() {
                state = SessionState::Named;
            }

            // registry lock is already released here
            for (to, message) in dispatch.outbound {
                deliver(&handle, &to, message);
            }

            if dispatch.close {
                break Exit::Disconnected;
            }
        };

        debug!("{}: leaving {:?} after {:?}", id, state, exit);
        drop(registration);
        state = SessionState::Closed;

        // Closing our sender lets the writer flush what is queued and stop.
        drop(handle);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_handle)
            .await
            .is_err()
        {
            debug!("{}: peer stopped reading, dropping unsent messages", id);
            send_handle.abort();
        }

        debug!("{}: {:?}", id, state);
        exit
    }
}

/// Best-effort hand-off to `to`'s outbox. Never waits: a recipient that has
/// stopped reading loses the message and the source is told so.
fn deliver(source: &ConnectionHandle, to: &ConnectionHandle, message: Message) {
    match to.deliver(message) {
        Ok(()) => {}
        Err(TrySendError::Closed(_)) => {
            debug!("{}: {} went away before delivery", source.id(), to.id());
        }
        Err(TrySendError::Full(_)) if to == source => {
            warn!("{}: outbox full, dropping reply", source.id());
        }
        Err(TrySendError::Full(_)) => {
            warn!("{}: outbox of {} full, dropping message", source.id(), to.id());
            let notice = Message::error("recipient is not keeping up, message dropped");
            if source.deliver(notice).is_err() {
                debug!("{}: outbox full, dropping notice", source.id());
            }
        }
    }
}
