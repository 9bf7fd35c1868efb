use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use natter_protocol::{Message, NAME_DELIMITER};

pub type Outbox = mpsc::Sender<Message>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection already registered as {0:?}")]
    AlreadyRegistered(String),
    #[error(
        "name {0:?} is not valid: names must be non-empty and must not contain {delim:?}",
        delim = NAME_DELIMITER
    )]
    InvalidName(String),
    #[error("name {0:?} is already taken")]
    NameTaken(String),
    #[error("recipient {0:?} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// One live connection: its identity plus the queue its writer drains.
///
/// Equality is by id only.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: Outbox,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbox: Outbox) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for this connection without waiting. A full outbox
    /// means the peer is not reading; the message comes back in the error.
    pub fn deliver(&self, message: Message) -> Result<(), TrySendError<Message>> {
        self.outbox.try_send(message)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[derive(Default)]
struct Directory {
    by_name: HashMap<String, ConnectionHandle>,
    by_conn: HashMap<ConnectionId, String>,
}

/// Who is online. Both maps sit behind one lock and are only ever touched
/// together, so they stay exact inverses of each other.
///
/// Every method takes the lock for a handful of map operations and returns
/// owned values; nothing here awaits or performs I/O.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Directory>>,
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() || name.contains(NAME_DELIMITER) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: &ConnectionHandle, name: &str) -> Result<(), RegistryError> {
        let mut dir = self.inner.lock();

        if let Some(existing) = dir.by_conn.get(&conn.id) {
            return Err(RegistryError::AlreadyRegistered(existing.clone()));
        }
        validate_name(name)?;
        if dir.by_name.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }

        dir.by_name.insert(name.to_string(), conn.clone());
        dir.by_conn.insert(conn.id, name.to_string());
        Ok(())
    }

    /// Remove whatever `id` is registered as. Returns the freed name, if any.
    pub fn deregister(&self, id: ConnectionId) -> Option<String> {
        let mut dir = self.inner.lock();
        let name = dir.by_conn.remove(&id)?;
        dir.by_name.remove(&name);
        Some(name)
    }

    pub fn lookup(&self, name: &str) -> Result<ConnectionHandle, RegistryError> {
        self.inner
            .lock()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.inner.lock().by_conn.get(&id).cloned()
    }

    /// Point-in-time copy of every registered name, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().by_name.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_name.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let dir = self.inner.lock();
        dir.by_name.len() == dir.by_conn.len()
            && dir
                .by_name
                .iter()
                .all(|(name, conn)| dir.by_conn.get(&conn.id) == Some(name))
    }
}

#[cfg(test)]
pub(crate) fn test_handle() -> (ConnectionHandle, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(16);
    (ConnectionHandle::new(ConnectionId::next(), tx), rx)
}
