use tracing::{debug, info};

use natter_protocol::{Message, MessageKind};

use crate::registry::{ConnectionHandle, Registry};

/// What a session has to do after one inbound message.
///
/// Registry work is already done by the time this is returned; the
/// deliveries are left to the caller so none of them run under the
/// registry lock.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub outbound: Vec<(ConnectionHandle, Message)>,
    /// Set when a CONNECT succeeded.
    pub named: Option<String>,
    pub close: bool,
}

impl Dispatch {
    fn reply(to: &ConnectionHandle, message: Message) -> Self {
        Self {
            outbound: vec![(to.clone(), message)],
            ..Self::default()
        }
    }

    fn close() -> Self {
        Self {
            close: true,
            ..Self::default()
        }
    }
}

pub fn handle(message: Message, source: &ConnectionHandle, registry: &Registry) -> Dispatch {
    match message.kind {
        MessageKind::Connect => match registry.register(source, &message.sender_name) {
            Ok(()) => {
                info!("{} registered as {:?}", source.id(), message.sender_name);
                Dispatch {
                    named: Some(message.sender_name),
                    ..Dispatch::default()
                }
            }
            Err(e) => {
                debug!("{} failed to register: {}", source.id(), e);
                Dispatch::reply(source, Message::error(e.to_string()))
            }
        },
        MessageKind::Send => route(message, source, registry),
        MessageKind::List => Dispatch::reply(source, Message::roster(registry.snapshot().as_slice())),
        MessageKind::Disconnect => {
            if let Some(name) = registry.deregister(source.id()) {
                info!("{} ({:?}) disconnected", source.id(), name);
            }
            Dispatch::close()
        }
        MessageKind::Error | MessageKind::Unknown(_) => {
            debug!("{} sent invalid request type {}", source.id(), message.kind);
            Dispatch::reply(source, Message::error("invalid request type"))
        }
    }
}

/// An inbound SEND names its recipient in `sender_name`; the forwarded copy
/// carries the source's registered name there instead.
fn route(message: Message, source: &ConnectionHandle, registry: &Registry) -> Dispatch {
    let Some(from) = registry.name_of(source.id()) else {
        return Dispatch::reply(
            source,
            Message::error("set a name before sending messages"),
        );
    };

    match registry.lookup(&message.sender_name) {
        Ok(recipient) => {
            debug!("routing message from {:?} to {:?}", from, message.sender_name);
            Dispatch::reply(&recipient, Message::send(from, message.body))
        }
        Err(e) => Dispatch::reply(source, Message::error(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_handle;
    use natter_protocol::SERVER_NAME;

    fn single(dispatch: &Dispatch) -> (&ConnectionHandle, &Message) {
        assert_eq!(dispatch.outbound.len(), 1, "expected exactly one outbound message");
        let (to, msg) = &dispatch.outbound[0];
        (to, msg)
    }

    #[test]
    fn test_connect_registers_silently() {
        let registry = Registry::new();
        let (a, _rx) = test_handle();

        let dispatch = handle(Message::connect("alice"), &a, &registry);

        assert!(dispatch.outbound.is_empty());
        assert!(!dispatch.close);
        assert_eq!(dispatch.named.as_deref(), Some("alice"));
        assert_eq!(registry.lookup("alice").unwrap(), a);
    }

    #[test]
    fn test_connect_conflicts_reply_with_error() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        let (b, _rb) = test_handle();
        handle(Message::connect("alice"), &a, &registry);

        let again = handle(Message::connect("alice2"), &a, &registry);
        let (to, msg) = single(&again);
        assert_eq!(to, &a);
        assert_eq!(msg.kind, MessageKind::Error);
        assert!(msg.body.contains("already registered"));

        assert!(again.named.is_none());

        let taken = handle(Message::connect("alice"), &b, &registry);
        let (to, msg) = single(&taken);
        assert_eq!(to, &b);
        assert_eq!(msg.kind, MessageKind::Error);
        assert!(msg.body.contains("already taken"));

        let invalid = handle(Message::connect("b:ob"), &b, &registry);
        let (_, msg) = single(&invalid);
        assert!(msg.body.contains("not valid"));

        assert_eq!(registry.snapshot(), vec!["alice".to_string()]);
        assert!(!taken.close && !invalid.close && !again.close);
    }

    #[test]
    fn test_send_rewrites_sender() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        let (b, _rb) = test_handle();
        handle(Message::connect("alice"), &a, &registry);
        handle(Message::connect("bob"), &b, &registry);

        let dispatch = handle(Message::send("bob", "hi"), &a, &registry);

        let (to, msg) = single(&dispatch);
        assert_eq!(to, &b);
        assert_eq!(msg, &Message::send("alice", "hi"));
    }

    #[test]
    fn test_send_to_unknown_recipient() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        let (b, _rb) = test_handle();
        handle(Message::connect("alice"), &a, &registry);
        handle(Message::connect("bob"), &b, &registry);

        let dispatch = handle(Message::send("carol", "hi"), &a, &registry);

        let (to, msg) = single(&dispatch);
        assert_eq!(to, &a);
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.sender_name, SERVER_NAME);
        assert!(msg.body.contains("not found"));
        assert_eq!(registry.snapshot(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_send_from_unnamed_connection() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        let (b, _rb) = test_handle();
        handle(Message::connect("bob"), &b, &registry);

        let dispatch = handle(Message::send("bob", "hi"), &a, &registry);

        let (to, msg) = single(&dispatch);
        assert_eq!(to, &a);
        assert_eq!(msg.kind, MessageKind::Error);
    }

    #[test]
    fn test_list_returns_roster() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        let (b, _rb) = test_handle();
        let (watcher, _rw) = test_handle();
        handle(Message::connect("alice"), &a, &registry);
        handle(Message::connect("bob"), &b, &registry);

        let dispatch = handle(Message::list(), &watcher, &registry);

        let (to, msg) = single(&dispatch);
        assert_eq!(to, &watcher);
        assert_eq!(msg.kind, MessageKind::List);
        let mut names: Vec<&str> = msg.body.lines().collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_disconnect_deregisters_and_closes() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();
        handle(Message::connect("alice"), &a, &registry);

        let dispatch = handle(Message::disconnect(), &a, &registry);

        assert!(dispatch.close);
        assert!(dispatch.outbound.is_empty());
        assert!(registry.is_empty());

        // unnamed connections may disconnect too
        let (b, _rb) = test_handle();
        assert!(handle(Message::disconnect(), &b, &registry).close);
    }

    #[test]
    fn test_invalid_request_type() {
        let registry = Registry::new();
        let (a, _ra) = test_handle();

        for kind in [MessageKind::Error, MessageKind::Unknown(0x7F)] {
            let dispatch = handle(Message::new(kind, "x", "y"), &a, &registry);
            let (to, msg) = single(&dispatch);
            assert_eq!(to, &a);
            assert_eq!(msg, &Message::error("invalid request type"));
            assert!(!dispatch.close);
        }
        assert!(registry.is_empty());
    }
}
