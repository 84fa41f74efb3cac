use std::collections::hash_map::Entry;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::packet::Packet;

/// Registry handle to a live session: the sending end of its inbox plus the
///  done flag through which the session signals that it can be torn down. The
///  session state itself is owned exclusively by the session task.
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::Sender<Packet>,
    done: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn done_flag(&self) -> DoneFlag {
        DoneFlag(self.done.clone())
    }

    /// Non-blocking enqueue. A full or closed inbox drops the packet - the
    ///  producer must never crash or block on a session's behalf.
    pub fn try_enqueue(&self, packet: Packet) -> bool {
        match self.inbox.try_send(packet) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to buffer packet for session: {}", e);
                false
            }
        }
    }
}

/// The session task's side of the done signal.
#[derive(Clone)]
pub struct DoneFlag(Arc<AtomicBool>);

impl DoneFlag {
    pub fn mark_done(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub fn for_test() -> DoneFlag {
        DoneFlag(Arc::new(AtomicBool::new(false)))
    }

    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Concurrent map from peer endpoint to session handle. `get_or_create` is
///  atomic: for a given key, exactly one caller receives the freshly created
///  inbox receiver.
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<SocketAddrV4, SessionHandle>>,
    inbox_capacity: usize,
}

impl SessionRegistry {
    pub fn new(inbox_capacity: usize) -> SessionRegistry {
        SessionRegistry {
            sessions: Mutex::new(FxHashMap::default()),
            inbox_capacity,
        }
    }

    pub fn get_or_create(&self, key: SocketAddrV4) -> (SessionHandle, Option<mpsc::Receiver<Packet>>) {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");

        match sessions.entry(key) {
            Entry::Occupied(e) => (e.get().clone(), None),
            Entry::Vacant(e) => {
                let (tx, rx) = mpsc::channel(self.inbox_capacity);
                let handle = SessionHandle {
                    inbox: tx,
                    done: Arc::new(AtomicBool::new(false)),
                };
                e.insert(handle.clone());
                (handle, Some(rx))
            }
        }
    }

    /// Detaches the session. Dropping the stored sender closes the inbox once
    ///  the session task drains it; enqueues racing with removal fail silently
    ///  in `try_enqueue`.
    pub fn remove(&self, key: &SocketAddrV4) {
        let removed = self.sessions.lock().expect("session registry lock poisoned").remove(key);

        if removed.is_some() {
            debug!("closing session inbox for {}", key);
        } else {
            warn!("session {} was already removed", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use bytes::Bytes;
    use std::net::Ipv4Addr;

    fn key() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 45123)
    }

    fn packet(seq_no: u32) -> Packet {
        Packet::new(PacketType::Data, seq_no, key(), Bytes::new())
    }

    #[test]
    fn test_get_or_create_creates_exactly_once() {
        let registry = SessionRegistry::new(4);

        let (_, first) = registry.get_or_create(key());
        assert!(first.is_some());

        let (_, second) = registry.get_or_create(key());
        assert!(second.is_none());
    }

    #[test]
    fn test_enqueue_dequeue() {
        let registry = SessionRegistry::new(4);
        let (handle, rx) = registry.get_or_create(key());
        let mut rx = rx.unwrap();

        assert!(handle.try_enqueue(packet(4)));
        assert_eq!(rx.try_recv().unwrap().seq_no, 4);
    }

    #[test]
    fn test_enqueue_on_full_inbox_drops() {
        let registry = SessionRegistry::new(1);
        let (handle, _rx) = registry.get_or_create(key());

        assert!(handle.try_enqueue(packet(4)));
        assert!(!handle.try_enqueue(packet(5)));
    }

    #[test]
    fn test_enqueue_after_remove_fails_silently() {
        let registry = SessionRegistry::new(4);
        let (handle, rx) = registry.get_or_create(key());

        drop(rx);
        registry.remove(&key());
        assert!(!handle.try_enqueue(packet(4)));
    }

    #[test]
    fn test_double_remove_is_not_fatal() {
        let registry = SessionRegistry::new(4);
        let _ = registry.get_or_create(key());

        registry.remove(&key());
        registry.remove(&key());
    }

    #[test]
    fn test_remove_then_recreate() {
        let registry = SessionRegistry::new(4);
        let _ = registry.get_or_create(key());
        registry.remove(&key());

        let (_, recreated) = registry.get_or_create(key());
        assert!(recreated.is_some());
    }
}
