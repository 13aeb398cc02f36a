//! Connection registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use eventsource_transport_traits::ConnectionId;
use parking_lot::Mutex;

/// Maps live transport connections to their owners.
///
/// Registration, lookup and removal are mutually exclusive. The map itself is
/// never handed out.
#[derive(Debug)]
pub struct ConnectionRegistry<T: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ConnectionId, Arc<T>>>,
}

impl<T: ?Sized> Default for ConnectionRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> ConnectionRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh connection handle owned by `owner`.
    pub fn register(&self, owner: Arc<T>) -> ConnectionId {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().insert(id, owner);
        id
    }

    /// Owner of `connection`, if still registered.
    pub fn lookup(&self, connection: ConnectionId) -> Option<Arc<T>> {
        self.entries.lock().get(&connection).cloned()
    }

    /// Forgets `connection`, returning its owner.
    pub fn remove(&self, connection: ConnectionId) -> Option<Arc<T>> {
        self.entries.lock().remove(&connection)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes every entry, returning the owners.
    pub fn drain(&self) -> Vec<(ConnectionId, Arc<T>)> {
        self.entries.lock().drain().collect()
    }
}
