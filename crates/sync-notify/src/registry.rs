//! Connection Registry (spec §4.8): three indexes over open connections,
//! plus the heartbeat lifecycle (started on the first connection, stopped
//! on the last disconnect).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sync_wire::RealtimeEvent;

use crate::connection::{Connection, ConnectionId};

struct Inner {
    connections: HashMap<ConnectionId, Arc<dyn Connection>>,
    connections_by_client: HashMap<String, HashSet<ConnectionId>>,
    scope_keys_by_client: HashMap<String, HashSet<String>>,
    connections_by_scope_key: HashMap<String, HashSet<ConnectionId>>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            connections_by_client: HashMap::new(),
            scope_keys_by_client: HashMap::new(),
            connections_by_scope_key: HashMap::new(),
            heartbeat: None,
        }
    }
}

/// A registered connection's unregister handle. Dropping it does nothing on
/// its own — callers must call [`ConnectionRegistry::unregister`]
/// explicitly, since unregistering may need to stop the heartbeat task,
/// which shouldn't happen implicitly on an unrelated drop.
#[derive(Debug, Clone, Copy)]
pub struct RegisteredConnection {
    pub id: ConnectionId,
}

/// Tracks open push channels per client, indexed by subscription scope keys
/// (spec §4.8). Cheap to clone — wraps an `Arc` internally.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<Inner>>,
    heartbeat_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            heartbeat_interval,
        }
    }

    /// Adds `conn` to all three indexes. Starts the periodic heartbeat if
    /// this is the first connection in the registry.
    pub fn register(
        &self,
        conn: Arc<dyn Connection>,
        initial_scope_keys: impl IntoIterator<Item = String>,
    ) -> RegisteredConnection {
        let id = conn.id();
        let client_id = conn.client_id().to_string();
        let scope_keys: HashSet<String> = initial_scope_keys.into_iter().collect();

        let mut inner = self.inner.lock().expect("connection registry lock poisoned");
        let was_empty = inner.connections.is_empty();

        inner.connections.insert(id, conn);
        inner
            .connections_by_client
            .entry(client_id.clone())
            .or_default()
            .insert(id);
        for key in &scope_keys {
            inner
                .connections_by_scope_key
                .entry(key.clone())
                .or_default()
                .insert(id);
        }
        inner.scope_keys_by_client.insert(client_id, scope_keys);

        if was_empty {
            inner.heartbeat = Some(self.spawn_heartbeat());
        }

        RegisteredConnection { id }
    }

    /// Replaces a client's scope-key set and incrementally updates the
    /// scope-key → connection reverse index for every connection that
    /// client currently has open.
    pub fn update_client_scope_keys(&self, client_id: &str, scope_keys: HashSet<String>) {
        let mut inner = self.inner.lock().expect("connection registry lock poisoned");
        let conn_ids: Vec<ConnectionId> = inner
            .connections_by_client
            .get(client_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();

        let previous = inner
            .scope_keys_by_client
            .insert(client_id.to_string(), scope_keys.clone())
            .unwrap_or_default();

        for removed_key in previous.difference(&scope_keys) {
            if let Some(set) = inner.connections_by_scope_key.get_mut(removed_key) {
                for id in &conn_ids {
                    set.remove(id);
                }
                if set.is_empty() {
                    inner.connections_by_scope_key.remove(removed_key);
                }
            }
        }
        for added_key in scope_keys.difference(&previous) {
            let set = inner
                .connections_by_scope_key
                .entry(added_key.clone())
                .or_default();
            for id in &conn_ids {
                set.insert(*id);
            }
        }
    }

    /// Union of connections subscribed to any of `scope_keys`, skipping
    /// closed connections and any client id in `exclude_client_ids`. Takes a
    /// snapshot of matching connections before invoking `visitor` so the
    /// visitor may itself call back into the registry (e.g. to unregister a
    /// dead connection) without deadlocking.
    pub fn for_each_connection_in_scope_keys(
        &self,
        scope_keys: &[String],
        exclude_client_ids: &[String],
        mut visitor: impl FnMut(&Arc<dyn Connection>),
    ) {
        let snapshot: Vec<Arc<dyn Connection>> = {
            let inner = self.inner.lock().expect("connection registry lock poisoned");
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for key in scope_keys {
                let Some(ids) = inner.connections_by_scope_key.get(key) else {
                    continue;
                };
                for id in ids {
                    if !seen.insert(*id) {
                        continue;
                    }
                    let Some(conn) = inner.connections.get(id) else {
                        continue;
                    };
                    if conn.is_closed() {
                        continue;
                    }
                    if exclude_client_ids.iter().any(|c| c == conn.client_id()) {
                        continue;
                    }
                    out.push(Arc::clone(conn));
                }
            }
            out
        };

        for conn in &snapshot {
            visitor(conn);
        }
    }

    /// Removes one connection from all indexes. Stops the heartbeat task if
    /// this was the last connection.
    pub fn unregister(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().expect("connection registry lock poisoned");
        self.remove_locked(&mut inner, id);
        self.stop_heartbeat_if_empty(&mut inner);
    }

    /// Closes and removes every connection for one client.
    pub fn close_client_connections(&self, client_id: &str) {
        let mut inner = self.inner.lock().expect("connection registry lock poisoned");
        let ids: Vec<ConnectionId> = inner
            .connections_by_client
            .get(client_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for id in ids {
            self.remove_locked(&mut inner, id);
        }
        self.stop_heartbeat_if_empty(&mut inner);
    }

    /// Closes and removes every open connection.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock().expect("connection registry lock poisoned");
        let ids: Vec<ConnectionId> = inner.connections.keys().copied().collect();
        for id in ids {
            self.remove_locked(&mut inner, id);
        }
        self.stop_heartbeat_if_empty(&mut inner);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().expect("connection registry lock poisoned").connections.len()
    }

    fn remove_locked(&self, inner: &mut Inner, id: ConnectionId) {
        let Some(conn) = inner.connections.remove(&id) else {
            return;
        };
        let client_id = conn.client_id().to_string();
        if let Some(set) = inner.connections_by_client.get_mut(&client_id) {
            set.remove(&id);
            if set.is_empty() {
                inner.connections_by_client.remove(&client_id);
            }
        }
        if let Some(keys) = inner.scope_keys_by_client.remove(&client_id) {
            for key in keys {
                if let Some(set) = inner.connections_by_scope_key.get_mut(&key) {
                    set.remove(&id);
                    if set.is_empty() {
                        inner.connections_by_scope_key.remove(&key);
                    }
                }
            }
        }
    }

    fn stop_heartbeat_if_empty(&self, inner: &mut Inner) {
        if inner.connections.is_empty() {
            if let Some(handle) = inner.heartbeat.take() {
                handle.abort();
            }
        }
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let interval = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot: Vec<Arc<dyn Connection>> = {
                    let guard = inner.lock().expect("connection registry lock poisoned");
                    guard.connections.values().cloned().collect()
                };
                for conn in snapshot {
                    let _ = conn.send(RealtimeEvent::Heartbeat);
                }
            }
        })
    }
}
