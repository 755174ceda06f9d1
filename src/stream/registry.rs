//! Registry of connected stream clients
//!
//! Entries are added when a client's task starts and removed when it ends; nothing
//! else mutates the map.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Short unique identifier for one connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("cli_{}", &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the server knows about a connected client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub connected: usize,
    pub total_accepted: u64,
}

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<ClientId, ClientInfo>,
    total_accepted: u64,
}

/// Thread-safe set of live connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection and return its id
    pub fn add(&self, peer: Option<SocketAddr>) -> ClientId {
        let id = ClientId::generate();
        let info = ClientInfo {
            id: id.clone(),
            peer,
            connected_at: Utc::now(),
        };
        let mut inner = self.inner.lock();
        inner.clients.insert(id.clone(), info);
        inner.total_accepted += 1;
        id
    }

    /// Forget a connection; returns its info if it was registered
    pub fn remove(&self, id: &ClientId) -> Option<ClientInfo> {
        self.inner.lock().clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every live entry, oldest first
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self.inner.lock().clients.values().cloned().collect();
        clients.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        clients
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            connected: inner.clients.len(),
            total_accepted: inner.total_accepted,
        }
    }
}
