//! Registry of live server-side connections.
//!
//! The registry is the only state shared between connection tasks. The
//! server reserves an entry with [`SessionRegistry::try_insert`] after the
//! upgrade request validated and before the `101` response is written, so the
//! connection limit is checked and claimed under one lock. The entry is
//! removed if that write fails, and otherwise when the connection task ends.
//! Entries are always complete: readers see a session either fully
//! registered or absent.

use crate::websocket::connection::ConnectionHandle;
use crate::websocket::frame::{CloseCode, Message, MessageKind};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

/// A registered connection.
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    /// Handle for sending on the connection.
    pub handle: ConnectionHandle,
    /// Remote address.
    pub peer_addr: SocketAddr,
    /// Request path from the upgrade request.
    pub path: String,
    /// When the upgrade completed.
    pub connected_at: Instant,
}

/// Concurrent map from connection identity to its session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnectionId, RegisteredSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any entry with the same id.
    pub async fn insert(&self, id: ConnectionId, session: RegisteredSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
    }

    /// Register a session unless `limit` sessions are already present.
    ///
    /// Returns `false` when the registry is full.
    pub async fn try_insert(
        &self,
        id: ConnectionId,
        session: RegisteredSession,
        limit: usize,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= limit {
            return false;
        }
        sessions.insert(id, session);
        true
    }

    /// Deregister a session.
    pub async fn remove(&self, id: ConnectionId) -> Option<RegisteredSession> {
        self.sessions.write().await.remove(&id)
    }

    /// Look up a session.
    pub async fn get(&self, id: ConnectionId) -> Option<RegisteredSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Whether a session is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Registered ids, in ascending order.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn snapshot(sessions: &HashMap<ConnectionId, RegisteredSession>) -> Vec<ConnectionHandle> {
        sessions.values().map(|s| s.handle.clone()).collect()
    }

    /// Send a message to every registered session.
    ///
    /// Returns the number of sessions that accepted it.
    pub async fn broadcast(&self, kind: MessageKind, payload: Bytes) -> usize {
        let handles = Self::snapshot(&*self.sessions.read().await);
        let mut delivered = 0;
        for handle in handles {
            let message = Message {
                kind,
                payload: payload.clone(),
            };
            match handle.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(id = handle.id(), error = %e, "broadcast skipped"),
            }
        }
        delivered
    }

    /// Start the closing handshake on every registered session.
    pub async fn close_all(&self, code: CloseCode, reason: &str) {
        let handles = Self::snapshot(&*self.sessions.read().await);
        for handle in handles {
            if let Err(e) = handle.close(code, reason).await {
                debug!(id = handle.id(), error = %e, "close skipped");
            }
        }
    }
}
