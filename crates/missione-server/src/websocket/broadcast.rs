//! Mission fan-out to connected WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE};

/// The registry of connected streaming clients plus the fan-out path.
///
/// Broadcast is best-effort: the record is serialized once, delivery is
/// attempted to every client registered at fan-out time, and any client
/// whose send fails is removed after the pass completes. Failures are never
/// surfaced to the publisher.
pub struct BroadcastManager {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Atomic counter tracking registered clients (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
}

impl BroadcastManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a client; it is immediately eligible for broadcast.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
    }

    /// Remove a client by ID. Removing an absent client is a no-op.
    pub async fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
    }

    /// Serialize `record` once and attempt delivery to every registered
    /// client, then prune the clients whose send failed.
    ///
    /// Two-phase on purpose: failures collected during the pass are applied
    /// under the write lock afterwards, so a mid-broadcast failure neither
    /// aborts delivery to the remaining clients nor mutates the registry
    /// while it is being iterated.
    pub async fn broadcast<T: Serialize>(&self, record: &T) {
        let json = match serde_json::to_string(record) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast record");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let conns = self.connections.read().await;
            for conn in conns.values() {
                if !conn.send(Arc::clone(&json)) {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id, "send failed, pruning client");
                    dead.push(conn.id.clone());
                }
            }
            debug!(
                recipients = conns.len() - dead.len(),
                pruned = dead.len(),
                "broadcast mission"
            );
        }

        if !dead.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &dead {
                if conns.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
            gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        }
    }

    /// Number of registered clients.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}
