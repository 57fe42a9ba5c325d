//! Per-client WebSocket connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique connection id.
pub fn next_connection_id() -> String {
    format!("conn_{}", NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
}

/// A connected streaming client.
///
/// Membership in the broadcast registry is the only state tracked per
/// client; there is no identity beyond the handle itself.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Bounded queue drained by the connection's socket writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
}

impl ClientConnection {
    /// Create a new connection handle around a writer-task queue.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
        }
    }

    /// Queue a text frame for the writer task.
    ///
    /// Returns `false` when the queue is full or the writer is gone; the
    /// broadcaster treats that as a dead client and prunes it.
    pub fn send(&self, message: Arc<String>) -> bool {
        self.tx.try_send(message).is_ok()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(4);
        (ClientConnection::new(next_connection_id(), tx), rx)
    }

    #[test]
    fn ids_are_unique() {
        let a = next_connection_id();
        let b = next_connection_id();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }

    #[tokio::test]
    async fn send_delivers_to_queue() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_queue_fails() {
        let (tx, rx) = mpsc::channel(4);
        let conn = ClientConnection::new(next_connection_id(), tx);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
    }

    #[tokio::test]
    async fn send_to_full_queue_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(next_connection_id(), tx);
        assert!(conn.send(Arc::new("first".into())));
        assert!(!conn.send(Arc::new("second".into())));
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let before = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > before);
    }
}
