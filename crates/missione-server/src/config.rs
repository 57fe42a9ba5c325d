//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the mission relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Directory served at `/` (index.html and assets).
    pub static_dir: PathBuf,
    /// Max inbound message/body size in bytes.
    pub max_message_size: usize,
    /// Per-client send queue depth; a client that falls this far behind is
    /// treated as dead and pruned on the next broadcast.
    pub send_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            static_dir: PathBuf::from("./static"),
            max_message_size: 1024 * 1024, // 1 MiB
            send_queue_depth: 32,
        }
    }
}
