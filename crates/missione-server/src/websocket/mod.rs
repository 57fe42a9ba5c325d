//! WebSocket connection management and mission broadcasting.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client send handle (bounded queue to the writer task) |
//! | `broadcast` | Registry + fan-out: serialize once, send to all, prune failures |
//! | `handler` | `/ws` upgrade, greeting, read loop feeding the parser |
//!
//! ## Data Flow
//!
//! inbound frame → parser → store stamp → `broadcast` → every registered client.

pub mod broadcast;
pub mod connection;
pub mod handler;
