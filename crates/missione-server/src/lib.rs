//! # missione-server
//!
//! Axum HTTP + `WebSocket` mission relay.
//!
//! - HTTP endpoints: mission submit/poll, health check, Prometheus metrics,
//!   static assets
//! - `WebSocket` gateway at `/ws`: greeting on connect, inbound frames fed
//!   through the mission parser, fan-out of stamped missions to every
//!   connected client
//! - Last-known mission cache with a process-lifetime sequence counter
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod websocket;
