//! `/ws` upgrade and per-connection read/write loops.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use missione_core::mission::Hello;
use missione_core::parse::{Payload, parse_mission};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;
use crate::websocket::connection::{ClientConnection, next_connection_id};

/// GET /ws — upgrade to the mission stream.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max = state.config.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one streaming client from handshake to teardown.
///
/// Inbound `Text` and `Binary` frames both run through the mission parser;
/// a successful parse is stamped and broadcast, an unparseable frame is
/// dropped silently and the connection stays open. Deregistration runs
/// exactly once on every exit path.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_depth);
    let conn = Arc::new(ClientConnection::new(next_connection_id(), tx));

    // Writer task: drain the send queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.as_str().into())).await.is_err() {
                break;
            }
        }
    });

    state.broadcast.add(Arc::clone(&conn)).await;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(conn_id = %conn.id, "websocket client connected");

    // Greeting goes to this client only, never broadcast.
    if let Ok(hello) = serde_json::to_string(&Hello::connected()) {
        let _ = conn.send(Arc::new(hello));
    }

    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => Payload::Text(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => Payload::Binary(bytes.to_vec()),
            Ok(Message::Close(_)) | Err(_) => break,
            // Ping/pong are answered by the protocol layer.
            Ok(_) => continue,
        };
        match parse_mission(&payload) {
            Ok(mission) => {
                let _ = state.publish(mission).await;
            }
            Err(err) => {
                debug!(conn_id = %conn.id, %err, "ignoring unparseable frame");
            }
        }
    }

    state.broadcast.remove(&conn.id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
    writer.abort();
    info!(conn_id = %conn.id, "websocket client disconnected");
}
