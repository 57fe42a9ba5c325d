//! `MissioneServer` — axum HTTP + WebSocket mission relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use missione_core::mission::{Mission, StampedMission};
use missione_core::parse::{Payload, parse_mission};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{MISSIONS_PUBLISHED_TOTAL, SUBMIT_REJECTED_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::store::MissionStore;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::handler::ws_handler;

/// Error payload returned for any rejected submit.
const INVALID_PAYLOAD: &str = "Invalid payload. Use JSON or 'S-P-L-M'.";

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Last-known mission cache + sequence counter.
    pub store: Arc<MissionStore>,
    /// Client registry + fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle, when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Stamp a validated mission, cache it, and fan it out to every
    /// connected streaming client.
    pub async fn publish(&self, mission: Mission) -> StampedMission {
        let stamped = self.store.stamp(mission);
        counter!(MISSIONS_PUBLISHED_TOTAL).increment(1);
        self.broadcast.broadcast(&stamped).await;
        stamped
    }
}

/// The mission relay server.
pub struct MissioneServer {
    config: Arc<ServerConfig>,
    store: Arc<MissionStore>,
    broadcast: Arc<BroadcastManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl MissioneServer {
    /// Create a new server with fresh state.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(MissionStore::new()),
            broadcast: Arc::new(BroadcastManager::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle, enabling `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            store: self.store.clone(),
            broadcast: self.broadcast.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/setMissione", post(set_mission_handler))
            .route("/checkMissione", get(check_mission_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(self.config.max_message_size))
            .with_state(state)
    }

    /// Bind the configured address (port 0 auto-assigns) and serve until
    /// the shutdown token is cancelled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "server error");
            }
        });

        info!(%addr, static_dir = %self.config.static_dir.display(), "mission relay listening");
        Ok((addr, handle))
    }

    /// Get the mission store.
    pub fn store(&self) -> &Arc<MissionStore> {
        &self.store
    }

    /// Get the broadcast manager.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct SubmitResponse {
    ok: bool,
    mission: StampedMission,
}

#[derive(Serialize)]
struct CheckResponse {
    ok: bool,
    mission: Option<StampedMission>,
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: &'static str,
}

/// POST /setMissione — submit a mission.
///
/// `application/json` bodies are decoded as structured data; any other
/// content type is handed to the parser as raw text. A body that cannot be
/// read (including one over the size limit) or decoded degrades to a
/// payload the parser rejects, so every failure takes the same 400 path.
async fn set_mission_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let payload = body.ok().and_then(|body| {
        if is_json {
            serde_json::from_slice(&body).ok().map(Payload::Json)
        } else {
            Some(Payload::Text(String::from_utf8_lossy(&body).into_owned()))
        }
    });

    match payload.as_ref().map(parse_mission) {
        Some(Ok(mission)) => {
            let stamped = state.publish(mission).await;
            Json(SubmitResponse {
                ok: true,
                mission: stamped,
            })
            .into_response()
        }
        Some(Err(_)) | None => {
            counter!(SUBMIT_REJECTED_TOTAL).increment(1);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    ok: false,
                    error: INVALID_PAYLOAD,
                }),
            )
                .into_response()
        }
    }
}

/// GET /checkMissione — last published mission, for polling clients.
async fn check_mission_handler(State(state): State<AppState>) -> Json<CheckResponse> {
    Json(CheckResponse {
        ok: true,
        mission: state.store.last(),
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.connection_count();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn make_server() -> MissioneServer {
        MissioneServer::new(ServerConfig::default())
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn submit_text_plain_dashed() {
        let app = make_server().router();
        let resp = app
            .oneshot(post("/setMissione", "text/plain", "7-3-0-5"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["mission"]["scaffale"], 7);
        assert_eq!(parsed["mission"]["posto"], 3);
        assert_eq!(parsed["mission"]["livello"], 0);
        assert_eq!(parsed["mission"]["missione"], 5);
        assert_eq!(parsed["mission"]["seq"], 1);
        assert!(parsed["mission"]["ts"].is_number());
    }

    #[tokio::test]
    async fn submit_json_object() {
        let app = make_server().router();
        let resp = app
            .oneshot(post(
                "/setMissione",
                "application/json",
                r#"{"scaffale":1,"posto":2,"livello":3,"missione":4}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["mission"]["scaffale"], 1);
        assert_eq!(parsed["mission"]["missione"], 4);
    }

    #[tokio::test]
    async fn sequence_increments_across_submits() {
        let server = make_server();
        let first = server
            .router()
            .oneshot(post(
                "/setMissione",
                "application/json",
                r#"{"scaffale":1,"posto":1,"livello":1,"missione":1}"#,
            ))
            .await
            .unwrap();
        let second = server
            .router()
            .oneshot(post(
                "/setMissione",
                "application/json",
                r#"{"scaffale":1,"posto":1,"livello":1,"missione":1}"#,
            ))
            .await
            .unwrap();
        let seq1 = body_json(first).await["mission"]["seq"].as_u64().unwrap();
        let seq2 = body_json(second).await["mission"]["seq"].as_u64().unwrap();
        assert_eq!(seq2, seq1 + 1);
    }

    #[tokio::test]
    async fn submit_rejection_is_machine_readable() {
        let app = make_server().router();
        let resp = app
            .oneshot(post("/setMissione", "text/plain", "1-2-3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"], "Invalid payload. Use JSON or 'S-P-L-M'.");
    }

    #[tokio::test]
    async fn malformed_json_body_rejects() {
        // Dashed text under a JSON content type must NOT fall back to the
        // text interpretation.
        let app = make_server().router();
        let resp = app
            .oneshot(post("/setMissione", "application/json", "7-3-0-5"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_string_body_takes_the_text_rules() {
        // A quoted JSON body carries text: both the dashed form and a
        // JSON-encoded object string are accepted.
        let app = make_server().router();
        let resp = app
            .oneshot(post("/setMissione", "application/json", r#""4-12-1-2""#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["mission"]["scaffale"], 4);
        assert_eq!(parsed["mission"]["posto"], 12);

        let app = make_server().router();
        let resp = app
            .oneshot(post(
                "/setMissione",
                "application/json",
                r#""{\"scaffale\":1,\"posto\":2,\"livello\":3,\"missione\":4}""#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["mission"]["missione"], 4);
    }

    #[tokio::test]
    async fn oversized_body_takes_the_standard_rejection_path() {
        let config = ServerConfig {
            max_message_size: 16,
            ..ServerConfig::default()
        };
        let app = MissioneServer::new(config).router();
        let body = "9-9-9-9 ".repeat(16);
        let resp = app
            .oneshot(post("/setMissione", "text/plain", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"], "Invalid payload. Use JSON or 'S-P-L-M'.");
    }

    #[tokio::test]
    async fn json_array_body_rejects() {
        let app = make_server().router();
        let resp = app
            .oneshot(post("/setMissione", "application/json", "[1,2,3,4]"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_content_type_is_treated_as_text() {
        let app = make_server().router();
        let req = Request::builder()
            .method("POST")
            .uri("/setMissione")
            .body(Body::from("4-12-1-2"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn check_mission_is_null_before_first_publish() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/checkMissione")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["ok"], true);
        assert!(parsed["mission"].is_null());
    }

    #[tokio::test]
    async fn check_mission_returns_last_stamped_record() {
        let server = make_server();
        let submit = server
            .router()
            .oneshot(post("/setMissione", "text/plain", "4-12-1-2"))
            .await
            .unwrap();
        let submitted = body_json(submit).await;

        let check = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/checkMissione")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let polled = body_json(check).await;
        assert_eq!(polled["mission"], submitted["mission"]);
    }

    #[tokio::test]
    async fn check_mission_has_no_side_effects() {
        let server = make_server();
        for _ in 0..3 {
            let resp = server
                .router()
                .oneshot(
                    Request::builder()
                        .uri("/checkMissione")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let parsed = body_json(resp).await;
            assert!(parsed["mission"].is_null());
        }
        assert!(server.store().last().is_none());
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_404_without_recorder() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_path_falls_through_to_static_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/no/such/asset.js")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_dir_serves_index_at_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>missioni</h1>").unwrap();

        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let app = MissioneServer::new(config).router();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>missioni</h1>");
    }

    #[tokio::test]
    async fn publish_updates_store_and_seq() {
        let server = make_server();
        let state = AppState {
            store: server.store().clone(),
            broadcast: server.broadcast().clone(),
            config: Arc::new(ServerConfig::default()),
            start_time: Instant::now(),
            metrics: None,
        };
        let mission = Mission {
            scaffale: 9,
            posto: 8,
            livello: 7,
            missione: 6,
        };
        let stamped = state.publish(mission).await;
        assert_eq!(stamped.seq, 1);
        assert_eq!(stamped.mission(), mission);
        assert_eq!(server.store().last(), Some(stamped));
    }
}
