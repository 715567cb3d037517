//! `GroupcastServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use groupcast_core::Hub;
use groupcast_settings::GroupcastSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::echo::EchoHandler;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::trigger::add_handler;
use crate::websocket::{run_session, SessionHandler, SessionOptions};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The connection directory and group registry.
    pub hub: Arc<Hub>,
    /// Application callbacks for every session.
    pub handler: Arc<dyn SessionHandler>,
    /// Effective settings.
    pub settings: Arc<GroupcastSettings>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The groupcast server.
pub struct GroupcastServer {
    settings: Arc<GroupcastSettings>,
    hub: Arc<Hub>,
    handler: Arc<dyn SessionHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl GroupcastServer {
    /// Create a server running the echo application.
    pub fn new(settings: GroupcastSettings) -> Self {
        let hub = Arc::new(Hub::new(settings.server.queue_capacity));
        let handler: Arc<dyn SessionHandler> = Arc::new(EchoHandler::new(&settings.app));
        Self {
            settings: Arc::new(settings),
            hub,
            handler,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Replace the session handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            handler: Arc::clone(&self.handler),
            settings: Arc::clone(&self.settings),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(home_handler))
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .route("/add", any(add_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    /// The listener stops once the shutdown token is cancelled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.settings.server.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Stop accepting, close every connection, and wait for sessions to
    /// finish within the configured shutdown timeout.
    pub async fn shutdown_gracefully(&self) -> bool {
        self.shutdown
            .graceful_shutdown(&self.hub, Some(self.settings.server.shutdown_timeout()))
            .await
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the effective settings.
    pub fn settings(&self) -> &GroupcastSettings {
        &self.settings
    }
}

/// GET /
async fn home_handler() -> &'static str {
    "Home page"
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.hub.group_count(),
    ))
}

/// GET /ws
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let options = SessionOptions::from(&state.settings.server);
    let tracker = state.shutdown.tracker().clone();
    let hub = state.hub;
    let handler = state.handler;

    ws.max_message_size(state.settings.server.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = tracker
                .track_future(run_session(socket, hub, handler, options))
                .await;
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> GroupcastServer {
        let mut settings = GroupcastSettings::default();
        settings.server.port = 0;
        GroupcastServer::new(settings)
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_owned()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.hub().connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.settings().app.group, "demo");
        assert_eq!(server.hub().queue_capacity(), 256);
    }

    #[tokio::test]
    async fn home_page() {
        let (status, body) = send(make_server().router(), "GET", "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Home page");
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server();
        let (conn, _rx) = server.hub().register();
        server.hub().join("demo", conn.id()).unwrap();

        let (status, body) = send(server.router(), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        let parsed = json(&body);
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 1);
        assert_eq!(parsed["groups"], 1);
    }

    #[tokio::test]
    async fn add_broadcasts_to_group() {
        let server = make_server();
        let (conn, mut rx) = server.hub().register();
        server.hub().join("demo", conn.id()).unwrap();

        let (status, body) = send(server.router(), "POST", "/add", r#"{"data": 42}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"result": 42}));

        let frame = rx.recv().await.unwrap();
        assert_eq!(json(&frame), serde_json::json!({"added": 42}));
    }

    #[tokio::test]
    async fn add_without_data_broadcasts_one() {
        let server = make_server();
        let (conn, mut rx) = server.hub().register();
        server.hub().join("demo", conn.id()).unwrap();

        let (status, body) = send(server.router(), "POST", "/add", "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"result": 1}));
        assert_eq!(json(&rx.recv().await.unwrap()), serde_json::json!({"added": 1}));
    }

    #[tokio::test]
    async fn add_with_no_members_still_succeeds() {
        let (status, body) =
            send(make_server().router(), "POST", "/add", r#"{"data": "x"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"result": "x"}));
    }

    #[tokio::test]
    async fn add_rejects_malformed_json() {
        let server = make_server();
        let (conn, mut rx) = server.hub().register();
        server.hub().join("demo", conn.id()).unwrap();

        let (status, body) = send(server.router(), "POST", "/add", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body), serde_json::json!({"error": "Invalid JSON"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_rejects_other_methods() {
        for method in ["GET", "PUT", "DELETE"] {
            let (status, body) = send(make_server().router(), method, "/add", "").await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(json(&body), serde_json::json!({"error": "POST request required"}));
        }
    }

    #[tokio::test]
    async fn ws_requires_upgrade() {
        let (status, _) = send(make_server().router(), "GET", "/ws", "").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = send(make_server().router(), "GET", "/nonexistent", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.shutdown_gracefully().await);
        handle.await.unwrap();
    }
}
