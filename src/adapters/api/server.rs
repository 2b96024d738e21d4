//! HTTP Server - Query, Push, Health and Metrics Endpoints
//!
//! Serves via axum 0.7:
//! - `GET /api/v1/pairs/:pair/assets` both generations of one pair
//! - `GET /api/v1/pairs/:pair/assets/:symbol` current tick of one asset
//! - `GET /ws` push channel, one JSON notification per cycle
//! - `GET /live`, `GET /ready` liveness and readiness checks
//! - `GET /metrics` prometheus text exposition
//!
//! Readiness follows feed health: 503 while the feed is offline.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use super::gateway::Gateway;
use super::types::{AllAssetsPayload, ErrorBody, QueryResponse};
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::error::QueryError;
use crate::domain::snapshot::AssetTick;
use crate::ports::broadcast::Notification;

/// Handler state shared by every route.
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    metrics: Arc<MetricsRegistry>,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }
}

/// Axum server for the query surface, push channel and health checks.
pub struct ApiServer {
    gateway: Arc<Gateway>,
    metrics: Arc<MetricsRegistry>,
    bind_address: String,
}

impl ApiServer {
    /// Create a new server.
    pub fn new(gateway: Arc<Gateway>, metrics: Arc<MetricsRegistry>, bind_address: impl Into<String>) -> Self {
        Self {
            gateway,
            metrics,
            bind_address: bind_address.into(),
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/v1/pairs/:pair/assets", get(Self::all_assets))
            .route("/api/v1/pairs/:pair/assets/:symbol", get(Self::single_asset))
            .route("/ws", get(Self::push_upgrade))
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/metrics", get(Self::render_metrics))
            .with_state(AppState {
                gateway: Arc::clone(&self.gateway),
                metrics: Arc::clone(&self.metrics),
            })
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// # Errors
    /// Fails if the address cannot be bound or the server errors.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// # Errors
    /// Fails if the server errors.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = self.router();
        info!(address = %listener.local_addr()?, "API server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("API server stopped");
        Ok(())
    }

    async fn all_assets(
        State(state): State<AppState>,
        Path(pair): Path<String>,
    ) -> Result<Json<QueryResponse<AllAssetsPayload>>, QueryError> {
        state.gateway.get_all_assets(&pair).await.map(Json)
    }

    async fn single_asset(
        State(state): State<AppState>,
        Path((pair, symbol)): Path<(String, String)>,
    ) -> Result<Json<QueryResponse<AssetTick>>, QueryError> {
        state.gateway.get_single_asset(&pair, &symbol).await.map(Json)
    }

    /// Liveness: 200 while the process runs.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness: 200 unless the feed is offline.
    async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
        let feed = state.gateway.feed_state();
        if feed.is_active() {
            (StatusCode::OK, format!("READY ({feed})"))
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY ({feed})"))
        }
    }

    async fn render_metrics(State(state): State<AppState>) -> Response {
        match state.metrics.render() {
            Ok(text) => (StatusCode::OK, text).into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }

    async fn push_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
        let rx = state.gateway.subscribe();
        ws.on_upgrade(move |socket| push_notifications(socket, rx))
    }
}

/// Forward notifications to one subscriber until either side closes.
async fn push_notifications(socket: WebSocket, mut rx: broadcast::Receiver<Notification>) {
    let (mut sink, mut stream) = socket.split();
    debug!("Push subscriber connected");

    loop {
        tokio::select! {
            notification = rx.recv() => match notification {
                Ok(notification) => {
                    let Ok(text) = serde_json::to_string(&notification) else {
                        continue;
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push subscriber lagging, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Push subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::adapters::api::gateway::PUSH_CAPACITY;
    use crate::domain::state::StateStore;
    use crate::domain::telemetry::{FeedState, Telemetry};
    use crate::ports::clock::SystemClock;

    async fn spawn_server() -> (SocketAddr, Arc<Telemetry>, broadcast::Sender<()>) {
        let state = StateStore::from_template(&["eur".to_string()], &["BTC".to_string()]).into_shared();
        let telemetry = Arc::new(Telemetry::default());
        let gateway = Arc::new(Gateway::new(
            state,
            Arc::clone(&telemetry),
            Arc::new(SystemClock),
            PUSH_CAPACITY,
        ));
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let server = ApiServer::new(gateway, metrics, "127.0.0.1:0");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(server.serve(listener, shutdown_rx));
        (addr, telemetry, shutdown_tx)
    }

    #[tokio::test]
    async fn test_query_routes() {
        let (addr, _, shutdown_tx) = spawn_server().await;
        let base = format!("http://{addr}");

        let ok = reqwest::get(format!("{base}/api/v1/pairs/eur/assets")).await.unwrap();
        assert_eq!(ok.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = ok.json().await.unwrap();
        assert_eq!(body["feed_state"], "offline");
        assert_eq!(body["data"]["pair"], "eur");

        let single = reqwest::get(format!("{base}/api/v1/pairs/eur/assets/BTC")).await.unwrap();
        assert_eq!(single.status(), reqwest::StatusCode::OK);

        let missing = reqwest::get(format!("{base}/api/v1/pairs/eur/assets/DOGE")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        shutdown_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_readiness_follows_feed_state() {
        let (addr, telemetry, shutdown_tx) = spawn_server().await;
        let url = format!("http://{addr}/ready");

        assert_eq!(
            reqwest::get(&url).await.unwrap().status(),
            reqwest::StatusCode::SERVICE_UNAVAILABLE
        );
        telemetry.set(FeedState::Degraded);
        assert_eq!(reqwest::get(&url).await.unwrap().status(), reqwest::StatusCode::OK);

        shutdown_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_metrics_exposed() {
        let (addr, _, shutdown_tx) = spawn_server().await;
        let text = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("price_relay_feed_state"));
        shutdown_tx.send(()).unwrap();
    }
}
