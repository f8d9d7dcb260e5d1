use std::sync::Arc;
use std::time::{Duration, Instant};

use alertline_core::{AlertSource, RawAlertFact};
use alertline_settings::ServerSettings;
use alertline_telemetry::MetricsRecorder;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broadcaster::Broadcaster;
use crate::event_bridge::FactBridge;
use crate::session;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub cleanup_interval: Duration,
    /// Buffer of the fact channel between sources and the bridge.
    pub fact_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            path: s.path.clone(),
            max_send_queue: s.max_send_queue,
            heartbeat_interval: s.heartbeat_interval(),
            client_timeout: s.client_timeout(),
            cleanup_interval: s.cleanup_interval(),
            fact_channel_capacity: 1024,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub metrics: Arc<MetricsRecorder>,
    pub heartbeat_interval: Duration,
    pub started_at: Instant,
    pub cancel: CancellationToken,
}

/// Build the Axum router: the viewer socket at `path`, plus `/health` and `/metrics`.
pub fn build_router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the source, bridge, cleanup and HTTP tasks, and return a handle.
pub async fn start(
    config: ServerConfig,
    source: Arc<dyn AlertSource>,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, std::io::Error> {
    // Nothing is spawned until the listener is bound.
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let cancel = CancellationToken::new();
    let broadcaster = Arc::new(
        Broadcaster::new(config.max_send_queue, config.client_timeout)
            .with_metrics(Arc::clone(&metrics)),
    );

    let (fact_tx, fact_rx) = broadcast::channel(config.fact_channel_capacity.max(1));

    let bridge = FactBridge::new(Arc::clone(&broadcaster))
        .with_metrics(Arc::clone(&metrics))
        .start(fact_rx, cancel.clone());

    let source_tx = fact_tx.clone();
    let source_cancel = cancel.clone();
    let source_task = tokio::spawn(async move { source.run(source_tx, source_cancel).await });

    let cleanup = session::start_cleanup_task(
        Arc::clone(&broadcaster),
        config.cleanup_interval,
        cancel.clone(),
    );

    let state = AppState {
        broadcaster: Arc::clone(&broadcaster),
        metrics,
        heartbeat_interval: config.heartbeat_interval,
        started_at: Instant::now(),
        cancel: cancel.clone(),
    };
    let router = build_router(state, &config.path);

    tracing::info!(addr = %local_addr, path = %config.path, "alert broadcaster started");

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "http server failed");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        facts: fact_tx,
        broadcaster,
        cancel,
        tasks: vec![server, bridge, source_task, cleanup],
    })
}

/// Handle returned by [`start`]. Keeps background tasks alive until [`shutdown`](Self::shutdown).
pub struct ServerHandle {
    pub port: u16,
    facts: broadcast::Sender<RawAlertFact>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Sender for external feeds; facts sent here are broadcast like generated ones.
    pub fn facts(&self) -> broadcast::Sender<RawAlertFact> {
        self.facts.clone()
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Stop every task and wait for the HTTP server to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "server task ended abnormally");
            }
        }
        tracing::info!("alert broadcaster stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (session_id, rx) = state.broadcaster.register();
    tracing::info!(session_id = %session_id, "viewer connected");

    session::handle_ws_connection(
        socket,
        session_id,
        rx,
        state.broadcaster,
        state.heartbeat_interval,
        state.cancel,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.broadcaster.count(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn config_from_settings() {
        let mut settings = ServerSettings::default();
        settings.port = 7001;
        settings.heartbeat_interval_ms = 1500;
        let config = ServerConfig::from(&settings);
        assert_eq!(config.port, 7001);
        assert_eq!(config.path, "/alerts");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1500));
        assert_eq!(config.client_timeout, Duration::from_secs(90));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn failed_bind_spawns_nothing() {
        struct CountingSource(Arc<AtomicUsize>);

        #[async_trait::async_trait]
        impl AlertSource for CountingSource {
            async fn run(
                &self,
                _tx: broadcast::Sender<RawAlertFact>,
                cancel: CancellationToken,
            ) {
                let mut ticker = tokio::time::interval(Duration::from_millis(10));
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            self.0.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }

        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();
        let ticks = Arc::new(AtomicUsize::new(0));
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            ..ServerConfig::default()
        };

        let result = start(
            config,
            Arc::new(CountingSource(Arc::clone(&ticks))),
            Arc::new(MetricsRecorder::new()),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn build_router_creates_routes() {
        let state = AppState {
            broadcaster: Arc::new(Broadcaster::new(32, Duration::from_secs(90))),
            metrics: Arc::new(MetricsRecorder::new()),
            heartbeat_interval: Duration::from_secs(30),
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
        };
        let _router = build_router(state, "/alerts");
    }
}
