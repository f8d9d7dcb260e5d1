use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alertline_core::{decode_envelope, Alert};
use alertline_settings::ClientSettings;
use alertline_telemetry::{names, MetricsRecorder};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::{Connector, FrameStream, TransportError};

/// Connectivity of a [`ConnectionManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. `attempt` counts consecutive failures since the last
    /// successful open.
    Disconnected { attempt: u32 },
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Fixed-delay, capped retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3_000),
            max_attempts: 5,
        }
    }
}

impl From<&ClientSettings> for ReconnectPolicy {
    fn from(s: &ClientSettings) -> Self {
        Self {
            delay: s.reconnect_delay(),
            max_attempts: s.max_reconnect_attempts,
        }
    }
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns one logical connection to the broadcaster.
///
/// A single driver task opens the transport, decodes frames into alerts for
/// the injected channel, and sleeps between retries. Retrying stops after
/// `max_attempts` consecutive failures until [`restart`](Self::restart).
pub struct ConnectionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

struct Shared {
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    alerts: mpsc::Sender<Alert>,
    metrics: Option<Arc<MetricsRecorder>>,
    attempt: AtomicU32,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        alerts: mpsc::Sender<Alert>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected { attempt: 0 });
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                connector,
                policy,
                alerts,
                metrics: None,
                attempt: AtomicU32::new(0),
                state,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Attach a metrics recorder. Only effective before the first `start`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = Some(metrics);
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch channel that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Spawn the driver. No-op while a driver is still running.
    pub fn start(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            tracing::debug!(url = %self.shared.url, "connection manager already running");
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(Arc::clone(&self.shared), cancel.clone()));
        *driver = Some(Driver { cancel, handle });
    }

    /// Stop the driver and drop the transport. No reconnect fires afterwards.
    ///
    /// The state becomes `Disconnected` with the failure counter preserved.
    pub async fn close(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver.cancel.cancel();
            if let Err(e) = driver.handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "connection driver ended abnormally");
                }
            }
        }
        let attempt = self.shared.attempt.load(Ordering::SeqCst);
        self.shared.publish(ConnectionState::Disconnected { attempt });
        tracing::info!(url = %self.shared.url, "connection closed");
    }

    /// Close, reset the failure counter, and start again.
    pub async fn restart(&self) {
        self.close().await;
        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.publish(ConnectionState::Disconnected { attempt: 0 });
        self.start();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

impl Shared {
    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn count(&self, name: &str, labels: &[(&str, &str)]) {
        if let Some(m) = &self.metrics {
            m.counter_inc(name, labels, 1);
        }
    }

    /// Forward frames until the transport ends. `Ok(false)` means the alert
    /// receiver is gone and the driver should stop.
    async fn pump(&self, mut frames: FrameStream) -> Result<bool, TransportError> {
        while let Some(frame) = frames.next().await {
            let text = frame?;
            match decode_envelope(&text) {
                Ok(fact) => {
                    let alert = Alert::from_fact(fact);
                    tracing::debug!(
                        alert_id = %alert.id,
                        hostname = %alert.hostname,
                        severity = %alert.severity,
                        "alert received"
                    );
                    self.count(names::CLIENT_ALERTS_RECEIVED_TOTAL, &[]);
                    if self.alerts.send(alert).await.is_err() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        kind = e.error_kind(),
                        error = %e,
                        "discarding malformed payload"
                    );
                    self.count(names::CLIENT_PAYLOADS_MALFORMED_TOTAL, &[("kind", e.error_kind())]);
                }
            }
        }
        Ok(true)
    }
}

async fn drive(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        shared.publish(ConnectionState::Connecting);
        tracing::debug!(url = %shared.url, "connecting");

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = shared.connector.connect(&shared.url) => opened,
        };

        match opened {
            Ok(frames) => {
                shared.count(names::CLIENT_CONNECT_ATTEMPTS_TOTAL, &[("outcome", "success")]);
                shared.attempt.store(0, Ordering::SeqCst);
                shared.publish(ConnectionState::Connected);
                tracing::info!(url = %shared.url, "connected");

                let ended = tokio::select! {
                    _ = cancel.cancelled() => return,
                    ended = shared.pump(frames) => ended,
                };
                match ended {
                    Ok(true) => tracing::info!(url = %shared.url, "connection closed by peer"),
                    Ok(false) => {
                        tracing::info!("alert receiver dropped, stopping connection");
                        shared.publish(ConnectionState::Disconnected {
                            attempt: shared.attempt.load(Ordering::SeqCst),
                        });
                        return;
                    }
                    Err(e) => tracing::warn!(url = %shared.url, error = %e, "connection lost"),
                }
            }
            Err(e) => {
                shared.count(names::CLIENT_CONNECT_ATTEMPTS_TOTAL, &[("outcome", "failure")]);
                tracing::warn!(url = %shared.url, error = %e, "connect failed");
            }
        }

        let attempt = shared.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        shared.publish(ConnectionState::Disconnected { attempt });

        if attempt >= shared.policy.max_attempts {
            tracing::warn!(attempt, "reconnect attempts exhausted, giving up");
            return;
        }
        tracing::info!(attempt, delay_ms = shared.policy.delay.as_millis() as u64, "reconnecting");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.policy.delay) => {}
        }
    }
}
