use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alertline_core::{encode_envelope, RawAlertFact, SessionId};
use alertline_telemetry::{names, MetricsRecorder};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A connected viewer.
pub struct ViewerSession {
    pub id: SessionId,
    tx: mpsc::Sender<String>,
    open: AtomicBool,
    registered_at: Instant,
    /// Milliseconds after `registered_at` of the last pong.
    last_pong_ms: AtomicU64,
}

impl ViewerSession {
    fn new(id: SessionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
            registered_at: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.last_pong_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    /// Whether a pong (or registration) happened within `timeout`.
    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong_ms.load(Ordering::Relaxed);
        let silent = Duration::from_millis(self.elapsed_ms().saturating_sub(last));
        silent < timeout
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.registered_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued to an open session.
    pub delivered: usize,
    /// Frames dropped because the session's queue was full.
    pub dropped: usize,
    /// Sessions found closed and removed.
    pub closed: usize,
}

/// Registry of open viewer sessions and the fan-out over them.
pub struct Broadcaster {
    sessions: DashMap<SessionId, Arc<ViewerSession>>,
    max_send_queue: usize,
    client_timeout: Duration,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Broadcaster {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            client_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a new viewer and return its ID + outbound queue.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let session = Arc::new(ViewerSession::new(id.clone(), tx));
        let _ = self.sessions.insert(id.clone(), session);
        if let Some(m) = &self.metrics {
            m.counter_inc(names::WS_SESSIONS_TOTAL, &[], 1);
        }
        self.publish_active();
        (id, rx)
    }

    /// Remove a viewer. Returns false if it was already gone.
    pub fn unregister(&self, id: &SessionId) -> bool {
        let removed = match self.sessions.remove(id) {
            Some((_, session)) => {
                session.mark_closed();
                true
            }
            None => false,
        };
        if removed {
            self.publish_active();
        }
        removed
    }

    pub fn record_pong(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id) {
            session.record_pong();
        }
    }

    /// Number of registered viewers.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<ViewerSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Send one fact to every open viewer.
    ///
    /// The frame is serialized once. Shard locks are held only while the
    /// session list is copied; a full or closed queue affects only its own
    /// session.
    pub fn broadcast(&self, fact: &RawAlertFact) -> BroadcastReport {
        match encode_envelope(fact) {
            Ok(frame) => self.broadcast_frame(&frame),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode alert envelope");
                BroadcastReport::default()
            }
        }
    }

    /// Send a pre-encoded frame to every open viewer.
    pub fn broadcast_frame(&self, frame: &str) -> BroadcastReport {
        let targets: Vec<Arc<ViewerSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut report = BroadcastReport::default();
        for session in targets {
            if !session.is_open() {
                report.closed += 1;
                let _ = self.unregister(&session.id);
                continue;
            }
            match session.tx.try_send(frame.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %session.id,
                        frame_len = frame.len(),
                        "send queue full, dropping alert"
                    );
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.closed += 1;
                    let _ = self.unregister(&session.id);
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.counter_inc(names::BROADCAST_DELIVERIES_TOTAL, &[], report.delivered as u64);
            if report.dropped > 0 {
                m.counter_inc(
                    names::BROADCAST_DROPS_TOTAL,
                    &[("reason", "queue_full")],
                    report.dropped as u64,
                );
            }
            if report.closed > 0 {
                m.counter_inc(
                    names::BROADCAST_DROPS_TOTAL,
                    &[("reason", "closed")],
                    report.closed as u64,
                );
            }
        }
        report
    }

    /// Remove viewers that haven't answered a ping within the client timeout.
    pub fn cleanup_dead_sessions(&self) -> usize {
        let dead: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                tracing::info!(session_id = %id, "cleaned up dead viewer");
            }
        }
        removed
    }

    fn publish_active(&self) {
        if let Some(m) = &self.metrics {
            m.gauge_set(names::WS_SESSIONS_ACTIVE, &[], self.sessions.len() as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster(queue: usize) -> Broadcaster {
        Broadcaster::new(queue, Duration::from_secs(90))
    }

    fn fact() -> RawAlertFact {
        RawAlertFact::new("WEB-03", "Failed login attempt detected")
    }

    #[test]
    fn register_and_unregister() {
        let b = broadcaster(32);
        assert_eq!(b.count(), 0);

        let (id1, _rx1) = b.register();
        let (id2, _rx2) = b.register();
        assert_ne!(id1, id2);
        assert_eq!(b.count(), 2);

        assert!(b.unregister(&id1));
        assert!(!b.unregister(&id1));
        assert_eq!(b.count(), 1);

        assert!(b.unregister(&id2));
        assert_eq!(b.count(), 0);
    }

    #[test]
    fn broadcast_with_no_sessions_is_empty() {
        let b = broadcaster(32);
        assert_eq!(b.broadcast(&fact()), BroadcastReport::default());
    }

    #[test]
    fn broadcast_reaches_every_session() {
        let b = broadcaster(32);
        let (_id1, mut rx1) = b.register();
        let (_id2, mut rx2) = b.register();

        let report = b.broadcast(&fact());
        assert_eq!(report.delivered, 2);

        let frame = rx1.try_recv().unwrap();
        assert_eq!(frame, rx2.try_recv().unwrap());
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "alert");
        assert_eq!(parsed["hostname"], "WEB-03");
    }

    #[test]
    fn late_joiner_gets_no_backfill() {
        let b = broadcaster(32);
        let (_early, mut early_rx) = b.register();
        b.broadcast(&fact());
        let (_late, mut late_rx) = b.register();

        assert!(early_rx.try_recv().is_ok());
        assert!(late_rx.try_recv().is_err());

        b.broadcast(&fact());
        assert!(late_rx.try_recv().is_ok());
    }

    #[test]
    fn full_queue_is_isolated() {
        let b = broadcaster(1);
        let (_slow, _slow_rx) = b.register();
        let (_fast, mut fast_rx) = b.register();

        let first = b.broadcast(&fact());
        assert_eq!(first.delivered, 2);
        fast_rx.try_recv().unwrap();

        let second = b.broadcast(&fact());
        assert_eq!(second, BroadcastReport { delivered: 1, dropped: 1, closed: 0 });
        assert!(fast_rx.try_recv().is_ok());
        assert_eq!(b.count(), 2);
    }

    #[test]
    fn closed_session_is_removed() {
        let b = broadcaster(8);
        let (_gone, gone_rx) = b.register();
        let (_live, mut live_rx) = b.register();
        drop(gone_rx);

        let report = b.broadcast(&fact());
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 0, closed: 1 });
        assert_eq!(b.count(), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_expired() {
        let b = broadcaster(8);
        let (stale, _rx1) = b.register();
        tokio::time::advance(Duration::from_secs(100)).await;
        let (_fresh, _rx2) = b.register();

        assert_eq!(b.cleanup_dead_sessions(), 1);
        assert_eq!(b.count(), 1);
        assert!(b.session(&stale).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_keeps_session_alive() {
        let b = broadcaster(8);
        let (id, _rx) = b.register();
        let session = b.session(&id).unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(!session.is_alive(Duration::from_secs(90)));

        b.record_pong(&id);
        assert!(session.is_alive(Duration::from_secs(90)));
        assert_eq!(b.cleanup_dead_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_keeps_fresh_viewer() {
        let b = Broadcaster::new(8, Duration::from_millis(500));
        let (_id, _rx) = b.register();
        assert_eq!(b.cleanup_dead_sessions(), 0);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(b.cleanup_dead_sessions(), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(b.cleanup_dead_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_not_truncated_to_seconds() {
        let b = Broadcaster::new(8, Duration::from_millis(1500));
        let (id, _rx) = b.register();
        tokio::time::advance(Duration::from_millis(1200)).await;
        assert!(b.session(&id).unwrap().is_alive(Duration::from_millis(1500)));
        assert_eq!(b.cleanup_dead_sessions(), 0);
    }

    #[test]
    fn unregister_marks_session_closed() {
        let b = broadcaster(8);
        let (id, _rx) = b.register();
        let session = b.session(&id).unwrap();
        assert!(session.is_open());
        b.unregister(&id);
        assert!(!session.is_open());
    }

    #[test]
    fn metrics_track_sessions_and_deliveries() {
        let metrics = Arc::new(MetricsRecorder::new());
        let b = broadcaster(1).with_metrics(Arc::clone(&metrics));
        let (a, _rx_a) = b.register();
        let (_b, _rx_b) = b.register();
        assert_eq!(metrics.counter_get(names::WS_SESSIONS_TOTAL, &[]), 2);
        assert!((metrics.gauge_get(names::WS_SESSIONS_ACTIVE, &[]) - 2.0).abs() < f64::EPSILON);

        b.broadcast(&fact());
        b.broadcast(&fact());
        assert_eq!(metrics.counter_get(names::BROADCAST_DELIVERIES_TOTAL, &[]), 2);
        assert_eq!(
            metrics.counter_get(names::BROADCAST_DROPS_TOTAL, &[("reason", "queue_full")]),
            2
        );

        b.unregister(&a);
        assert!((metrics.gauge_get(names::WS_SESSIONS_ACTIVE, &[]) - 1.0).abs() < f64::EPSILON);
    }
}
