use std::sync::Arc;

use alertline_core::RawAlertFact;
use alertline_telemetry::{names, MetricsRecorder};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;

/// Subscribes to the fact channel and fans each fact out to connected viewers.
pub struct FactBridge {
    broadcaster: Arc<Broadcaster>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl FactBridge {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the forwarding task. Ends when the channel closes or `cancel` fires.
    pub fn start(
        self,
        mut rx: broadcast::Receiver<RawAlertFact>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(fact) => {
                        if let Some(m) = &self.metrics {
                            m.counter_inc(names::BROADCAST_FACTS_TOTAL, &[], 1);
                        }
                        let report = self.broadcaster.broadcast(&fact);
                        tracing::debug!(
                            hostname = %fact.hostname,
                            delivered = report.delivered,
                            dropped = report.dropped,
                            closed = report.closed,
                            "alert broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "fact bridge lagged, dropped facts");
                        if let Some(m) = &self.metrics {
                            m.counter_inc(names::BROADCAST_DROPS_TOTAL, &[("reason", "lagged")], n);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("fact channel closed");
                        break;
                    }
                }
            }
        })
    }
}
