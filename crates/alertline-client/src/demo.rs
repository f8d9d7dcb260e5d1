use std::sync::Arc;

use alertline_core::{Alert, AlertSource, RawAlertFact};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Run `source` locally and feed its facts, normalized, into `alerts`.
///
/// Used by the viewer when no live broadcaster is involved. Stops when
/// `cancel` fires or the receiver is dropped.
pub fn spawn_demo_feed(
    source: Arc<dyn AlertSource>,
    alerts: mpsc::Sender<Alert>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = broadcast::channel::<RawAlertFact>(16);
    let source_cancel = cancel.child_token();
    let source_task = tokio::spawn(async move { source.run(tx, source_cancel).await });

    tokio::spawn(async move {
        loop {
            let fact = tokio::select! {
                _ = cancel.cancelled() => break,
                fact = rx.recv() => fact,
            };
            match fact {
                Ok(fact) => {
                    if alerts.send(Alert::from_fact(fact)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "demo feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        source_task.abort();
        tracing::debug!("demo feed stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alertline_core::SyntheticSource;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_classified_alerts_on_interval() {
        let source = Arc::new(SyntheticSource::with_interval(Duration::from_millis(5000)));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = spawn_demo_feed(source.clone(), tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(rx.try_recv().is_err());

        let alert = rx.recv().await.unwrap();
        assert!(source.catalog().hostnames().contains(&alert.hostname));
        assert_eq!(alert.severity, alertline_core::classify(&alert.message));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_dropped() {
        let source = Arc::new(SyntheticSource::with_interval(Duration::from_millis(100)));
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_demo_feed(source, tx, CancellationToken::new());
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
