use std::sync::Arc;
use std::time::Duration;

use alertline_core::SessionId;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;

/// Drive one viewer socket until it closes, errors, or the server shuts down.
///
/// The writer forwards queued frames and pings every `heartbeat`; the reader
/// records pongs. Viewers have nothing to say, so inbound text is ignored.
pub async fn handle_ws_connection(
    socket: WebSocket,
    session_id: SessionId,
    mut rx: mpsc::Receiver<String>,
    broadcaster: Arc<Broadcaster>,
    heartbeat: Duration,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_sid = session_id.clone();
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(session_id = %writer_sid, "sent ping");
                }
            }
        }
    });

    let reader_sid = session_id.clone();
    let reader_broadcaster = Arc::clone(&broadcaster);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Pong(_) => reader_broadcaster.record_pong(&reader_sid),
                WsMessage::Text(text) => {
                    tracing::debug!(
                        session_id = %reader_sid,
                        len = text.len(),
                        "ignoring viewer text frame"
                    );
                }
                WsMessage::Close(_) => break,
                // axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if broadcaster.unregister(&session_id) {
        tracing::info!(session_id = %session_id, "viewer disconnected");
    }
}

/// Periodically remove viewers that stopped answering pings.
pub fn start_cleanup_task(
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = broadcaster.cleanup_dead_sessions();
                    if removed > 0 {
                        tracing::info!(removed, "dead viewer cleanup");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_reaps_silent_viewers() {
        let broadcaster = Arc::new(Broadcaster::new(8, Duration::from_secs(90)));
        let (_id, _rx) = broadcaster.register();
        let cancel = CancellationToken::new();
        let handle = start_cleanup_task(
            Arc::clone(&broadcaster),
            Duration::from_secs(60),
            cancel.clone(),
        );

        // First sweep at 60s: still within the timeout.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(broadcaster.count(), 1);

        // Second sweep at 120s: silent for longer than 90s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(broadcaster.count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_task_stops_on_cancel() {
        let broadcaster = Arc::new(Broadcaster::new(8, Duration::from_secs(90)));
        let cancel = CancellationToken::new();
        let handle = start_cleanup_task(broadcaster, Duration::from_millis(10), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
