//! Transport seam between the connection manager and the network.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

/// Inbound text frames of one open connection. Ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("transport error: {0}")]
    Other(String),
}

/// Opens connections to the broadcaster.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FrameStream, TransportError>;
}

/// Production connector backed by tokio-tungstenite.
///
/// Yields text frames; binary frames are passed on when they are valid UTF-8.
/// Control frames are handled by the library and never surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            }
        });
        Ok(frames.boxed())
    }
}
