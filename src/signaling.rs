use crate::error::SignalingError;
use crate::utils::channel_url;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Inbound half of the signaling channel for one (room, peer) pair.
/// Frames come out in arrival order. Dropping the channel closes it.
pub struct SignalingChannel {
    frames: mpsc::UnboundedReceiver<String>,
    _shutdown: Option<oneshot::Sender<()>>,
}

impl SignalingChannel {
    pub fn new(frames: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            frames,
            _shutdown: None,
        }
    }

    fn with_shutdown(frames: mpsc::UnboundedReceiver<String>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            frames,
            _shutdown: Some(shutdown),
        }
    }

    /// Next raw frame, or `None` once the remote side is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, room_id: &str, peer_id: &str) -> Result<SignalingChannel, SignalingError>;
}

/// Opens the channel as a WebSocket at `{base}?roomId=..&peerId=..`.
pub struct WsChannelConnector {
    base: Url,
}

impl WsChannelConnector {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ChannelConnector for WsChannelConnector {
    async fn open(&self, room_id: &str, peer_id: &str) -> Result<SignalingChannel, SignalingError> {
        let url = channel_url(&self.base, room_id, peer_id);
        info!(%url, "opening signaling channel");

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(pump(ws_stream, frames_tx, shutdown_rx));

        Ok(SignalingChannel::with_shutdown(frames_rx, shutdown_tx))
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Forwards text frames until the socket ends or the channel is dropped.
async fn pump(
    ws_stream: WsStream,
    frames: mpsc::UnboundedSender<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = write.send(Message::Close(None)).await;
                debug!("signaling channel closed locally");
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if frames.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("signaling channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "signaling channel read failed");
                    break;
                }
            }
        }
    }
}
