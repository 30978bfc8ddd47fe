//! WebSocket plumbing for the channel gateway.
//!
//! The gateway writes into an unbounded mpsc channel; a writer task owns the
//! socket sink and drains that channel. Each connection gets a fresh pair.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use streaming::{ChannelError, Frame, Transport};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;

/// `Transport` backed by the outbound queue of one connection.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }
}

/// Encodes queued frames onto the socket until either side goes away.
pub fn spawn_writer(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Frame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.encode() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to encode frame: {e}");
                    continue;
                }
            };
            debug!("-> {text}");
            if let Err(e) = sink.send(Message::Text(text)).await {
                warn!("Failed to send frame: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    })
}
