//! WebSocket channel adapter

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::channel::{ChannelEvent, SignalChannel};
use crate::error::{AppError, Result};

enum WsCommand {
    Text(String),
    Close,
}

/// WebSocket-backed [`SignalChannel`]
///
/// A background task owns the socket; this handle only queues commands, so
/// `send_text` never waits on the network.
pub struct WsChannel {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    closed: AtomicBool,
}

impl WsChannel {
    /// Start connecting to `url`
    ///
    /// Returns immediately. [`ChannelEvent::Open`] arrives on the returned
    /// receiver once the handshake completes; frames sent before that are
    /// queued and flushed after it.
    pub fn connect(url: &str) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>)> {
        validate_url(url)?;
        info!("Connecting signaling channel to {}", url);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(url.to_string(), cmd_rx, event_tx));

        let channel = Arc::new(Self {
            url: url.to_string(),
            cmd_tx,
            closed: AtomicBool::new(false),
        });
        Ok((channel, event_rx))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SignalChannel for WsChannel {
    fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::ChannelClosed);
        }
        self.cmd_tx
            .send(WsCommand::Text(text))
            .map_err(|_| AppError::ChannelClosed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.cmd_tx.send(WsCommand::Close);
        }
    }
}

/// Only `ws://` and `wss://` URLs are accepted
fn validate_url(url: &str) -> Result<()> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Signaling url must start with ws:// or wss://: {}",
            url
        )))
    }
}

async fn run_socket(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("WebSocket connect to {} failed: {}", url, e);
            let _ = event_tx.send(ChannelEvent::Failure(e.to_string()));
            return;
        }
    };

    info!("WebSocket connected to {}", url);
    let _ = event_tx.send(ChannelEvent::Open);

    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WsCommand::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        let _ = event_tx.send(ChannelEvent::Failure(e.to_string()));
                        break;
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = event_tx.send(ChannelEvent::Closed {
                        code: 1000,
                        reason: "closed by client".to_string(),
                    });
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = event_tx.send(ChannelEvent::Text(text));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    debug!("Ignoring binary frame ({} bytes)", bytes.len());
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    info!("WebSocket closed by server code={} reason={}", code, reason);
                    let _ = event_tx.send(ChannelEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {}", e);
                    let _ = event_tx.send(ChannelEvent::Failure(e.to_string()));
                    break;
                }
                None => {
                    let _ = event_tx.send(ChannelEvent::Closed {
                        code: 1006,
                        reason: "stream ended".to_string(),
                    });
                    break;
                }
            },
        }
    }
}
