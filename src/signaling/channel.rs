//! Channel adapter interface
//!
//! The signaling core only needs ordered, reliable delivery of whole text
//! messages. Anything that can push [`ChannelEvent`]s into an mpsc receiver and
//! accept outbound text can back a session.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::error::{AppError, Result};

/// Inbound channel event
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Text(String),
    Closed { code: u16, reason: String },
    Failure(String),
}

/// Outbound half of a signaling channel
pub trait SignalChannel: Send + Sync {
    /// Queue a text frame for sending. Must not block on the network.
    fn send_text(&self, text: String) -> Result<()>;

    /// Close the channel. Idempotent.
    fn close(&self);
}

/// In-memory channel
///
/// Outbound frames land in the receiver returned by [`LoopbackChannel::new`]
/// together with a sender that injects inbound events, so a scripted peer can
/// play the server side.
pub struct LoopbackChannel {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    closed: AtomicBool,
}

/// Server-side ends of a [`LoopbackChannel`]
pub struct LoopbackPeer {
    /// Frames the client sent
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Inject events as if they came from the network
    pub inbound: mpsc::UnboundedSender<ChannelEvent>,
}

impl LoopbackChannel {
    /// Create a channel, the event stream the client consumes, and the peer ends
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>, LoopbackPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let channel = Self {
            outbound: out_tx,
            inbound: in_tx.clone(),
            closed: AtomicBool::new(false),
        };
        let peer = LoopbackPeer {
            outbound: out_rx,
            inbound: in_tx,
        };
        (channel, in_rx, peer)
    }
}

impl SignalChannel for LoopbackChannel {
    fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::ChannelClosed);
        }
        self.outbound
            .send(text)
            .map_err(|_| AppError::Channel("loopback peer dropped".to_string()))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.inbound.send(ChannelEvent::Closed {
                code: 1000,
                reason: "closed by client".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let (channel, mut events, mut peer) = LoopbackChannel::new();

        channel.send_text("hello".to_string()).unwrap();
        assert_eq!(peer.outbound.recv().await.unwrap(), "hello");

        peer.inbound.send(ChannelEvent::Text("world".to_string())).unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Text("world".to_string())
        );
    }

    #[tokio::test]
    async fn test_loopback_close_is_idempotent() {
        let (channel, mut events, _peer) = LoopbackChannel::new();

        channel.close();
        channel.close();

        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Closed { code: 1000, .. }
        ));
        assert!(events.try_recv().is_err());
        assert!(matches!(
            channel.send_text("late".to_string()),
            Err(AppError::ChannelClosed)
        ));
    }
}
