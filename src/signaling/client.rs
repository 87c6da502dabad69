//! Signaling client
//!
//! Ties a channel adapter to the message bus and the correlation engine. One
//! worker task drains inbound channel events in order: text frames are
//! decoded and published on the bus, closure or failure fails every
//! outstanding request at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::MessageBus;
use super::channel::{ChannelEvent, SignalChannel};
use super::correlation::Correlator;
use super::message::Message;
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};

/// Channel lifecycle as seen by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

pub struct SignalingClient {
    bus: Arc<MessageBus>,
    correlator: Arc<Correlator>,
    channel: Arc<dyn SignalChannel>,
    state_rx: watch::Receiver<ChannelState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingClient {
    /// Start the channel worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        channel: Arc<dyn SignalChannel>,
        inbound: mpsc::UnboundedReceiver<ChannelEvent>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let bus = Arc::new(MessageBus::new());
        let correlator = Arc::new(Correlator::new(bus.clone(), channel.clone()));
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);

        let worker = tokio::spawn(run_worker(
            inbound,
            bus.clone(),
            correlator.clone(),
            events,
            state_tx,
        ));

        Arc::new(Self {
            bus,
            correlator,
            channel,
            state_rx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Correlated request
    pub async fn request(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.correlator.send_correlated(message, timeout).await
    }

    /// Correlated request from a blocking thread
    pub fn request_blocking(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.correlator.send_correlated_blocking(message, timeout)
    }

    /// Fire-and-forget message
    pub fn notify(&self, message: &Message) -> Result<()> {
        self.correlator.send(message)
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn state(&self) -> ChannelState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the channel reports open
    pub async fn wait_open(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();
        let wait = rx.wait_for(|s| *s != ChannelState::Connecting);
        let settled = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => Some(state.clone()),
            Ok(Err(_)) => None,
            Err(_) => {
                return Err(AppError::Timeout {
                    action: "open".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        match settled {
            Some(ChannelState::Open) => Ok(()),
            _ => Err(AppError::ChannelClosed),
        }
    }

    /// Close the channel and fail outstanding requests
    pub fn close(&self) {
        self.channel.close();
        self.correlator.fail_all();
    }

    /// Wait for the worker to drain after the channel closes
    pub async fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    bus: Arc<MessageBus>,
    correlator: Arc<Correlator>,
    events: Arc<EventBus>,
    state_tx: watch::Sender<ChannelState>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            ChannelEvent::Open => {
                info!("Signaling channel open");
                let _ = state_tx.send(ChannelState::Open);
                events.publish(SessionEvent::ChannelOpened);
            }
            ChannelEvent::Text(text) => match Message::decode(&text) {
                Ok(message) => {
                    debug!("<- {}", text);
                    if bus.publish(&message) == 0 {
                        debug!("No listener for action '{}'", message.action);
                    }
                }
                Err(e) => warn!("Dropping malformed message: {} ({})", e, text),
            },
            ChannelEvent::Closed { code, reason } => {
                info!("Signaling channel closed code={} reason={}", code, reason);
                correlator.fail_all();
                let _ = state_tx.send(ChannelState::Closed);
                events.publish(SessionEvent::ChannelClosed { code, reason });
                break;
            }
            ChannelEvent::Failure(error) => {
                warn!("Signaling channel failed: {}", error);
                correlator.fail_all();
                let _ = state_tx.send(ChannelState::Closed);
                events.publish(SessionEvent::ChannelFailed { error });
                break;
            }
        }
    }

    // Event source gone without a close event
    correlator.fail_all();
    let _ = state_tx.send(ChannelState::Closed);
    debug!("Signaling worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::channel::LoopbackChannel;
    use crate::signaling::ListenerMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_worker_publishes_in_order_and_survives_garbage() {
        let (channel, inbound, peer) = LoopbackChannel::new();
        let client = SignalingClient::start(Arc::new(channel), inbound, Arc::new(EventBus::new()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        client.bus().subscribe(
            ListenerMode::Persistent,
            |_| true,
            move |m| s.lock().push(m.str_field("n").unwrap_or("?").to_string()),
        );

        peer.inbound.send(ChannelEvent::Open).unwrap();
        peer.inbound
            .send(ChannelEvent::Text(r#"{"action":"newuser","n":"1"}"#.to_string()))
            .unwrap();
        peer.inbound
            .send(ChannelEvent::Text("{broken".to_string()))
            .unwrap();
        peer.inbound
            .send(ChannelEvent::Text(r#"{"action":"newuser","n":"2"}"#.to_string()))
            .unwrap();
        peer.inbound
            .send(ChannelEvent::Closed {
                code: 1000,
                reason: "bye".to_string(),
            })
            .unwrap();

        client.join_worker().await;
        assert_eq!(*seen.lock(), vec!["1".to_string(), "2".to_string()]);
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_requests_promptly() {
        let (channel, inbound, mut peer) = LoopbackChannel::new();
        let client = SignalingClient::start(Arc::new(channel), inbound, Arc::new(EventBus::new()));

        let failures = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for action in ["loginRoom", "produce"] {
            let c = client.clone();
            let failures = failures.clone();
            tasks.push(tokio::spawn(async move {
                let r = c.request(Message::new(action), Duration::from_secs(60)).await;
                if matches!(r, Err(AppError::ChannelClosed)) {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            }));
            let _ = peer.outbound.recv().await.unwrap();
        }

        peer.inbound
            .send(ChannelEvent::Closed {
                code: 1001,
                reason: "going away".to_string(),
            })
            .unwrap();

        let all = futures::future::join_all(tasks);
        tokio::time::timeout(Duration::from_secs(1), all)
            .await
            .expect("requests should fail without waiting for their timeouts");
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_open() {
        let (channel, inbound, peer) = LoopbackChannel::new();
        let client = SignalingClient::start(Arc::new(channel), inbound, Arc::new(EventBus::new()));
        assert_eq!(client.state(), ChannelState::Connecting);

        peer.inbound.send(ChannelEvent::Open).unwrap();
        client.wait_open(Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.state(), ChannelState::Open);
    }

    #[tokio::test]
    async fn test_wait_open_reports_failure() {
        let (channel, inbound, peer) = LoopbackChannel::new();
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let client = SignalingClient::start(Arc::new(channel), inbound, events);

        peer.inbound
            .send(ChannelEvent::Failure("refused".to_string()))
            .unwrap();
        assert!(matches!(
            client.wait_open(Duration::from_secs(1)).await,
            Err(AppError::ChannelClosed)
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::ChannelFailed { .. }
        ));
    }
}
