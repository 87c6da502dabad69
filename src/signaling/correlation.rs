//! Request/response correlation
//!
//! Each correlated request gets a fresh `requestId`. A one-shot bus listener
//! waits for the reply carrying the same id and action. The listener and the
//! pending entry are removed on every exit path: reply, timeout, channel
//! closure, send failure, or the caller dropping the future.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::bus::{ListenerId, ListenerMode, MessageBus};
use super::channel::SignalChannel;
use super::message::Message;
use crate::error::{AppError, Result};

/// An outstanding correlated request
struct PendingRequest {
    action: String,
    deadline: Instant,
    listener: Option<ListenerId>,
    tx: oneshot::Sender<Result<Message>>,
}

type PendingMap = Arc<Mutex<HashMap<u64, PendingRequest>>>;

/// Snapshot of an outstanding request, for diagnostics
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub request_id: u64,
    pub action: String,
    pub deadline: Instant,
}

/// Correlation engine
pub struct Correlator {
    bus: Arc<MessageBus>,
    channel: Arc<dyn SignalChannel>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: AtomicBool,
    runtime: Handle,
}

impl Correlator {
    /// Create a correlator bound to the current tokio runtime
    ///
    /// Must be called from within a runtime context.
    pub fn new(bus: Arc<MessageBus>, channel: Arc<dyn SignalChannel>) -> Self {
        Self::with_runtime(bus, channel, Handle::current())
    }

    pub fn with_runtime(
        bus: Arc<MessageBus>,
        channel: Arc<dyn SignalChannel>,
        runtime: Handle,
    ) -> Self {
        Self {
            bus,
            channel,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            runtime,
        }
    }

    /// Send `message` and wait for its reply
    pub async fn send_correlated(&self, mut message: Message, timeout: Duration) -> Result<Message> {
        if self.is_closed() {
            return Err(AppError::ChannelClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        message.request_id = Some(id);
        let action = message.action.clone();
        let text = message.encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingRequest {
                action: action.clone(),
                deadline: Instant::now() + timeout,
                listener: None,
                tx,
            },
        );
        // Dropped on every return path below
        let _guard = PendingGuard {
            id,
            bus: &self.bus,
            pending: &self.pending,
        };

        let pending = self.pending.clone();
        let reply_action = action.clone();
        let listener = self.bus.subscribe(
            ListenerMode::OneShot,
            move |msg| msg.request_id == Some(id) && msg.action == reply_action,
            move |msg| {
                if let Some(req) = pending.lock().remove(&id) {
                    let _ = req.tx.send(Ok(msg.clone()));
                }
            },
        );

        {
            let mut pending = self.pending.lock();
            match pending.get_mut(&id) {
                Some(req) => req.listener = Some(listener),
                // Failed by a closure that raced the registration
                None => {
                    self.bus.unsubscribe(listener);
                }
            }
        }
        // A closure between the first check and registration must not be missed
        if self.is_closed() {
            return Err(AppError::ChannelClosed);
        }

        debug!("-> {} (requestId={})", action, id);
        self.channel.send_text(text)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                if result.is_ok() {
                    debug!("<- {} (requestId={})", action, id);
                }
                result
            }
            Ok(Err(_)) => Err(AppError::ChannelClosed),
            Err(_) => {
                warn!("Request {} (requestId={}) timed out", action, id);
                Err(AppError::Timeout {
                    action,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Blocking variant of [`send_correlated`](Self::send_correlated)
    ///
    /// For synchronous media-engine callbacks running on a blocking thread
    /// (e.g. inside `spawn_blocking`). Never call this from an async task or
    /// from the channel worker: it parks the calling thread until the reply
    /// arrives or the timeout elapses.
    pub fn send_correlated_blocking(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.runtime.block_on(self.send_correlated(message, timeout))
    }

    /// Send without waiting for a reply
    pub fn send(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::ChannelClosed);
        }
        debug!("-> {} (no reply expected)", message.action);
        self.channel.send_text(message.encode()?)
    }

    /// Fail every outstanding request with [`AppError::ChannelClosed`]
    ///
    /// Also refuses all future requests.
    pub fn fail_all(&self) {
        self.closed.store(true, Ordering::Release);

        let drained: Vec<(u64, PendingRequest)> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            warn!(
                "Failing {} outstanding request(s): channel closed",
                drained.len()
            );
        }
        for (_, req) in drained {
            if let Some(listener) = req.listener {
                self.bus.unsubscribe(listener);
            }
            let _ = req.tx.send(Err(AppError::ChannelClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Outstanding requests, oldest id first
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        let mut list: Vec<PendingInfo> = self
            .pending
            .lock()
            .iter()
            .map(|(id, req)| PendingInfo {
                request_id: *id,
                action: req.action.clone(),
                deadline: req.deadline,
            })
            .collect();
        list.sort_by_key(|p| p.request_id);
        list
    }
}

/// Removes the pending entry and its bus listener when a request finishes
struct PendingGuard<'a> {
    id: u64,
    bus: &'a MessageBus,
    pending: &'a Mutex<HashMap<u64, PendingRequest>>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let removed = self.pending.lock().remove(&self.id);
        if let Some(listener) = removed.and_then(|req| req.listener) {
            self.bus.unsubscribe(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::channel::{LoopbackChannel, LoopbackPeer};

    fn setup() -> (Arc<MessageBus>, Arc<Correlator>, LoopbackPeer) {
        let (channel, _events, peer) = LoopbackChannel::new();
        let bus = Arc::new(MessageBus::new());
        let correlator = Arc::new(Correlator::new(bus.clone(), Arc::new(channel)));
        (bus, correlator, peer)
    }

    async fn next_request(peer: &mut LoopbackPeer) -> Message {
        let text = peer.outbound.recv().await.unwrap();
        Message::decode(&text).unwrap()
    }

    #[tokio::test]
    async fn test_reply_resolves_request() {
        let (bus, correlator, mut peer) = setup();
        assert_eq!(bus.listener_count(), 0);

        let c = correlator.clone();
        let task = tokio::spawn(async move {
            c.send_correlated(
                Message::new("produce").with("kind", "audio"),
                Duration::from_secs(5),
            )
            .await
        });

        let request = next_request(&mut peer).await;
        assert_eq!(request.action, "produce");
        let id = request.request_id.unwrap();
        assert_eq!(bus.listener_count(), 1);

        bus.publish(
            &Message::new("produce")
                .with_request_id(id)
                .with("producerId", "p1"),
        );

        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply.str_field("producerId").unwrap(), "p1");
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_listener() {
        let (bus, correlator, mut peer) = setup();

        let result = correlator
            .send_correlated(Message::new("loginRoom"), Duration::from_millis(50))
            .await;

        assert!(matches!(result, Err(AppError::Timeout { ref action, .. }) if action == "loginRoom"));
        assert!(peer.outbound.try_recv().is_ok());
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_same_action_requests_do_not_cross_resolve() {
        let (bus, correlator, mut peer) = setup();

        let c1 = correlator.clone();
        let first = tokio::spawn(async move {
            c1.send_correlated(Message::new("produce"), Duration::from_secs(5))
                .await
        });
        let first_req = next_request(&mut peer).await;

        let c2 = correlator.clone();
        let second = tokio::spawn(async move {
            c2.send_correlated(Message::new("produce"), Duration::from_secs(5))
                .await
        });
        let second_req = next_request(&mut peer).await;
        assert_ne!(first_req.request_id, second_req.request_id);

        // Reply to the second request first
        bus.publish(
            &Message::new("produce")
                .with_request_id(second_req.request_id.unwrap())
                .with("producerId", "second"),
        );
        bus.publish(
            &Message::new("produce")
                .with_request_id(first_req.request_id.unwrap())
                .with("producerId", "first"),
        );

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.str_field("producerId").unwrap(), "first");
        assert_eq!(second.str_field("producerId").unwrap(), "second");
    }

    #[tokio::test]
    async fn test_reply_without_matching_id_is_ignored() {
        let (bus, correlator, mut peer) = setup();

        let c = correlator.clone();
        let task = tokio::spawn(async move {
            c.send_correlated(Message::new("loginRoom"), Duration::from_millis(200))
                .await
        });
        let _ = next_request(&mut peer).await;

        // Same action, no id: not ours
        bus.publish(&Message::new("loginRoom"));

        assert!(matches!(
            task.await.unwrap(),
            Err(AppError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_all_on_close() {
        let (bus, correlator, mut peer) = setup();

        let mut tasks = Vec::new();
        for action in ["loginRoom", "createWebRtcTransport"] {
            let c = correlator.clone();
            tasks.push(tokio::spawn(async move {
                c.send_correlated(Message::new(action), Duration::from_secs(30))
                    .await
            }));
            let _ = next_request(&mut peer).await;
        }
        assert_eq!(correlator.pending_count(), 2);

        let started = Instant::now();
        correlator.fail_all();

        for task in tasks {
            assert!(matches!(task.await.unwrap(), Err(AppError::ChannelClosed)));
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bus.listener_count(), 0);

        // Later requests fail fast without touching the channel
        let result = correlator
            .send_correlated(Message::new("produce"), Duration::from_secs(30))
            .await;
        assert!(matches!(result, Err(AppError::ChannelClosed)));
        assert!(peer.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_failure_cleans_up() {
        let (bus, correlator, peer) = setup();
        drop(peer);

        let result = correlator
            .send_correlated(Message::new("produce"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(AppError::Channel(_))));
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_requests_snapshot() {
        let (_bus, correlator, mut peer) = setup();

        let c = correlator.clone();
        let _task = tokio::spawn(async move {
            c.send_correlated(Message::new("produce"), Duration::from_secs(5))
                .await
        });
        let _ = next_request(&mut peer).await;

        let pending = correlator.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, "produce");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_send_from_blocking_thread() {
        let (bus, correlator, mut peer) = setup();

        let c = correlator.clone();
        let task = tokio::task::spawn_blocking(move || {
            c.send_correlated_blocking(Message::new("produce"), Duration::from_secs(5))
        });

        let request = next_request(&mut peer).await;
        bus.publish(
            &Message::new("produce")
                .with_request_id(request.request_id.unwrap())
                .with("producerId", "p9"),
        );

        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply.str_field("producerId").unwrap(), "p9");
    }
}
