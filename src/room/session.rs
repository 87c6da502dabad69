//! Room session state machine
//!
//! A [`RoomSession`] owns everything one room entry needs: the negotiated
//! capability set, the two transports, and the producer and consumer
//! collections. All state sits behind one `RwLock` that is never held
//! across a network round trip: each operation checks and reserves under
//! the lock, releases it for the request, then commits the result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::device::Device;
use super::stats::{StatsReporter, StatsSnapshot};
use super::types::{
    Consumer, ConsumerInfo, Direction, MediaKind, Producer, TransportInfo, WebRtcTransportData,
};
use crate::config::{AppConfig, MediaConfig};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::media::{MediaEngine, MediaTransport, ProduceOptions, TransportHandler};
use crate::signaling::{action, request, ListenerId, Message, SignalingClient};

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub room_id: String,
    pub request_timeout: Duration,
    /// Bound for requests made from blocking media engine callbacks
    pub callback_timeout: Duration,
    pub media: MediaConfig,
    /// `None` disables periodic stats
    pub stats_interval: Option<Duration>,
}

impl SessionOptions {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self::from_config(&AppConfig::default()).with_room(room_id)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            room_id: config.server.room_id.clone(),
            request_timeout: Duration::from_millis(config.signaling.request_timeout_ms),
            callback_timeout: Duration::from_millis(config.signaling.callback_timeout_ms),
            media: config.media.clone(),
            stats_interval: config
                .stats
                .enabled
                .then(|| Duration::from_millis(config.stats.interval_ms)),
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = room_id.into();
        self
    }
}

/// Result of [`RoomSession::consume`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Consumed(Consumer),
    /// No recv transport yet; replayed when it is created
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum JoinState {
    #[default]
    Idle,
    Joining,
    Joined,
}

struct LocalTransport {
    info: TransportInfo,
    handle: Arc<dyn MediaTransport>,
}

#[derive(Default)]
struct RoomState {
    join: JoinState,
    send_transport: Option<LocalTransport>,
    recv_transport: Option<LocalTransport>,
    /// Directions with a create request in flight
    creating: HashSet<Direction>,
    producers: HashMap<String, Producer>,
    /// Kinds with a produce in flight
    producing: HashSet<MediaKind>,
    consumers: HashMap<String, Consumer>,
    pending_consumers: Vec<ConsumerInfo>,
    closed: bool,
}

impl RoomState {
    fn transport(&self, direction: Direction) -> Option<&LocalTransport> {
        match direction {
            Direction::Send => self.send_transport.as_ref(),
            Direction::Recv => self.recv_transport.as_ref(),
        }
    }

    fn transport_slot(&mut self, direction: Direction) -> &mut Option<LocalTransport> {
        match direction {
            Direction::Send => &mut self.send_transport,
            Direction::Recv => &mut self.recv_transport,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(AppError::State("session closed".to_string()));
        }
        Ok(())
    }
}

/// One room entry
pub struct RoomSession {
    options: SessionOptions,
    signaling: Arc<SignalingClient>,
    engine: Arc<dyn MediaEngine>,
    events: Arc<EventBus>,
    device: RwLock<Device>,
    state: RwLock<RoomState>,
    listeners: Mutex<Vec<ListenerId>>,
    stats: Mutex<Option<StatsReporter>>,
    /// Bumped whenever an in-flight join or transport creation settles
    progress: watch::Sender<()>,
}

/// Releases an in-flight reservation and wakes waiters, on every exit path
struct InFlight<'a, F: FnMut(&mut RoomState)> {
    session: &'a RoomSession,
    release: F,
}

impl<F: FnMut(&mut RoomState)> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        {
            let mut state = self.session.state.write();
            (self.release)(&mut *state);
        }
        self.session.progress.send_replace(());
    }
}

impl RoomSession {
    /// Create a session and subscribe to room notifications
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        signaling: Arc<SignalingClient>,
        engine: Arc<dyn MediaEngine>,
        events: Arc<EventBus>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            options,
            signaling,
            engine,
            events,
            device: RwLock::new(Device::new()),
            state: RwLock::new(RoomState::default()),
            listeners: Mutex::new(Vec::new()),
            stats: Mutex::new(None),
            progress: watch::channel(()).0,
        });

        session.attach_notifications();
        if let Some(interval) = session.options.stats_interval {
            *session.stats.lock() = Some(StatsReporter::spawn(Arc::downgrade(&session), interval));
        }
        session
    }

    fn attach_notifications(self: &Arc<Self>) {
        let bus = self.signaling.bus();

        let events = self.events.clone();
        let new_user = bus.subscribe_action(action::NEW_USER, move |msg| {
            match msg.str_field("userId") {
                Ok(user_id) => {
                    info!("New user joined: {}", user_id);
                    events.publish(SessionEvent::NewUser {
                        user_id: user_id.to_string(),
                    });
                }
                Err(e) => warn!("Dropping newuser notification: {}", e),
            }
        });

        // Consuming blocks on the media engine, so hand off to a task instead
        // of running it on the channel worker
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsumerInfo>();
        let new_consumer = bus.subscribe_action(action::NEW_CONSUMER, move |msg| {
            match msg.field::<ConsumerInfo>("consumerData") {
                Ok(info) => {
                    debug!("newconsumer id={} kind={}", info.id, info.kind);
                    let _ = tx.send(info);
                }
                Err(e) => warn!("Dropping newconsumer notification: {}", e),
            }
        });

        self.listeners.lock().extend([new_user, new_consumer]);

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(info) = rx.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                let consumer_id = info.id.clone();
                if let Err(e) = session.consume(info).await {
                    warn!("Failed to consume {}: {}", consumer_id, e);
                }
            }
        });
    }

    // ========================================================================
    // Capability negotiation and join
    // ========================================================================

    /// Fetch the room's RTP capabilities and load the device. No-op once loaded.
    pub async fn load_device(&self) -> Result<()> {
        let loaded = self.device.read().is_loaded();
        if loaded {
            debug!("load_device() device already loaded");
            return Ok(());
        }

        let reply = self
            .signaling
            .request(
                request::get_room_rtp_capabilities(&self.options.room_id),
                self.options.request_timeout,
            )
            .await?;
        let capabilities = Value::Object(reply.object_field("roomRtpCapabilities")?.clone());

        let kinds = {
            let mut device = self.device.write();
            if device.is_loaded() {
                return Ok(());
            }
            device.load(&capabilities, &self.engine.supported_kinds())?;
            device.kinds()
        };

        info!("Device loaded, can produce {:?}", kinds);
        self.events.publish(SessionEvent::DeviceLoaded {
            room_id: self.options.room_id.clone(),
            kinds,
        });
        Ok(())
    }

    /// Log into the room. No-op when already joined.
    pub async fn join(&self) -> Result<()> {
        let rtp_capabilities = {
            let device = self.device.read();
            match device.rtp_capabilities() {
                Some(caps) => caps.clone(),
                None => return Err(AppError::State("device not loaded".to_string())),
            }
        };

        let mut waited = false;
        loop {
            // Subscribe before checking so a settle in between is not missed
            let mut progress = self.progress.subscribe();
            {
                let mut state = self.state.write();
                state.ensure_open()?;
                match state.join {
                    JoinState::Joined => {
                        if !waited {
                            warn!("join() room already joined");
                        }
                        return Ok(());
                    }
                    JoinState::Joining => {}
                    JoinState::Idle => {
                        state.join = JoinState::Joining;
                        break;
                    }
                }
            }
            debug!("join() waiting for the login in flight");
            waited = true;
            let _ = progress.changed().await;
        }
        let _in_flight = InFlight {
            session: self,
            release: |state: &mut RoomState| {
                if state.join == JoinState::Joining {
                    state.join = JoinState::Idle;
                }
            },
        };

        let result = self
            .signaling
            .request(
                request::login_room(&self.options.room_id, rtp_capabilities),
                self.options.request_timeout,
            )
            .await;

        result?;
        self.state.write().join = JoinState::Joined;

        info!("join() room {} joined", self.options.room_id);
        self.events.publish(SessionEvent::Joined {
            room_id: self.options.room_id.clone(),
        });
        Ok(())
    }

    // ========================================================================
    // Transports
    // ========================================================================

    /// Create the transport for `direction`. No-op if it already exists.
    ///
    /// Creating the recv transport replays every consumer queued before it
    /// existed.
    pub async fn create_transport(&self, direction: Direction) -> Result<()> {
        let mut waited = false;
        loop {
            let mut progress = self.progress.subscribe();
            {
                let mut state = self.state.write();
                state.ensure_open()?;
                if state.transport(direction).is_some() {
                    if !waited {
                        warn!("create_transport() {} transport is already created", direction);
                    }
                    return Ok(());
                }
                if state.creating.insert(direction) {
                    break;
                }
            }
            debug!("create_transport() waiting for the {} transport in flight", direction);
            waited = true;
            let _ = progress.changed().await;
        }
        let in_flight = InFlight {
            session: self,
            release: move |state: &mut RoomState| {
                state.creating.remove(&direction);
            },
        };

        let created = self.open_transport(direction).await;

        let (info, pending) = {
            let mut state = self.state.write();
            let (info, handle) = created?;
            if state.closed {
                handle.close();
                return Err(AppError::State("session closed".to_string()));
            }
            *state.transport_slot(direction) = Some(LocalTransport {
                info: info.clone(),
                handle,
            });
            let pending = match direction {
                Direction::Recv => std::mem::take(&mut state.pending_consumers),
                Direction::Send => Vec::new(),
            };
            (info, pending)
        };
        drop(in_flight);

        info!("{} transport created id={}", direction, info.id);
        self.events.publish(SessionEvent::TransportCreated {
            transport_id: info.id,
            direction,
        });

        if !pending.is_empty() {
            info!("Replaying {} queued consumer(s)", pending.len());
        }
        for consumer_info in pending {
            let consumer_id = consumer_info.id.clone();
            if let Err(e) = self.consume(consumer_info).await {
                warn!("Failed to consume queued consumer {}: {}", consumer_id, e);
            }
        }
        Ok(())
    }

    async fn open_transport(
        &self,
        direction: Direction,
    ) -> Result<(TransportInfo, Arc<dyn MediaTransport>)> {
        let reply = self
            .signaling
            .request(
                request::create_webrtc_transport(&self.options.room_id, direction.as_str()),
                self.options.request_timeout,
            )
            .await?;
        let data: WebRtcTransportData = reply.field("webRtcTransportData")?;
        let info = TransportInfo::from_wire(direction, data);

        let handler = Arc::new(TransportSignaler {
            signaling: self.signaling.clone(),
            events: self.events.clone(),
            room_id: self.options.room_id.clone(),
            timeout: self.options.callback_timeout,
        });
        let handle = self.engine.create_transport(&info, handler)?;
        Ok((info, handle))
    }

    // ========================================================================
    // Producers
    // ========================================================================

    /// Capture and publish a track of `kind`
    pub async fn produce_track(&self, kind: MediaKind) -> Result<Producer> {
        let transport = {
            let mut state = self.state.write();
            state.ensure_open()?;
            let transport = state
                .send_transport
                .as_ref()
                .map(|t| t.handle.clone())
                .ok_or_else(|| AppError::State("send transport not created".to_string()))?;
            if !self.device.read().can_produce(kind) {
                return Err(AppError::Capability(format!("device cannot produce {}", kind)));
            }
            if state.producers.values().any(|p| p.kind == kind) || !state.producing.insert(kind) {
                return Err(AppError::State(format!("a {} producer already exists", kind)));
            }
            transport
        };

        let track = self.engine.acquire_track(kind);
        let options = self.produce_options(kind);
        let result = match track {
            Ok(track) => tokio::task::spawn_blocking(move || transport.produce(track, options))
                .await
                .unwrap_or_else(|e| Err(AppError::Internal(format!("produce task failed: {}", e)))),
            Err(e) => Err(e),
        };

        let producer = {
            let mut state = self.state.write();
            state.producing.remove(&kind);
            let producer_id = result?;
            state.ensure_open()?;
            let producer = Producer {
                id: producer_id,
                kind,
                paused: false,
            };
            state.producers.insert(producer.id.clone(), producer.clone());
            producer
        };

        info!("Producer created id={} kind={}", producer.id, kind);
        self.events.publish(SessionEvent::ProducerCreated {
            producer_id: producer.id.clone(),
            kind,
        });
        Ok(producer)
    }

    fn produce_options(&self, kind: MediaKind) -> ProduceOptions {
        let media = &self.options.media;
        match kind {
            MediaKind::Audio => ProduceOptions {
                codec_options: json!([{ "opusStereo": media.opus_stereo }, { "opusDtx": media.opus_dtx }]),
                encodings: Vec::new(),
            },
            MediaKind::Video => ProduceOptions {
                codec_options: json!([{ "videoGoogleStartBitrate": media.video_start_bitrate_kbps }]),
                encodings: media
                    .simulcast_bitrates_bps
                    .iter()
                    .map(|bitrate| json!({ "active": true, "maxBitrate": bitrate, "maxFramerate": 60 }))
                    .collect(),
            },
        }
    }

    pub fn pause_producer(&self, kind: MediaKind) -> Result<()> {
        self.set_producer_paused(kind, true)
    }

    pub fn resume_producer(&self, kind: MediaKind) -> Result<()> {
        self.set_producer_paused(kind, false)
    }

    /// Flip the local flag and notify the server without waiting for an ack
    fn set_producer_paused(&self, kind: MediaKind, paused: bool) -> Result<()> {
        let producer_id = {
            let mut state = self.state.write();
            let producer = state
                .producers
                .values_mut()
                .find(|p| p.kind == kind)
                .ok_or_else(|| AppError::NotFound(format!("no {} producer", kind)))?;
            if producer.paused == paused {
                info!("{} producer already {}", kind, pause_word(paused));
                return Ok(());
            }
            producer.paused = paused;
            producer.id.clone()
        };

        let message = if paused {
            request::pause_producer(&self.options.room_id, &producer_id)
        } else {
            request::resume_producer(&self.options.room_id, &producer_id)
        };
        if let Err(e) = self.signaling.notify(&message) {
            // Never left this process, so the server still has the old state
            if let Some(producer) = self.state.write().producers.get_mut(&producer_id) {
                producer.paused = !paused;
            }
            return Err(e);
        }

        debug!("{} producer {} {}", kind, producer_id, pause_word(paused));
        self.events.publish(if paused {
            SessionEvent::ProducerPaused { producer_id, kind }
        } else {
            SessionEvent::ProducerResumed { producer_id, kind }
        });
        Ok(())
    }

    // ========================================================================
    // Consumers
    // ========================================================================

    /// Start receiving a remote producer
    ///
    /// Without a recv transport the info is queued and replayed by
    /// [`create_transport`](Self::create_transport). A consumer of a kind
    /// already consumed replaces the older one.
    pub async fn consume(&self, info: ConsumerInfo) -> Result<ConsumeOutcome> {
        let transport = {
            let mut state = self.state.write();
            state.ensure_open()?;
            if let Some(existing) = state.consumers.get(&info.id) {
                debug!("consume() {} already consuming", info.id);
                return Ok(ConsumeOutcome::Consumed(existing.clone()));
            }
            match state.recv_transport.as_ref() {
                Some(t) => t.handle.clone(),
                None => {
                    if state.pending_consumers.iter().any(|p| p.id == info.id) {
                        debug!("consume() {} already queued", info.id);
                    } else {
                        debug!("consume() no recv transport yet, queueing {}", info.id);
                        state.pending_consumers.push(info);
                    }
                    return Ok(ConsumeOutcome::Queued);
                }
            }
        };

        let engine_transport = transport.clone();
        let engine_info = info.clone();
        tokio::task::spawn_blocking(move || engine_transport.consume(&engine_info))
            .await
            .map_err(|e| AppError::Internal(format!("consume task failed: {}", e)))??;

        let consumer = Consumer {
            id: info.id.clone(),
            producer_id: info.producer_id.clone(),
            kind: info.kind,
            paused: false,
            producer_user_id: info.producer_user_id.clone(),
        };

        let replaced: Vec<Consumer> = {
            let mut state = self.state.write();
            if state.closed {
                transport.close_consumer(&consumer.id);
                return Err(AppError::State("session closed".to_string()));
            }
            let stale: Vec<String> = state
                .consumers
                .values()
                .filter(|c| c.kind == consumer.kind && c.id != consumer.id)
                .map(|c| c.id.clone())
                .collect();
            let replaced = stale
                .iter()
                .filter_map(|id| state.consumers.remove(id))
                .collect();
            state.consumers.insert(consumer.id.clone(), consumer.clone());
            replaced
        };

        for old in replaced {
            debug!("Removing previous consumer of kind {}", old.kind);
            transport.close_consumer(&old.id);
            self.events.publish(SessionEvent::ConsumerClosed {
                consumer_id: old.id,
                kind: old.kind,
            });
        }

        info!("consume() consuming id={} kind={}", consumer.id, consumer.kind);
        self.events.publish(SessionEvent::ConsumerCreated {
            consumer_id: consumer.id.clone(),
            producer_id: consumer.producer_id.clone(),
            kind: consumer.kind,
            producer_user_id: consumer.producer_user_id.clone(),
        });
        Ok(ConsumeOutcome::Consumed(consumer))
    }

    pub fn pause_consumer(&self, kind: MediaKind) -> Result<()> {
        self.set_consumer_paused(kind, true)
    }

    pub fn resume_consumer(&self, kind: MediaKind) -> Result<()> {
        self.set_consumer_paused(kind, false)
    }

    fn set_consumer_paused(&self, kind: MediaKind, paused: bool) -> Result<()> {
        let consumer_id = {
            let mut state = self.state.write();
            let consumer = state
                .consumers
                .values_mut()
                .find(|c| c.kind == kind)
                .ok_or_else(|| AppError::NotFound(format!("no {} consumer", kind)))?;
            if consumer.paused == paused {
                info!("{} consumer already {}", kind, pause_word(paused));
                return Ok(());
            }
            consumer.paused = paused;
            consumer.id.clone()
        };

        let message = if paused {
            request::pause_consumer(&self.options.room_id, &consumer_id)
        } else {
            request::resume_consumer(&self.options.room_id, &consumer_id)
        };
        if let Err(e) = self.signaling.notify(&message) {
            if let Some(consumer) = self.state.write().consumers.get_mut(&consumer_id) {
                consumer.paused = !paused;
            }
            return Err(e);
        }

        debug!("{} consumer {} {}", kind, consumer_id, pause_word(paused));
        self.events.publish(if paused {
            SessionEvent::ConsumerPaused { consumer_id, kind }
        } else {
            SessionEvent::ConsumerResumed { consumer_id, kind }
        });
        Ok(())
    }

    // ========================================================================
    // Orchestration and teardown
    // ========================================================================

    /// Full entry sequence: capabilities, join, both transports, then
    /// publish the kinds enabled in the media config
    pub async fn enter(&self) -> Result<()> {
        self.load_device().await?;
        self.join().await?;
        self.create_transport(Direction::Send).await?;
        self.create_transport(Direction::Recv).await?;

        let wanted = [
            (MediaKind::Audio, self.options.media.produce_audio),
            (MediaKind::Video, self.options.media.produce_video),
        ];
        for (kind, enabled) in wanted {
            if !enabled {
                continue;
            }
            match self.produce_track(kind).await {
                Ok(_) => {}
                Err(AppError::Capability(reason)) => warn!("Skipping {}: {}", kind, reason),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Tear the session down
    ///
    /// Stops notifications and stats, closes both transports and drops every
    /// producer, consumer and queued consumer. Later operations fail with a
    /// state error. The joined flag is left as is.
    pub fn close(&self) {
        let (transports, consumers) = {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.creating.clear();
            state.producers.clear();
            state.pending_consumers.clear();
            let consumers: Vec<Consumer> = state.consumers.drain().map(|(_, c)| c).collect();
            let transports: Vec<LocalTransport> = [state.send_transport.take(), state.recv_transport.take()]
                .into_iter()
                .flatten()
                .collect();
            (transports, consumers)
        };

        self.progress.send_replace(());
        for id in self.listeners.lock().drain(..) {
            self.signaling.bus().unsubscribe(id);
        }
        if let Some(stats) = self.stats.lock().take() {
            stats.stop();
        }
        for transport in transports {
            transport.handle.close();
        }
        for consumer in consumers {
            self.events.publish(SessionEvent::ConsumerClosed {
                consumer_id: consumer.id,
                kind: consumer.kind,
            });
        }
        info!("Room session {} closed", self.options.room_id);
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn room_id(&self) -> &str {
        &self.options.room_id
    }

    pub fn is_joined(&self) -> bool {
        self.state.read().join == JoinState::Joined
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub fn device_loaded(&self) -> bool {
        self.device.read().is_loaded()
    }

    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.device.read().can_produce(kind)
    }

    pub fn transport(&self, direction: Direction) -> Option<TransportInfo> {
        self.state.read().transport(direction).map(|t| t.info.clone())
    }

    pub fn producers(&self) -> Vec<Producer> {
        self.state.read().producers.values().cloned().collect()
    }

    pub fn producer(&self, kind: MediaKind) -> Result<Producer> {
        self.state
            .read()
            .producers
            .values()
            .find(|p| p.kind == kind)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no {} producer", kind)))
    }

    pub fn consumers(&self) -> Vec<Consumer> {
        self.state.read().consumers.values().cloned().collect()
    }

    pub fn consumer(&self, kind: MediaKind) -> Result<Consumer> {
        self.state
            .read()
            .consumers
            .values()
            .find(|c| c.kind == kind)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no {} consumer", kind)))
    }

    pub fn pending_consumer_count(&self) -> usize {
        self.state.read().pending_consumers.len()
    }

    pub fn signaling(&self) -> &Arc<SignalingClient> {
        &self.signaling
    }

    pub(crate) fn stats_snapshot(&self) -> StatsSnapshot {
        let state = self.state.read();
        StatsSnapshot {
            send_transport: state.send_transport.as_ref().map(|t| t.handle.clone()),
            recv_transport: state.recv_transport.as_ref().map(|t| t.handle.clone()),
            producer_ids: state.producers.keys().cloned().collect(),
            consumer_ids: state.consumers.keys().cloned().collect(),
        }
    }

    pub(crate) fn send_stats(&self, stats: Value) -> Result<()> {
        self.signaling
            .notify(&request::rtc_stats(&self.options.room_id, stats))
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        for id in self.listeners.get_mut().drain(..) {
            self.signaling.bus().unsubscribe(id);
        }
    }
}

fn pause_word(paused: bool) -> &'static str {
    if paused {
        "paused"
    } else {
        "resumed"
    }
}

/// Media engine callbacks, answered over signaling
///
/// Runs on the engine's blocking thread; each callback waits on a correlated
/// reply bounded by `timeout`.
struct TransportSignaler {
    signaling: Arc<SignalingClient>,
    events: Arc<EventBus>,
    room_id: String,
    timeout: Duration,
}

impl TransportHandler for TransportSignaler {
    fn on_connect(&self, transport_id: &str, dtls_parameters: Value) -> Result<()> {
        debug!("transport::onConnect id={}", transport_id);
        self.signaling
            .request_blocking(
                request::connect_webrtc_transport(&self.room_id, transport_id, dtls_parameters),
                self.timeout,
            )
            .map_err(|e| {
                tracing::error!("transport::onConnect failed id={}: {}", transport_id, e);
                e
            })?;
        Ok(())
    }

    fn on_produce(&self, transport_id: &str, kind: MediaKind, rtp_parameters: Value) -> Result<String> {
        debug!("transport::onProduce id={} kind={}", transport_id, kind);
        let reply: Message = self
            .signaling
            .request_blocking(
                request::produce(&self.room_id, transport_id, kind.as_str(), rtp_parameters),
                self.timeout,
            )
            .map_err(|e| {
                tracing::error!("transport::onProduce failed id={}: {}", transport_id, e);
                e
            })?;
        Ok(reply.str_field("producerId")?.to_string())
    }

    fn on_connection_state_change(&self, transport_id: &str, state: &str) {
        debug!("transport::onConnectionStateChange id={} state={}", transport_id, state);
        self.events.publish(SessionEvent::TransportStateChanged {
            transport_id: transport_id.to_string(),
            state: state.to_string(),
        });
    }
}
