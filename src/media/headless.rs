//! Headless media engine
//!
//! Drives the full signaling sequence without capturing or sending media.
//! Transports fabricate DTLS fingerprints and RTP parameters, call the
//! handler exactly like a real engine would (connect on first use, then
//! produce), and count what they were asked to do.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use super::{MediaEngine, MediaTrack, MediaTransport, ProduceOptions, TransportHandler};
use crate::error::{AppError, Result};
use crate::room::{ConsumerInfo, Direction, MediaKind, TransportInfo};

/// Signaling-only engine
pub struct HeadlessEngine {
    kinds: Vec<MediaKind>,
}

impl HeadlessEngine {
    /// Engine supporting audio and video
    pub fn new() -> Self {
        Self::with_kinds(vec![MediaKind::Audio, MediaKind::Video])
    }

    pub fn with_kinds(kinds: Vec<MediaKind>) -> Self {
        Self { kinds }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for HeadlessEngine {
    fn supported_kinds(&self) -> Vec<MediaKind> {
        self.kinds.clone()
    }

    fn create_transport(
        &self,
        info: &TransportInfo,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Arc<dyn MediaTransport>> {
        debug!("Headless {} transport {} created", info.direction, info.id);
        Ok(Arc::new(HeadlessTransport {
            info: info.clone(),
            handler,
            connect_started: AtomicBool::new(false),
            next_mid: AtomicU32::new(0),
            producers: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }))
    }

    fn acquire_track(&self, kind: MediaKind) -> Result<MediaTrack> {
        if !self.kinds.contains(&kind) {
            return Err(AppError::Media(format!("no {} capture device", kind)));
        }
        Ok(MediaTrack {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        })
    }
}

struct HeadlessTransport {
    info: TransportInfo,
    handler: Arc<dyn TransportHandler>,
    connect_started: AtomicBool,
    next_mid: AtomicU32,
    producers: Mutex<HashMap<String, MediaKind>>,
    consumers: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl HeadlessTransport {
    /// Run the connect callback once, on first use
    fn ensure_connected(&self) -> Result<()> {
        if self
            .connect_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        self.handler
            .on_connection_state_change(&self.info.id, "connecting");
        let role = match self.info.direction {
            Direction::Send => "client",
            Direction::Recv => "server",
        };
        let dtls = json!({
            "role": role,
            "fingerprints": [{
                "algorithm": "sha-256",
                "value": fake_fingerprint(),
            }],
        });

        if let Err(e) = self.handler.on_connect(&self.info.id, dtls) {
            self.connect_started.store(false, Ordering::Release);
            self.handler.on_connection_state_change(&self.info.id, "failed");
            return Err(e);
        }
        self.handler
            .on_connection_state_change(&self.info.id, "connected");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::Media(format!("transport {} closed", self.info.id)));
        }
        Ok(())
    }
}

impl MediaTransport for HeadlessTransport {
    fn id(&self) -> &str {
        &self.info.id
    }

    fn direction(&self) -> Direction {
        self.info.direction
    }

    fn produce(&self, track: MediaTrack, options: ProduceOptions) -> Result<String> {
        self.ensure_open()?;
        if self.info.direction != Direction::Send {
            return Err(AppError::Media("produce on a recv transport".to_string()));
        }
        self.ensure_connected()?;

        let mid = self.next_mid.fetch_add(1, Ordering::Relaxed);
        let rtp_parameters = rtp_parameters(track.kind, mid, &options);
        let producer_id = self
            .handler
            .on_produce(&self.info.id, track.kind, rtp_parameters)?;

        self.producers.lock().insert(producer_id.clone(), track.kind);
        Ok(producer_id)
    }

    fn consume(&self, info: &ConsumerInfo) -> Result<()> {
        self.ensure_open()?;
        if self.info.direction != Direction::Recv {
            return Err(AppError::Media("consume on a send transport".to_string()));
        }
        self.ensure_connected()?;

        self.consumers.lock().insert(info.id.clone());
        Ok(())
    }

    fn close_consumer(&self, consumer_id: &str) {
        self.consumers.lock().remove(consumer_id);
    }

    fn stats(&self) -> Result<Value> {
        Ok(json!({
            "type": "transport",
            "transportId": self.info.id,
            "direction": self.info.direction,
            "connected": self.connect_started.load(Ordering::Acquire),
            "producers": self.producers.lock().len(),
            "consumers": self.consumers.lock().len(),
        }))
    }

    fn producer_stats(&self, producer_id: &str) -> Result<Value> {
        let kind = self
            .producers
            .lock()
            .get(producer_id)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("producer {}", producer_id)))?;
        Ok(json!({"type": "outbound-rtp", "producerId": producer_id, "kind": kind, "packetsSent": 0}))
    }

    fn consumer_stats(&self, consumer_id: &str) -> Result<Value> {
        if !self.consumers.lock().contains(consumer_id) {
            return Err(AppError::NotFound(format!("consumer {}", consumer_id)));
        }
        Ok(json!({"type": "inbound-rtp", "consumerId": consumer_id, "packetsReceived": 0}))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handler
                .on_connection_state_change(&self.info.id, "closed");
        }
    }
}

fn rtp_parameters(kind: MediaKind, mid: u32, options: &ProduceOptions) -> Value {
    let codec = match kind {
        MediaKind::Audio => json!({
            "mimeType": "audio/opus", "payloadType": 111, "clockRate": 48000, "channels": 2
        }),
        MediaKind::Video => json!({
            "mimeType": "video/VP8", "payloadType": 96, "clockRate": 90000
        }),
    };
    let encodings: Vec<Value> = if options.encodings.is_empty() {
        vec![json!({ "ssrc": fake_ssrc() })]
    } else {
        options
            .encodings
            .iter()
            .map(|e| {
                let mut e = e.clone();
                if let Some(obj) = e.as_object_mut() {
                    obj.insert("ssrc".to_string(), json!(fake_ssrc()));
                }
                e
            })
            .collect()
    };
    json!({
        "mid": mid.to_string(),
        "codecs": [codec],
        "encodings": encodings,
        "codecOptions": options.codec_options,
        "rtcp": { "cname": uuid::Uuid::new_v4().simple().to_string(), "reducedSize": true },
    })
}

fn fake_ssrc() -> u32 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn fake_fingerprint() -> String {
    let a = uuid::Uuid::new_v4().into_bytes();
    let b = uuid::Uuid::new_v4().into_bytes();
    a.iter()
        .chain(b.iter())
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        connects: AtomicUsize,
        produces: AtomicUsize,
        states: Mutex<Vec<String>>,
        fail_connect: AtomicBool,
    }

    impl TransportHandler for Recorder {
        fn on_connect(&self, _transport_id: &str, dtls: Value) -> Result<()> {
            assert!(dtls["fingerprints"][0]["value"].as_str().unwrap().contains(':'));
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(AppError::ChannelClosed);
            }
            Ok(())
        }

        fn on_produce(&self, _transport_id: &str, kind: MediaKind, rtp: Value) -> Result<String> {
            assert!(rtp["codecs"][0]["mimeType"].as_str().unwrap().starts_with(kind.as_str()));
            let n = self.produces.fetch_add(1, Ordering::SeqCst);
            Ok(format!("producer-{}", n))
        }

        fn on_connection_state_change(&self, _transport_id: &str, state: &str) {
            self.states.lock().push(state.to_string());
        }
    }

    fn transport_info(direction: Direction) -> TransportInfo {
        TransportInfo {
            id: "t1".to_string(),
            direction,
            ice_parameters: json!({}),
            ice_candidates: vec![],
            dtls_parameters: json!({}),
        }
    }

    #[test]
    fn test_connect_runs_once_before_first_produce() {
        let engine = HeadlessEngine::new();
        let handler = Arc::new(Recorder::default());
        let transport = engine
            .create_transport(&transport_info(Direction::Send), handler.clone())
            .unwrap();

        let audio = engine.acquire_track(MediaKind::Audio).unwrap();
        let video = engine.acquire_track(MediaKind::Video).unwrap();
        assert_eq!(transport.produce(audio, ProduceOptions::default()).unwrap(), "producer-0");
        assert_eq!(transport.produce(video, ProduceOptions::default()).unwrap(), "producer-1");

        assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
        assert_eq!(*handler.states.lock(), vec!["connecting", "connected"]);
        assert!(transport.producer_stats("producer-1").is_ok());
    }

    #[test]
    fn test_failed_connect_is_retried() {
        let engine = HeadlessEngine::new();
        let handler = Arc::new(Recorder::default());
        handler.fail_connect.store(true, Ordering::SeqCst);
        let transport = engine
            .create_transport(&transport_info(Direction::Recv), handler.clone())
            .unwrap();

        let info = ConsumerInfo::new("c1", "p1", MediaKind::Video, json!({}));
        assert!(transport.consume(&info).is_err());

        handler.fail_connect.store(false, Ordering::SeqCst);
        transport.consume(&info).unwrap();
        assert_eq!(handler.connects.load(Ordering::SeqCst), 2);
        assert!(transport.consumer_stats("c1").is_ok());
    }

    #[test]
    fn test_direction_is_enforced() {
        let engine = HeadlessEngine::new();
        let handler = Arc::new(Recorder::default());
        let recv = engine
            .create_transport(&transport_info(Direction::Recv), handler)
            .unwrap();
        let track = engine.acquire_track(MediaKind::Audio).unwrap();
        assert!(recv.produce(track, ProduceOptions::default()).is_err());
    }

    #[test]
    fn test_simulcast_encodings_get_ssrcs() {
        let options = ProduceOptions {
            codec_options: json!([{"videoGoogleStartBitrate": 1000}]),
            encodings: vec![json!({"maxBitrate": 500000}), json!({"maxBitrate": 1000000})],
        };
        let rtp = rtp_parameters(MediaKind::Video, 0, &options);
        let encodings = rtp["encodings"].as_array().unwrap();
        assert_eq!(encodings.len(), 2);
        assert!(encodings.iter().all(|e| e["ssrc"].is_u64()));
        assert_eq!(encodings[1]["maxBitrate"], 1000000);
    }

    #[test]
    fn test_acquire_unsupported_kind() {
        let engine = HeadlessEngine::with_kinds(vec![MediaKind::Audio]);
        assert!(engine.acquire_track(MediaKind::Video).is_err());
    }
}
