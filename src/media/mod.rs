//! Media engine facade
//!
//! The session never touches ICE, DTLS or codecs itself. It hands the
//! server-side transport parameters to a [`MediaEngine`] and receives
//! [`MediaTransport`] handles back. The engine reports back through a
//! [`TransportHandler`] whose methods are synchronous and may block on a
//! signaling round trip, so engines must invoke them from a blocking-capable
//! thread, never from the signaling worker.

pub mod headless;

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::room::{ConsumerInfo, Direction, MediaKind, TransportInfo};

pub use headless::HeadlessEngine;

/// A local capture track ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

/// Encoder settings passed along with a track
#[derive(Debug, Clone, Default)]
pub struct ProduceOptions {
    /// Codec options array, e.g. `[{"opusStereo":true}]`
    pub codec_options: Value,
    /// Simulcast encodings; empty means a single default encoding
    pub encodings: Vec<Value>,
}

/// Callbacks from a transport back into signaling
pub trait TransportHandler: Send + Sync {
    /// First DTLS handshake is about to start. Blocks until the server has
    /// acknowledged the local DTLS parameters.
    fn on_connect(&self, transport_id: &str, dtls_parameters: Value) -> Result<()>;

    /// A track is ready to publish. Blocks until the server assigns a
    /// producer id, which is returned to the engine.
    fn on_produce(&self, transport_id: &str, kind: MediaKind, rtp_parameters: Value) -> Result<String>;

    fn on_connection_state_change(&self, transport_id: &str, state: &str);
}

/// Engine-side transport
///
/// `produce` and `consume` may call back into the [`TransportHandler`] and
/// therefore block; call them from `spawn_blocking`.
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> &str;

    fn direction(&self) -> Direction;

    /// Publish a track, returning the server-assigned producer id
    fn produce(&self, track: MediaTrack, options: ProduceOptions) -> Result<String>;

    fn consume(&self, info: &ConsumerInfo) -> Result<()>;

    fn close_consumer(&self, consumer_id: &str);

    /// Transport-level statistics report
    fn stats(&self) -> Result<Value>;

    fn producer_stats(&self, producer_id: &str) -> Result<Value>;

    fn consumer_stats(&self, consumer_id: &str) -> Result<Value>;

    fn close(&self);
}

/// Media engine entry point
pub trait MediaEngine: Send + Sync {
    /// Kinds this engine can capture and render
    fn supported_kinds(&self) -> Vec<MediaKind>;

    fn create_transport(
        &self,
        info: &TransportInfo,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Arc<dyn MediaTransport>>;

    /// Open a capture track of `kind`
    fn acquire_track(&self, kind: MediaKind) -> Result<MediaTrack>;
}
