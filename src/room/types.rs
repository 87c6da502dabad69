//! Room session types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(AppError::Capability(format!("unknown media kind '{}'", other))),
        }
    }
}

/// Transport direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Recv => "recv",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `webRtcTransportData` payload of a createWebRtcTransport reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcTransportData {
    pub id: String,
    pub ice_parameters: Value,
    pub ice_candidates: Vec<Value>,
    pub dtls_parameters: Value,
}

/// Server-side transport parameters, immutable once created
#[derive(Debug, Clone, PartialEq)]
pub struct TransportInfo {
    pub id: String,
    pub direction: Direction,
    pub ice_parameters: Value,
    pub ice_candidates: Vec<Value>,
    pub dtls_parameters: Value,
}

impl TransportInfo {
    pub fn from_wire(direction: Direction, data: WebRtcTransportData) -> Self {
        Self {
            id: data.id,
            direction,
            ice_parameters: data.ice_parameters,
            ice_candidates: data.ice_candidates,
            dtls_parameters: data.dtls_parameters,
        }
    }
}

/// Locally originated stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Producer {
    pub id: String,
    pub kind: MediaKind,
    pub paused: bool,
}

/// Remotely originated stream received by this session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumer {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub paused: bool,
    pub producer_user_id: Option<String>,
}

/// `consumerData` of a newconsumer notification, also accepted by `consume()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfo {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_user_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub consumer_type: Option<String>,
    #[serde(default)]
    pub producer_paused: bool,
}

impl ConsumerInfo {
    pub fn new(
        id: impl Into<String>,
        producer_id: impl Into<String>,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Self {
        Self {
            id: id.into(),
            producer_id: producer_id.into(),
            kind,
            rtp_parameters,
            producer_user_id: None,
            consumer_user_id: None,
            consumer_type: None,
            producer_paused: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("audio".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!(matches!(
            "data".parse::<MediaKind>(),
            Err(AppError::Capability(_))
        ));
    }

    #[test]
    fn test_consumer_info_from_notification() {
        let data = json!({
            "id": "c1",
            "producerId": "p1",
            "kind": "video",
            "rtpParameters": {"codecs": []},
            "producerUserId": "alice",
            "consumerUserId": "bob",
            "type": "simulcast",
            "producerPaused": true
        });
        let info: ConsumerInfo = serde_json::from_value(data).unwrap();
        assert_eq!(info.id, "c1");
        assert_eq!(info.kind, MediaKind::Video);
        assert_eq!(info.producer_user_id.as_deref(), Some("alice"));
        assert_eq!(info.consumer_type.as_deref(), Some("simulcast"));
        assert!(info.producer_paused);
    }

    #[test]
    fn test_consumer_info_minimal() {
        let info: ConsumerInfo = serde_json::from_value(json!({
            "id": "c1", "producerId": "p1", "kind": "audio", "rtpParameters": {}
        }))
        .unwrap();
        assert!(!info.producer_paused);
        assert!(info.producer_user_id.is_none());
    }

    #[test]
    fn test_transport_data_from_wire() {
        let data: WebRtcTransportData = serde_json::from_value(json!({
            "id": "t1",
            "iceParameters": {"usernameFragment": "u", "password": "p"},
            "iceCandidates": [{"ip": "10.0.0.1", "port": 40000}],
            "dtlsParameters": {"role": "auto", "fingerprints": []}
        }))
        .unwrap();
        let info = TransportInfo::from_wire(Direction::Send, data);
        assert_eq!(info.id, "t1");
        assert_eq!(info.direction, Direction::Send);
        assert_eq!(info.ice_candidates.len(), 1);
    }
}
