//! Session event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::room::{Direction, MediaKind};

/// Session event enumeration
///
/// All events are tagged with their event name for serialization.
/// The `serde(tag = "event", content = "data")` attribute creates a
/// JSON structure like:
/// ```json
/// {
///   "event": "producer.paused",
///   "data": { "producer_id": "p1", "kind": "audio" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    // ============================================================================
    // Channel Events
    // ============================================================================
    #[serde(rename = "channel.opened")]
    ChannelOpened,

    #[serde(rename = "channel.closed")]
    ChannelClosed { code: u16, reason: String },

    /// Channel failed (connect error or read error)
    #[serde(rename = "channel.failed")]
    ChannelFailed { error: String },

    // ============================================================================
    // Room Events
    // ============================================================================
    /// Room capability set loaded
    #[serde(rename = "room.device_loaded")]
    DeviceLoaded {
        room_id: String,
        /// Kinds the room accepts
        kinds: Vec<MediaKind>,
    },

    #[serde(rename = "room.joined")]
    Joined { room_id: String },

    /// A remote participant entered the room
    #[serde(rename = "room.new_user")]
    NewUser { user_id: String },

    // ============================================================================
    // Transport Events
    // ============================================================================
    #[serde(rename = "transport.created")]
    TransportCreated {
        transport_id: String,
        direction: Direction,
    },

    /// Connection state reported by the media engine
    #[serde(rename = "transport.state_changed")]
    TransportStateChanged {
        transport_id: String,
        state: String,
    },

    // ============================================================================
    // Producer Events
    // ============================================================================
    #[serde(rename = "producer.created")]
    ProducerCreated { producer_id: String, kind: MediaKind },

    #[serde(rename = "producer.paused")]
    ProducerPaused { producer_id: String, kind: MediaKind },

    #[serde(rename = "producer.resumed")]
    ProducerResumed { producer_id: String, kind: MediaKind },

    // ============================================================================
    // Consumer Events
    // ============================================================================
    #[serde(rename = "consumer.created")]
    ConsumerCreated {
        consumer_id: String,
        producer_id: String,
        kind: MediaKind,
        /// Remote participant that owns the producer, when the server says
        producer_user_id: Option<String>,
    },

    /// Consumer replaced by a newer one of the same kind, or session closed
    #[serde(rename = "consumer.closed")]
    ConsumerClosed { consumer_id: String, kind: MediaKind },

    #[serde(rename = "consumer.paused")]
    ConsumerPaused { consumer_id: String, kind: MediaKind },

    #[serde(rename = "consumer.resumed")]
    ConsumerResumed { consumer_id: String, kind: MediaKind },
}

impl SessionEvent {
    /// Get the event name (for filtering)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ChannelOpened => "channel.opened",
            Self::ChannelClosed { .. } => "channel.closed",
            Self::ChannelFailed { .. } => "channel.failed",
            Self::DeviceLoaded { .. } => "room.device_loaded",
            Self::Joined { .. } => "room.joined",
            Self::NewUser { .. } => "room.new_user",
            Self::TransportCreated { .. } => "transport.created",
            Self::TransportStateChanged { .. } => "transport.state_changed",
            Self::ProducerCreated { .. } => "producer.created",
            Self::ProducerPaused { .. } => "producer.paused",
            Self::ProducerResumed { .. } => "producer.resumed",
            Self::ConsumerCreated { .. } => "consumer.created",
            Self::ConsumerClosed { .. } => "consumer.closed",
            Self::ConsumerPaused { .. } => "consumer.paused",
            Self::ConsumerResumed { .. } => "consumer.resumed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        let event = SessionEvent::ProducerPaused {
            producer_id: "p1".to_string(),
            kind: MediaKind::Audio,
        };
        assert_eq!(event.event_name(), "producer.paused");
        assert_eq!(SessionEvent::ChannelOpened.event_name(), "channel.opened");
    }

    #[test]
    fn test_serialization() {
        let event = SessionEvent::TransportCreated {
            transport_id: "t1".to_string(),
            direction: Direction::Recv,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("transport.created"));
        assert!(json.contains("\"recv\""));

        let deserialized: SessionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            SessionEvent::TransportCreated {
                direction: Direction::Recv,
                ..
            }
        ));
    }
}
