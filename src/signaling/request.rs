//! Request builders for the room signaling protocol

use serde_json::Value;

use super::message::{action, Message};

pub fn get_room_rtp_capabilities(room_id: &str) -> Message {
    Message::new(action::GET_ROOM_RTP_CAPABILITIES).with("roomId", room_id)
}

pub fn login_room(room_id: &str, rtp_capabilities: Value) -> Message {
    Message::new(action::LOGIN_ROOM)
        .with("roomId", room_id)
        .with("rtpCapabilities", rtp_capabilities)
}

/// `direction` is `"send"` or `"recv"`
pub fn create_webrtc_transport(room_id: &str, direction: &str) -> Message {
    Message::new(action::CREATE_WEBRTC_TRANSPORT)
        .with("roomId", room_id)
        .with("direction", direction)
}

pub fn connect_webrtc_transport(room_id: &str, transport_id: &str, dtls_parameters: Value) -> Message {
    Message::new(action::CONNECT_WEBRTC_TRANSPORT)
        .with("roomId", room_id)
        .with("transportId", transport_id)
        .with("dtlsParameters", dtls_parameters)
}

pub fn produce(room_id: &str, transport_id: &str, kind: &str, rtp_parameters: Value) -> Message {
    Message::new(action::PRODUCE)
        .with("roomId", room_id)
        .with("transportId", transport_id)
        .with("kind", kind)
        .with("rtpParameters", rtp_parameters)
}

pub fn pause_producer(room_id: &str, producer_id: &str) -> Message {
    producer_toggle(action::PAUSE_PRODUCER, room_id, producer_id)
}

pub fn resume_producer(room_id: &str, producer_id: &str) -> Message {
    producer_toggle(action::RESUME_PRODUCER, room_id, producer_id)
}

pub fn pause_consumer(room_id: &str, consumer_id: &str) -> Message {
    consumer_toggle(action::PAUSE_CONSUMER, room_id, consumer_id)
}

pub fn resume_consumer(room_id: &str, consumer_id: &str) -> Message {
    consumer_toggle(action::RESUME_CONSUMER, room_id, consumer_id)
}

pub fn rtc_stats(room_id: &str, stats: Value) -> Message {
    Message::new(action::RTC_STATS)
        .with("roomId", room_id)
        .with("stats", stats)
}

fn producer_toggle(action: &str, room_id: &str, producer_id: &str) -> Message {
    Message::new(action)
        .with("roomId", room_id)
        .with("producerId", producer_id)
}

fn consumer_toggle(action: &str, room_id: &str, consumer_id: &str) -> Message {
    Message::new(action)
        .with("roomId", room_id)
        .with("consumerId", consumer_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_produce_request_fields() {
        let msg = produce("android", "t1", "video", json!({"codecs": []}));
        assert_eq!(msg.action, "produce");
        assert_eq!(msg.str_field("roomId").unwrap(), "android");
        assert_eq!(msg.str_field("transportId").unwrap(), "t1");
        assert_eq!(msg.str_field("kind").unwrap(), "video");
        assert!(msg.object_field("rtpParameters").is_ok());
        assert_eq!(msg.request_id, None);
    }

    #[test]
    fn test_toggle_requests_carry_ids() {
        let msg = pause_producer("r", "p1");
        assert_eq!(msg.action, "pauseProducer");
        assert_eq!(msg.str_field("producerId").unwrap(), "p1");

        let msg = resume_consumer("r", "c1");
        assert_eq!(msg.action, "resumeConsumer");
        assert_eq!(msg.str_field("consumerId").unwrap(), "c1");
        assert!(msg.get("producerId").is_none());
    }
}
