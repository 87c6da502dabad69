//! Signaling message shape
//!
//! Every message on the channel, inbound or outbound, is a JSON object with a
//! mandatory `action` field. Correlated requests also carry a `requestId`
//! which the server echoes back in its reply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Wire action names
pub mod action {
    pub const GET_ROOM_RTP_CAPABILITIES: &str = "getRoomRtpCapabilities";
    pub const LOGIN_ROOM: &str = "loginRoom";
    pub const CREATE_WEBRTC_TRANSPORT: &str = "createWebRtcTransport";
    pub const CONNECT_WEBRTC_TRANSPORT: &str = "connectWebRtcTransport";
    pub const PRODUCE: &str = "produce";
    pub const PAUSE_PRODUCER: &str = "pauseProducer";
    pub const RESUME_PRODUCER: &str = "resumeProducer";
    pub const PAUSE_CONSUMER: &str = "pauseConsumer";
    pub const RESUME_CONSUMER: &str = "resumeConsumer";
    pub const RTC_STATS: &str = "rtcStats";
    // Server-pushed notifications
    pub const NEW_USER: &str = "newuser";
    pub const NEW_CONSUMER: &str = "newconsumer";
}

/// Signaling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Action name
    pub action: String,
    /// Correlation id, present on correlated requests and their replies
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Remaining payload fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            request_id: None,
            payload: Map::new(),
        }
    }

    /// Builder-style payload field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AppError::Decode(e.to_string()))
    }

    /// Encode to a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Required string field
    pub fn str_field(&self, key: &str) -> Result<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key, "string"))
    }

    /// Required object field
    pub fn object_field(&self, key: &str) -> Result<&Map<String, Value>> {
        self.payload
            .get(key)
            .and_then(Value::as_object)
            .ok_or_else(|| self.missing(key, "object"))
    }

    /// Deserialize a required field into a typed value
    pub fn field<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .payload
            .get(key)
            .cloned()
            .ok_or_else(|| self.missing(key, "value"))?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Decode(format!("'{}' field '{}': {}", self.action, key, e)))
    }

    fn missing(&self, key: &str, expected: &str) -> AppError {
        AppError::Decode(format!(
            "'{}' message missing {} field '{}'",
            self.action, expected, key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_decode_flattens_payload() {
        let msg = assert_ok!(Message::decode(
            r#"{"action":"produce","requestId":7,"producerId":"p1"}"#
        ));
        assert_eq!(msg.action, "produce");
        assert_eq!(msg.request_id, Some(7));
        assert_eq!(msg.str_field("producerId").unwrap(), "p1");
    }

    #[test]
    fn test_decode_requires_action() {
        let err = Message::decode(r#"{"producerId":"p1"}"#).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));

        let err = assert_err!(Message::decode("not json"));
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_encode_omits_missing_request_id() {
        let text = Message::new(action::PAUSE_PRODUCER)
            .with("roomId", "r1")
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"action": "pauseProducer", "roomId": "r1"}));
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let msg = Message::new(action::CREATE_WEBRTC_TRANSPORT);
        let err = msg.object_field("webRtcTransportData").unwrap_err();
        assert!(err.to_string().contains("webRtcTransportData"));
    }
}
