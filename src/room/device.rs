//! Negotiated capability set
//!
//! The room advertises its router RTP capabilities; the device keeps the
//! subset the local media engine can handle and answers `can_produce`.

use std::collections::BTreeSet;

use serde_json::Value;

use super::types::MediaKind;
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
pub struct Device {
    rtp_capabilities: Option<Value>,
    kinds: BTreeSet<MediaKind>,
}

impl Device {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the room's RTP capabilities
    ///
    /// `local_kinds` are the kinds the media engine supports. Codecs and
    /// header extensions of other kinds are dropped from the stored set.
    pub fn load(&mut self, room_capabilities: &Value, local_kinds: &[MediaKind]) -> Result<()> {
        if self.is_loaded() {
            return Err(AppError::State("device already loaded".to_string()));
        }

        let codecs = room_capabilities
            .get("codecs")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Decode("room capabilities missing 'codecs' array".to_string()))?;

        let keep = |entry: &Value| -> Option<MediaKind> {
            let kind = entry.get("kind")?.as_str()?.parse::<MediaKind>().ok()?;
            local_kinds.contains(&kind).then_some(kind)
        };

        let mut kinds = BTreeSet::new();
        let mut filtered_codecs = Vec::new();
        for codec in codecs {
            if let Some(kind) = keep(codec) {
                kinds.insert(kind);
                filtered_codecs.push(codec.clone());
            }
        }

        let mut caps = room_capabilities.clone();
        caps["codecs"] = Value::Array(filtered_codecs);
        if let Some(exts) = room_capabilities.get("headerExtensions").and_then(Value::as_array) {
            let filtered: Vec<Value> = exts.iter().filter(|e| keep(e).is_some()).cloned().collect();
            caps["headerExtensions"] = Value::Array(filtered);
        }

        self.kinds = kinds;
        self.rtp_capabilities = Some(caps);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.rtp_capabilities.is_some()
    }

    /// Capabilities to send with loginRoom
    pub fn rtp_capabilities(&self) -> Option<&Value> {
        self.rtp_capabilities.as_ref()
    }

    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.kinds.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room_caps() -> Value {
        json!({
            "codecs": [
                {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
                {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
            ],
            "headerExtensions": [
                {"kind": "audio", "uri": "urn:ietf:params:rtp-hdrext:ssrc-audio-level"},
                {"kind": "video", "uri": "urn:3gpp:video-orientation"}
            ]
        })
    }

    #[test]
    fn test_load_all_kinds() {
        let mut device = Device::new();
        assert!(!device.is_loaded());

        device
            .load(&room_caps(), &[MediaKind::Audio, MediaKind::Video])
            .unwrap();
        assert!(device.is_loaded());
        assert!(device.can_produce(MediaKind::Audio));
        assert!(device.can_produce(MediaKind::Video));
    }

    #[test]
    fn test_load_filters_to_local_kinds() {
        let mut device = Device::new();
        device.load(&room_caps(), &[MediaKind::Audio]).unwrap();

        assert!(device.can_produce(MediaKind::Audio));
        assert!(!device.can_produce(MediaKind::Video));

        let caps = device.rtp_capabilities().unwrap();
        assert_eq!(caps["codecs"].as_array().unwrap().len(), 1);
        assert_eq!(caps["headerExtensions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_malformed_and_reload() {
        let mut device = Device::new();
        assert!(matches!(
            device.load(&json!({"foo": 1}), &[MediaKind::Audio]),
            Err(AppError::Decode(_))
        ));
        assert!(!device.is_loaded());

        device.load(&room_caps(), &[MediaKind::Audio]).unwrap();
        assert!(matches!(
            device.load(&room_caps(), &[MediaKind::Audio]),
            Err(AppError::State(_))
        ));
    }
}
