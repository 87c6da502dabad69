use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Signaling server and room
    pub server: ServerConfig,
    /// Request timeouts
    pub signaling: SignalingConfig,
    /// What to publish and how
    pub media: MediaConfig,
    /// Periodic RTC statistics
    pub stats: StatsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            signaling: SignalingConfig::default(),
            media: MediaConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

/// Signaling server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket URL (`ws://` or `wss://`)
    pub url: String,
    /// Room to join
    pub room_id: String,
    /// How long to wait for the channel to open
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "wss://127.0.0.1:443".to_string(),
            room_id: "android".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

/// Signaling request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Timeout for correlated requests issued by session operations
    pub request_timeout_ms: u64,
    /// Timeout for requests issued from media engine callbacks
    /// (connect / produce), which block an engine thread
    pub callback_timeout_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            callback_timeout_ms: 10_000,
        }
    }
}

/// Media publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Publish microphone audio after joining
    pub produce_audio: bool,
    /// Publish camera video after joining
    pub produce_video: bool,
    pub opus_stereo: bool,
    pub opus_dtx: bool,
    /// Initial video bitrate hint in kbps
    pub video_start_bitrate_kbps: u32,
    /// Max bitrate of each simulcast layer in bps, lowest first.
    /// Empty disables simulcast.
    pub simulcast_bitrates_bps: Vec<u32>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            produce_audio: true,
            produce_video: true,
            opus_stereo: true,
            opus_dtx: true,
            video_start_bitrate_kbps: 1000,
            simulcast_bitrates_bps: vec![500_000, 1_000_000, 1_500_000],
        }
    }
}

/// RTC statistics reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 3000,
        }
    }
}
