//! sfu-signal - client-side signaling for an SFU room
//!
//! Correlates requests and replies over a WebSocket channel, fans out
//! server notifications, and drives the room session state machine
//! (join, transports, producers, consumers) against a pluggable media engine.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod room;
pub mod signaling;

pub use error::{AppError, Result};
