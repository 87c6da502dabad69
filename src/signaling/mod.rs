//! Signaling layer
//!
//! Control-plane plumbing between the room session and the SFU:
//!
//! ```text
//! RoomSession ──request──> Correlator ──send──> SignalChannel ──> SFU
//!      ^                       ^                                   |
//!      |                  one-shot listener                        |
//!      |                       |                                   v
//!      +── notifications ── MessageBus <── publish ── channel worker
//! ```

pub mod bus;
pub mod channel;
pub mod client;
pub mod correlation;
pub mod message;
pub mod request;
pub mod ws;

pub use bus::{ListenerId, ListenerMode, MessageBus};
pub use channel::{ChannelEvent, LoopbackChannel, LoopbackPeer, SignalChannel};
pub use client::{ChannelState, SignalingClient};
pub use correlation::{Correlator, PendingInfo};
pub use message::{action, Message};
pub use ws::WsChannel;
