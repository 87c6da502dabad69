//! Room session
//!
//! Everything needed to enter one room: capability negotiation, the
//! send/recv transports, and the producer and consumer bookkeeping.

pub mod device;
pub mod session;
pub mod stats;
pub mod types;

pub use device::Device;
pub use session::{ConsumeOutcome, RoomSession, SessionOptions};
pub use stats::StatsReporter;
pub use types::{Consumer, ConsumerInfo, Direction, MediaKind, Producer, TransportInfo, WebRtcTransportData};
