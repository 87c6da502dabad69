//! Client configuration
//!
//! [`AppConfig`] is the schema. [`ConfigStore`] persists it in SQLite, one
//! row per top-level section, and serves lock-free reads.

mod schema;
mod store;

pub use schema::{AppConfig, MediaConfig, ServerConfig, SignalingConfig, StatsConfig};
pub use store::{ConfigChange, ConfigStore};
