//! # Configuration System
//!
//! TOML-based configuration for the WebSocket server, client and protocol
//! engine. Every section is optional and falls back to its defaults.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! address = "0.0.0.0"
//! port = 8080
//! handshake_timeout = "10s"
//!
//! [handshake]
//! max_handshake_size = 8192
//!
//! [protocol]
//! ping_interval = "30s"
//! close_timeout = "5s"
//!
//! [limits]
//! max_frame_size = 16777216
//! max_message_size = 67108864
//! ```

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{
    ClientConfig, HandshakeConfig, LimitsConfig, ProtocolConfig, ServerConfig, WebSocketConfig,
    RFC6455_GUID,
};
