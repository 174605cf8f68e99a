//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`.
pub const RFC6455_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Listening side settings.
    pub server: ServerConfig,

    /// Connecting side settings.
    pub client: ClientConfig,

    /// Opening handshake settings.
    pub handshake: HandshakeConfig,

    /// Protocol behaviour after the handshake.
    pub protocol: ProtocolConfig,

    /// Resource limits.
    pub limits: LimitsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub address: String,

    /// Listen port (0 picks an ephemeral port).
    pub port: u16,

    /// Only accept upgrades whose path starts with this prefix.
    pub path_prefix: Option<String>,

    /// Upper bound on the time a peer may take to send its upgrade request.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Maximum number of registered sessions.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            path_prefix: None,
            handshake_timeout: Duration::from_secs(10),
            max_connections: 10_000,
        }
    }
}

impl ServerConfig {
    /// Get the socket address.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.address, self.port).parse().ok()
    }
}

/// Outbound connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote address (IP or hostname).
    pub address: String,

    /// Remote port.
    pub port: u16,

    /// Resource path sent in the request line.
    pub path: String,

    /// Value of the `Host` header; defaults to `address:port`.
    pub host: Option<String>,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound on waiting for the `101` response.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            path: "/".to_string(),
            host: None,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// The `Host` header value for the upgrade request.
    pub fn host_header(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.address, self.port))
    }
}

/// Opening handshake settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandshakeConfig {
    /// GUID used for the accept-key computation.
    pub guid: String,

    /// Maximum size of an HTTP request or response head.
    pub max_handshake_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            guid: RFC6455_GUID.to_string(),
            max_handshake_size: 8192,
        }
    }
}

/// Protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Whether to answer pings automatically.
    pub auto_pong: bool,

    /// Reject unmasked client frames (server) and masked server frames (client).
    pub enforce_masking: bool,

    /// Reject text messages that are not valid UTF-8.
    pub validate_utf8: bool,

    /// Interval between keep-alive pings; zero disables them.
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,

    /// How long to wait for the peer's close frame after sending ours.
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auto_pong: true,
            enforce_masking: true,
            validate_utf8: true,
            ping_interval: Duration::ZERO,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum payload size of a single frame.
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message.
    pub max_message_size: usize,

    /// Size of each transport read.
    pub read_buffer_size: usize,

    /// Capacity of the per-connection event channel.
    pub event_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            read_buffer_size: 64 * 1024,        // 64 KB
            event_buffer: 256,
        }
    }
}
