//! # WebSocket Protocol
//!
//! RFC 6455 for both endpoint roles: the opening handshake, a resumable
//! frame codec, per-connection session logic, and the server-side session
//! registry.
//!
//! ## Layers
//!
//! - [`upgrade`]: HTTP upgrade validation and `Sec-WebSocket-Accept`
//! - [`codec`]: frame encoding and incremental decoding
//! - [`Session`]: fragmentation, control frames and the close handshake,
//!   with no I/O of its own
//! - [`Connection`]: drives a session over any tokio byte stream
//! - [`SessionRegistry`]: live server connections keyed by id
//! - [`WebSocketServer`] / [`WebSocketClient`]: TCP endpoints
//!
//! ## Features
//!
//! - Client frames always masked, server frames never
//! - Fragmented message reassembly with size limits
//! - Automatic pong replies and optional keep-alive pings
//! - Close handshake with a bounded wait for the peer's reply
//! - Not supported: extensions, subprotocols, TLS

pub mod codec;
pub mod upgrade;

mod client;
mod connection;
mod error;
mod frame;
mod registry;
mod server;
mod session;

pub use client::WebSocketClient;
pub use codec::{Decoded, FrameCodec, ParseState};
pub use connection::{read_http_head, Connection, ConnectionHandle, Events};
pub use error::{HandshakeError, ProtocolViolation, Rejection, WebSocketError, WebSocketResult};
pub use frame::{apply_mask, CloseCode, Frame, Message, MessageKind, OpCode, Role};
pub use registry::{ConnectionId, RegisteredSession, SessionRegistry};
pub use server::{Accepted, ServerStats, StatsSnapshot, WebSocketServer};
pub use session::{Event, Session, SessionState};
