//! # R0N WebSocket
//!
//! An RFC 6455 WebSocket implementation for the listening and connecting
//! roles, built on tokio.
//!
//! ## Features
//!
//! - Opening handshake validation and `Sec-WebSocket-Accept` verification
//! - Resumable frame decoding over partial reads
//! - Fragmented message reassembly and control frame handling
//! - Close handshake driven from either side
//! - Concurrent session registry for servers
//! - TOML configuration
//!
//! ## Architecture
//!
//! The protocol core ([`websocket::FrameCodec`] and [`websocket::Session`])
//! is synchronous and performs no I/O. [`websocket::Connection`] runs a
//! session over a tokio stream on its own task, and
//! [`websocket::WebSocketServer`] / [`websocket::WebSocketClient`] add TCP
//! and the opening handshake on top.

pub mod config;
pub mod websocket;
