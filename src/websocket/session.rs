//! Per-connection protocol state machine.
//!
//! [`Session`] does no I/O. The owner feeds it received bytes with
//! [`Session::receive`], drains encoded frames with
//! [`Session::take_outbound`] and application events with
//! [`Session::poll_event`], and releases the transport once
//! [`Session::should_release_transport`] returns true.

use crate::config::{LimitsConfig, ProtocolConfig};
use crate::websocket::codec::{Decoded, FrameCodec, MAX_CONTROL_PAYLOAD};
use crate::websocket::error::{ProtocolViolation, WebSocketError, WebSocketResult};
use crate::websocket::frame::{CloseCode, Frame, Message, MessageKind, OpCode, Role};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use tracing::{debug, trace, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Exchanging data frames.
    Open,
    /// A close frame was sent or received.
    Closing,
    /// The transport has been released.
    Closed,
}

/// Events delivered to the session's owner.
#[derive(Debug)]
pub enum Event {
    /// A complete text or binary message.
    Message(Message),
    /// The connection ended. Emitted exactly once.
    ConnectionEnded {
        /// Close code received or sent; `None` when there was none.
        code: Option<CloseCode>,
        /// Close reason or failure description.
        reason: String,
    },
    /// The transport failed.
    TransportError(io::Error),
}

/// One established WebSocket connection.
#[derive(Debug)]
pub struct Session {
    role: Role,
    codec: FrameCodec,
    receive_buffer: BytesMut,
    fragments: Vec<Frame>,
    fragments_len: usize,
    state: SessionState,
    close_sent: bool,
    close_received: bool,
    failed: bool,
    ended: bool,
    outbox: BytesMut,
    events: VecDeque<Event>,
    auto_pong: bool,
    enforce_masking: bool,
    validate_utf8: bool,
    max_message_size: usize,
}

impl Session {
    /// Create a session for an upgraded connection.
    pub fn new(role: Role, protocol: &ProtocolConfig, limits: &LimitsConfig) -> Self {
        Self {
            role,
            codec: FrameCodec::new().with_max_payload_size(limits.max_frame_size),
            receive_buffer: BytesMut::with_capacity(limits.read_buffer_size),
            fragments: Vec::new(),
            fragments_len: 0,
            state: SessionState::Open,
            close_sent: false,
            close_received: false,
            failed: false,
            ended: false,
            outbox: BytesMut::new(),
            events: VecDeque::new(),
            auto_pong: protocol.auto_pong,
            enforce_masking: protocol.enforce_masking,
            validate_utf8: protocol.validate_utf8,
            max_message_size: limits.max_message_size,
        }
    }

    /// Create a server-role session with default settings.
    pub fn server() -> Self {
        Self::new(
            Role::Server,
            &ProtocolConfig::default(),
            &LimitsConfig::default(),
        )
    }

    /// Create a client-role session with default settings.
    pub fn client() -> Self {
        Self::new(
            Role::Client,
            &ProtocolConfig::default(),
            &LimitsConfig::default(),
        )
    }

    /// Endpoint role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether application messages may still be sent.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Whether this side has queued a close frame.
    pub fn close_sent(&self) -> bool {
        self.close_sent
    }

    /// Whether the peer's close frame has arrived.
    pub fn close_received(&self) -> bool {
        self.close_received
    }

    /// Feed bytes read from the transport.
    ///
    /// Decodes every complete frame now buffered. Protocol violations fail
    /// the connection; they are reported through events, never returned.
    pub fn receive(&mut self, data: &[u8]) {
        if self.close_received || self.failed || self.state == SessionState::Closed {
            return;
        }
        self.receive_buffer.extend_from_slice(data);

        loop {
            match self.codec.decode(&self.receive_buffer) {
                Ok(Decoded::NeedsMoreData) => break,
                Ok(Decoded::Frame { frame, consumed }) => {
                    self.receive_buffer.advance(consumed);
                    if let Err(violation) = self.dispatch(frame) {
                        self.fail(violation);
                        break;
                    }
                    if self.close_received {
                        break;
                    }
                },
                Err(violation) => {
                    self.fail(violation);
                    break;
                },
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<(), ProtocolViolation> {
        trace!(
            opcode = ?frame.opcode,
            fin = frame.fin,
            len = frame.payload_len(),
            "frame received"
        );

        if self.enforce_masking {
            match (self.role, frame.is_masked()) {
                (Role::Server, false) => return Err(ProtocolViolation::UnmaskedFrame),
                (Role::Client, true) => return Err(ProtocolViolation::MaskedFrame),
                _ => {},
            }
        }

        match frame.opcode {
            OpCode::Continuation => {
                if self.fragments.is_empty() {
                    return Err(ProtocolViolation::UnexpectedContinuation);
                }
                self.push_fragment(frame)
            },
            OpCode::Text | OpCode::Binary => {
                if !self.fragments.is_empty() {
                    return Err(ProtocolViolation::ExpectedContinuation);
                }
                self.push_fragment(frame)
            },
            OpCode::Ping => {
                if self.auto_pong && !self.close_sent {
                    self.queue(Frame::pong(frame.payload));
                }
                Ok(())
            },
            OpCode::Pong => Ok(()),
            OpCode::Close => self.handle_close(&frame),
        }
    }

    fn push_fragment(&mut self, frame: Frame) -> Result<(), ProtocolViolation> {
        self.fragments_len += frame.payload_len();
        if self.fragments_len > self.max_message_size {
            return Err(ProtocolViolation::MessageTooLarge {
                size: self.fragments_len,
                max: self.max_message_size,
            });
        }

        let fin = frame.fin;
        self.fragments.push(frame);
        if fin {
            self.finish_message()?;
        }
        Ok(())
    }

    fn finish_message(&mut self) -> Result<(), ProtocolViolation> {
        let kind = match self.fragments.first().map(|f| f.opcode) {
            Some(OpCode::Text) => MessageKind::Text,
            _ => MessageKind::Binary,
        };

        let payload = if self.fragments.len() == 1 {
            self.fragments.remove(0).payload
        } else {
            let mut combined = BytesMut::with_capacity(self.fragments_len);
            for fragment in self.fragments.drain(..) {
                combined.extend_from_slice(&fragment.payload);
            }
            combined.freeze()
        };
        self.fragments.clear();
        self.fragments_len = 0;

        if kind == MessageKind::Text
            && self.validate_utf8
            && std::str::from_utf8(&payload).is_err()
        {
            return Err(ProtocolViolation::InvalidUtf8);
        }

        self.events
            .push_back(Event::Message(Message { kind, payload }));
        Ok(())
    }

    fn handle_close(&mut self, frame: &Frame) -> Result<(), ProtocolViolation> {
        let (code, reason) = match frame.close_reason()? {
            Some((code, reason)) => (Some(code), reason.to_string()),
            None => (None, String::new()),
        };

        self.close_received = true;
        self.state = SessionState::Closing;
        self.fragments.clear();
        self.fragments_len = 0;

        if self.close_sent {
            debug!(code = ?code, "close handshake completed");
        } else {
            let echo = code.unwrap_or(CloseCode::Normal);
            debug!(code = u16::from(echo), "echoing peer close");
            self.queue(Frame::close(echo, ""));
            self.close_sent = true;
        }

        self.end(code, reason);
        Ok(())
    }

    fn fail(&mut self, violation: ProtocolViolation) {
        let code = violation.close_code();
        warn!(
            role = ?self.role,
            code = u16::from(code),
            error = %violation,
            "protocol violation, failing connection"
        );

        self.failed = true;
        self.state = SessionState::Closing;
        self.codec.reset();
        self.receive_buffer.clear();
        self.fragments.clear();
        self.fragments_len = 0;

        if !self.close_sent {
            self.queue(Frame::close(code, ""));
            self.close_sent = true;
        }
        self.end(Some(code), violation.to_string());
    }

    fn end(&mut self, code: Option<CloseCode>, reason: String) {
        if !self.ended {
            self.ended = true;
            self.events
                .push_back(Event::ConnectionEnded { code, reason });
        }
    }

    fn queue(&mut self, frame: Frame) {
        let frame = frame.with_mask(self.role.outbound_mask());
        self.codec.encode(&frame, &mut self.outbox);
    }

    /// Queue a single unfragmented application message.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::ConnectionClosed`] once closing has begun.
    pub fn send_message(&mut self, kind: MessageKind, payload: Bytes) -> WebSocketResult<()> {
        if !self.is_open() {
            return Err(WebSocketError::ConnectionClosed);
        }
        self.queue(Frame::new(true, kind.opcode(), payload));
        Ok(())
    }

    /// Queue a ping.
    ///
    /// # Errors
    ///
    /// Fails if the payload exceeds 125 bytes or the connection is closing.
    pub fn ping(&mut self, payload: Bytes) -> WebSocketResult<()> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlPayloadTooLarge(payload.len()));
        }
        if !self.is_open() {
            return Err(WebSocketError::ConnectionClosed);
        }
        self.queue(Frame::ping(payload));
        Ok(())
    }

    /// Start the closing handshake.
    ///
    /// # Errors
    ///
    /// Fails if a close was already sent, the code may not appear on the
    /// wire, or the reason does not fit in a control frame.
    pub fn close(&mut self, code: CloseCode, reason: &str) -> WebSocketResult<()> {
        if self.close_sent || self.state == SessionState::Closed {
            return Err(WebSocketError::ConnectionClosed);
        }
        if !code.is_valid() {
            return Err(ProtocolViolation::InvalidCloseCode(code.into()).into());
        }
        let len = 2 + reason.len();
        if len > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlPayloadTooLarge(len));
        }

        debug!(role = ?self.role, code = u16::from(code), "sending close");
        self.queue(Frame::close(code, reason));
        self.close_sent = true;
        self.state = SessionState::Closing;
        Ok(())
    }

    /// Next pending event.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Whether encoded frames are waiting to be written.
    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Take every encoded frame queued so far, in order.
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        if self.outbox.is_empty() {
            None
        } else {
            Some(self.outbox.split().freeze())
        }
    }

    /// Whether the transport should be closed once pending output is written.
    pub fn should_release_transport(&self) -> bool {
        self.state == SessionState::Closed
            || (self.close_sent && (self.close_received || self.failed))
    }

    /// Record a transport failure and end the session.
    pub fn transport_error(&mut self, error: io::Error) {
        debug!(role = ?self.role, error = %error, "transport error");
        self.events.push_back(Event::TransportError(error));
        self.transport_closed();
    }

    /// Record that the transport was released. No frames are processed afterwards.
    pub fn transport_closed(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.codec.reset();
        self.receive_buffer.clear();
        self.fragments.clear();
        self.fragments_len = 0;
        self.end(None, String::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_MASK: Option<[u8; 4]> = Some([0x11, 0x22, 0x33, 0x44]);

    /// Encode frames the way a client would put them on the wire.
    fn client_wire(frames: &[Frame]) -> Vec<u8> {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for frame in frames {
            codec.encode(&frame.clone().with_mask(CLIENT_MASK), &mut buf);
        }
        buf.to_vec()
    }

    fn decode_outbound(session: &mut Session) -> Vec<Frame> {
        let mut frames = Vec::new();
        let Some(mut buf) = session.take_outbound().map(|b| BytesMut::from(&b[..])) else {
            return frames;
        };
        let mut codec = FrameCodec::new();
        while let Decoded::Frame { frame, consumed } = codec.decode(&buf).unwrap() {
            frames.push(frame);
            buf.advance(consumed);
        }
        assert!(buf.is_empty(), "trailing outbound bytes");
        frames
    }

    fn events(session: &mut Session) -> Vec<Event> {
        std::iter::from_fn(|| session.poll_event()).collect()
    }

    fn close_code(frame: &Frame) -> u16 {
        assert_eq!(frame.opcode, OpCode::Close);
        u16::from_be_bytes([frame.payload[0], frame.payload[1]])
    }

    fn ended_code(events: &[Event]) -> Option<CloseCode> {
        let ended: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::ConnectionEnded { code, .. } => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(ended.len(), 1, "expected exactly one ConnectionEnded");
        ended[0]
    }

    #[test]
    fn test_fragmented_text_reassembled() {
        let mut session = Session::server();
        session.receive(&client_wire(&[
            Frame::new(false, OpCode::Text, "Hel"),
            Frame::continuation(false, "lo "),
            Frame::continuation(true, "World"),
        ]));

        let events = events(&mut session);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Message(msg) => {
                assert_eq!(msg.kind, MessageKind::Text);
                assert_eq!(msg.as_text(), Some("Hello World"));
            },
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!session.has_outbound());
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn test_fragments_across_chunks() {
        let wire = client_wire(&[
            Frame::new(false, OpCode::Binary, vec![1, 2, 3]),
            Frame::continuation(true, vec![4, 5]),
            Frame::text("next"),
        ]);

        let mut session = Session::server();
        for byte in &wire {
            session.receive(std::slice::from_ref(byte));
        }

        let events = events(&mut session);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            Event::Message(m) if m.kind == MessageKind::Binary && m.payload[..] == [1u8, 2, 3, 4, 5]
        ));
        assert!(matches!(&events[1], Event::Message(m) if m.as_text() == Some("next")));
    }

    #[test]
    fn test_stray_continuation_closes_with_protocol_error() {
        let mut session = Session::server();
        session.receive(&client_wire(&[Frame::continuation(true, "oops")]));

        let out = decode_outbound(&mut session);
        assert_eq!(out.len(), 1);
        assert_eq!(close_code(&out[0]), 1002);
        assert_eq!(ended_code(&events(&mut session)), Some(CloseCode::Protocol));
        assert!(session.should_release_transport());
        assert_eq!(session.state(), SessionState::Closing);
    }

    #[test]
    fn test_new_message_during_fragmented_one_fails() {
        let mut session = Session::server();
        session.receive(&client_wire(&[
            Frame::new(false, OpCode::Text, "a"),
            Frame::text("b"),
        ]));

        let out = decode_outbound(&mut session);
        assert_eq!(close_code(&out[0]), 1002);
        let events = events(&mut session);
        assert!(!events.iter().any(|e| matches!(e, Event::Message(_))));
    }

    #[test]
    fn test_ping_mid_fragment_answered() {
        let mut session = Session::server();
        session.receive(&client_wire(&[
            Frame::new(false, OpCode::Text, "Hel"),
            Frame::ping("are you there"),
            Frame::continuation(true, "lo"),
        ]));

        let out = decode_outbound(&mut session);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].opcode, OpCode::Pong);
        assert_eq!(&out[0].payload[..], b"are you there");
        assert!(!out[0].is_masked());

        let events = events(&mut session);
        assert!(matches!(&events[..], [Event::Message(m)] if m.as_text() == Some("Hello")));
    }

    #[test]
    fn test_auto_pong_disabled() {
        let protocol = ProtocolConfig {
            auto_pong: false,
            ..ProtocolConfig::default()
        };
        let mut session = Session::new(Role::Server, &protocol, &LimitsConfig::default());
        session.receive(&client_wire(&[Frame::ping("x")]));
        assert!(!session.has_outbound());
    }

    #[test]
    fn test_close_echoed_once_after_queued_messages() {
        let mut session = Session::server();
        session
            .send_message(MessageKind::Text, Bytes::from_static(b"first"))
            .unwrap();
        session
            .send_message(MessageKind::Binary, Bytes::from_static(b"second"))
            .unwrap();

        session.receive(&client_wire(&[Frame::close(CloseCode::GoingAway, "bye")]));
        // A second close from the peer changes nothing.
        session.receive(&client_wire(&[Frame::close(CloseCode::Normal, "")]));

        let out = decode_outbound(&mut session);
        let opcodes: Vec<_> = out.iter().map(|f| f.opcode).collect();
        assert_eq!(opcodes, [OpCode::Text, OpCode::Binary, OpCode::Close]);
        assert_eq!(close_code(&out[2]), 1001);

        let events = events(&mut session);
        assert_eq!(ended_code(&events), Some(CloseCode::GoingAway));
        assert!(matches!(
            &events[0],
            Event::ConnectionEnded { reason, .. } if reason == "bye"
        ));
        assert!(session.should_release_transport());
        assert!(matches!(
            session.send_message(MessageKind::Text, Bytes::new()),
            Err(WebSocketError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_empty_close_echoed_as_normal() {
        let mut session = Session::server();
        session.receive(&client_wire(&[Frame::new(true, OpCode::Close, Bytes::new())]));

        let out = decode_outbound(&mut session);
        assert_eq!(close_code(&out[0]), 1000);
        assert_eq!(ended_code(&events(&mut session)), None);
    }

    #[test]
    fn test_registered_service_codes_echoed() {
        for code in [1012u16, 1013, 1014] {
            let mut session = Session::server();
            session.receive(&client_wire(&[Frame::close(CloseCode::from(code), "")]));

            let out = decode_outbound(&mut session);
            assert_eq!(out.len(), 1);
            assert_eq!(close_code(&out[0]), code);
            assert_eq!(ended_code(&events(&mut session)), Some(CloseCode::from(code)));
        }
    }

    #[test]
    fn test_locally_initiated_close() {
        let mut session = Session::server();
        session.close(CloseCode::Normal, "done").unwrap();
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.should_release_transport());

        // Data still arriving before the peer's close is delivered.
        session.receive(&client_wire(&[
            Frame::text("late"),
            Frame::ping("p"),
            Frame::close(CloseCode::Normal, ""),
        ]));

        let out = decode_outbound(&mut session);
        assert_eq!(out.len(), 1, "no pong and no second close");
        assert_eq!(close_code(&out[0]), 1000);

        let events = events(&mut session);
        assert!(matches!(&events[0], Event::Message(m) if m.as_text() == Some("late")));
        assert_eq!(ended_code(&events), Some(CloseCode::Normal));
        assert!(session.should_release_transport());

        assert!(matches!(
            session.close(CloseCode::Normal, ""),
            Err(WebSocketError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_frames_after_close_ignored() {
        let mut session = Session::server();
        session.receive(&client_wire(&[
            Frame::close(CloseCode::Normal, ""),
            Frame::text("ignored"),
        ]));
        session.receive(&client_wire(&[Frame::text("also ignored")]));

        let events = events(&mut session);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::ConnectionEnded { .. }));
    }

    #[test]
    fn test_invalid_utf8_closes_with_1007() {
        let mut session = Session::server();
        session.receive(&client_wire(&[Frame::text(vec![0xC3, 0x28])]));

        let out = decode_outbound(&mut session);
        assert_eq!(close_code(&out[0]), 1007);
        assert_eq!(ended_code(&events(&mut session)), Some(CloseCode::InvalidData));
    }

    #[test]
    fn test_utf8_split_across_fragments() {
        // "é" is 0xC3 0xA9; each half alone is invalid.
        let mut session = Session::server();
        session.receive(&client_wire(&[
            Frame::new(false, OpCode::Text, vec![0xC3]),
            Frame::continuation(true, vec![0xA9]),
        ]));
        let events = events(&mut session);
        assert!(matches!(&events[..], [Event::Message(m)] if m.as_text() == Some("é")));
    }

    #[test]
    fn test_message_too_large_closes_with_1009() {
        let limits = LimitsConfig {
            max_frame_size: 8,
            max_message_size: 10,
            ..LimitsConfig::default()
        };
        let mut session = Session::new(Role::Server, &ProtocolConfig::default(), &limits);
        session.receive(&client_wire(&[
            Frame::new(false, OpCode::Binary, vec![0u8; 6]),
            Frame::continuation(true, vec![0u8; 6]),
        ]));

        let out = decode_outbound(&mut session);
        assert_eq!(close_code(&out[0]), 1009);
        assert!(!events(&mut session)
            .iter()
            .any(|e| matches!(e, Event::Message(_))));
    }

    #[test]
    fn test_frame_too_large_closes_with_1009() {
        let limits = LimitsConfig {
            max_frame_size: 8,
            ..LimitsConfig::default()
        };
        let mut session = Session::new(Role::Server, &ProtocolConfig::default(), &limits);
        session.receive(&client_wire(&[Frame::binary(vec![0u8; 9])]));
        assert_eq!(close_code(&decode_outbound(&mut session)[0]), 1009);
    }

    #[test]
    fn test_masking_enforced() {
        let mut server = Session::server();
        let codec = FrameCodec::new();
        server.receive(&codec.encode_to_bytes(&Frame::text("plain")));
        assert_eq!(close_code(&decode_outbound(&mut server)[0]), 1002);

        let mut client = Session::client();
        client.receive(&client_wire(&[Frame::text("masked")]));
        let out = decode_outbound(&mut client);
        assert!(out[0].is_masked(), "client frames are always masked");
        assert_eq!(close_code(&out[0]), 1002);
    }

    #[test]
    fn test_masking_not_enforced() {
        let protocol = ProtocolConfig {
            enforce_masking: false,
            ..ProtocolConfig::default()
        };
        let mut server = Session::new(Role::Server, &protocol, &LimitsConfig::default());
        let codec = FrameCodec::new();
        server.receive(&codec.encode_to_bytes(&Frame::text("plain")));
        assert!(matches!(
            &events(&mut server)[..],
            [Event::Message(m)] if m.as_text() == Some("plain")
        ));
    }

    #[test]
    fn test_client_masks_outbound() {
        let mut client = Session::client();
        client
            .send_message(MessageKind::Text, Bytes::from_static(b"hi"))
            .unwrap();
        client.ping(Bytes::from_static(b"p")).unwrap();

        let out = decode_outbound(&mut client);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(Frame::is_masked));
        assert_eq!(&out[0].payload[..], b"hi");
    }

    #[test]
    fn test_reserved_bits_close_connection() {
        let mut session = Session::server();
        let mut wire = client_wire(&[Frame::text("x")]);
        wire[0] |= 0x40;
        session.receive(&wire);
        assert_eq!(close_code(&decode_outbound(&mut session)[0]), 1002);
    }

    #[test]
    fn test_invalid_close_payloads() {
        for payload in [vec![0x03], vec![0x03, 0xED], vec![0x03, 0xE8, 0xFF, 0xFE]] {
            let mut session = Session::server();
            session.receive(&client_wire(&[Frame::new(true, OpCode::Close, payload)]));
            assert_eq!(close_code(&decode_outbound(&mut session)[0]), 1002);
        }
    }

    #[test]
    fn test_send_validation() {
        let mut session = Session::server();
        assert!(matches!(
            session.ping(Bytes::from(vec![0u8; 126])),
            Err(WebSocketError::ControlPayloadTooLarge(126))
        ));
        assert!(matches!(
            session.close(CloseCode::NoStatus, ""),
            Err(WebSocketError::Protocol(ProtocolViolation::InvalidCloseCode(1005)))
        ));
        assert!(matches!(
            session.close(CloseCode::Normal, &"x".repeat(124)),
            Err(WebSocketError::ControlPayloadTooLarge(126))
        ));
        assert!(session.is_open());
    }

    #[test]
    fn test_transport_closed_ends_session() {
        let mut session = Session::server();
        session.receive(&client_wire(&[Frame::new(false, OpCode::Text, "partial")]));
        session.transport_closed();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.should_release_transport());
        let events = events(&mut session);
        assert_eq!(ended_code(&events), None);

        session.receive(&client_wire(&[Frame::text("after")]));
        assert!(session.poll_event().is_none());
    }

    #[test]
    fn test_transport_error_reported() {
        let mut session = Session::client();
        session.transport_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let events = events(&mut session);
        assert!(matches!(events[0], Event::TransportError(_)));
        assert!(matches!(events[1], Event::ConnectionEnded { code: None, .. }));
        assert_eq!(session.state(), SessionState::Closed);
    }
}
