//! WebSocket frame types and utilities.
//!
//! Wire layout (RFC 6455 Section 5.2):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use crate::websocket::error::ProtocolViolation;
use bytes::{BufMut, Bytes, BytesMut};

/// WebSocket operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation frame.
    Continuation,
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Close frame.
    Close,
    /// Ping frame.
    Ping,
    /// Pong frame.
    Pong,
}

impl OpCode {
    /// Check if this is a control frame.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Check if this is a data frame.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text | Self::Binary | Self::Continuation)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolViolation;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(ProtocolViolation::ReservedOpcodeUsed(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        match value {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// WebSocket close codes as defined in RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// Endpoint going away.
    GoingAway,
    /// Protocol error.
    Protocol,
    /// Unsupported data type.
    Unsupported,
    /// No status received.
    NoStatus,
    /// Abnormal closure.
    Abnormal,
    /// Invalid frame payload data.
    InvalidData,
    /// Policy violation.
    PolicyViolation,
    /// Message too big.
    MessageTooBig,
    /// Missing extension.
    MissingExtension,
    /// Internal server error.
    InternalError,
    /// TLS handshake failure.
    TlsHandshake,
    /// Custom close code.
    Custom(u16),
}

impl CloseCode {
    /// Check if this code may be sent in a close frame.
    pub fn is_valid(&self) -> bool {
        let code: u16 = (*self).into();
        // IANA-registered 1000-1014, then 3000-4999
        matches!(code, 1000..=1014 | 3000..=4999) && !self.is_reserved()
    }

    /// Check if this is a reserved close code that never appears on the wire.
    pub fn is_reserved(&self) -> bool {
        let code: u16 = (*self).into();
        matches!(code, 1004 | 1005 | 1006 | 1015)
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::InvalidData,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MissingExtension,
            1011 => Self::InternalError,
            1015 => Self::TlsHandshake,
            code => Self::Custom(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self {
        match value {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MissingExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Custom(code) => code,
        }
    }
}

/// Endpoint role. Decides outbound masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting side; masks every frame it sends.
    Client,
    /// Listening side; never masks.
    Server,
}

impl Role {
    /// Mask key for an outbound frame sent in this role.
    pub fn outbound_mask(&self) -> Option<[u8; 4]> {
        match self {
            Self::Client => Some(rand::random()),
            Self::Server => None,
        }
    }
}

/// A single WebSocket frame. The payload is always held unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key; `Some` iff the MASK bit is set on the wire.
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create an unmasked frame with all reserved bits clear.
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a final text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    /// Create a final binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    /// Create a continuation frame.
    pub fn continuation(fin: bool, payload: impl Into<Bytes>) -> Self {
        Self::new(fin, OpCode::Continuation, payload)
    }

    /// Create a ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    /// Create a pong frame.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Create a close frame carrying a status code and reason.
    pub fn close(code: CloseCode, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code.into());
        payload.put_slice(reason.as_bytes());
        Self::new(true, OpCode::Close, payload.freeze())
    }

    /// Set the final-fragment flag.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Set the masking key.
    #[must_use]
    pub fn with_mask(mut self, mask: Option<[u8; 4]>) -> Self {
        self.mask = mask;
        self
    }

    /// Whether the MASK bit is set.
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Decode the status code and reason of a close frame.
    ///
    /// Returns `Ok(None)` for an empty close payload.
    pub fn close_reason(&self) -> Result<Option<(CloseCode, &str)>, ProtocolViolation> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(ProtocolViolation::InvalidClosePayload),
            _ => {
                let raw = u16::from_be_bytes([self.payload[0], self.payload[1]]);
                let code = CloseCode::from(raw);
                if !code.is_valid() {
                    return Err(ProtocolViolation::InvalidCloseCode(raw));
                }
                let reason = std::str::from_utf8(&self.payload[2..])
                    .map_err(|_| ProtocolViolation::InvalidClosePayload)?;
                Ok(Some((code, reason)))
            },
        }
    }
}

/// XOR `buf` in place with `key`, cycling every 4 bytes.
///
/// Applying it twice with the same key restores the input.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Kind of an application data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text.
    Text,
    /// Arbitrary bytes.
    Binary,
}

impl MessageKind {
    /// Opcode of the first frame of a message of this kind.
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Text => OpCode::Text,
            Self::Binary => OpCode::Binary,
        }
    }
}

/// A complete, reassembled application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message kind, taken from the first frame.
    pub kind: MessageKind,
    /// Concatenated payload of every fragment.
    pub payload: Bytes,
}

impl Message {
    /// Create a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: data.into(),
        }
    }

    /// The payload as text, if this is a UTF-8 text message.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(OpCode::try_from(0).unwrap(), OpCode::Continuation);
        assert_eq!(OpCode::try_from(1).unwrap(), OpCode::Text);
        assert_eq!(OpCode::try_from(2).unwrap(), OpCode::Binary);
        assert_eq!(OpCode::try_from(8).unwrap(), OpCode::Close);
        assert_eq!(OpCode::try_from(9).unwrap(), OpCode::Ping);
        assert_eq!(OpCode::try_from(10).unwrap(), OpCode::Pong);

        for op in [OpCode::Text, OpCode::Close, OpCode::Pong] {
            assert_eq!(OpCode::try_from(u8::from(op)).unwrap(), op);
        }
    }

    #[test]
    fn test_reserved_opcodes_rejected() {
        for raw in (0x3..=0x7).chain(0xB..=0xF) {
            assert_eq!(
                OpCode::try_from(raw),
                Err(ProtocolViolation::ReservedOpcodeUsed(raw))
            );
        }
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Continuation.is_control());
        assert!(OpCode::Continuation.is_data());
    }

    #[test]
    fn test_close_code_conversion() {
        assert_eq!(CloseCode::from(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from(1002), CloseCode::Protocol);
        assert_eq!(CloseCode::from(4001), CloseCode::Custom(4001));
        assert_eq!(u16::from(CloseCode::MessageTooBig), 1009);
    }

    #[test]
    fn test_close_code_valid() {
        assert!(CloseCode::Normal.is_valid());
        assert!(CloseCode::InternalError.is_valid());
        assert!(CloseCode::Custom(3000).is_valid());
        assert!(CloseCode::Custom(4999).is_valid());
        assert!(CloseCode::from(1012).is_valid());
        assert!(CloseCode::from(1014).is_valid());
        assert!(!CloseCode::from(1016).is_valid());
        assert!(!CloseCode::Custom(999).is_valid());
        assert!(!CloseCode::Custom(2000).is_valid());
        assert!(!CloseCode::NoStatus.is_valid());
        assert!(!CloseCode::Abnormal.is_valid());
        assert!(!CloseCode::TlsHandshake.is_valid());
    }

    #[test]
    fn test_mask_involution() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        for len in 0..=1000 {
            let original: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
            let mut data = original.clone();
            apply_mask(&mut data, key);
            apply_mask(&mut data, key);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn test_mask_rfc_example() {
        // RFC 6455 Section 5.7: masked "Hello".
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = Frame::close(CloseCode::GoingAway, "bye");
        assert_eq!(&frame.payload[..], &[0x03, 0xE9, b'b', b'y', b'e']);
        let (code, reason) = frame.close_reason().unwrap().unwrap();
        assert_eq!(code, CloseCode::GoingAway);
        assert_eq!(reason, "bye");
    }

    #[test]
    fn test_close_reason_validation() {
        assert_eq!(Frame::new(true, OpCode::Close, Bytes::new()).close_reason(), Ok(None));
        assert_eq!(
            Frame::new(true, OpCode::Close, vec![0x03]).close_reason(),
            Err(ProtocolViolation::InvalidClosePayload)
        );
        assert_eq!(
            Frame::new(true, OpCode::Close, vec![0x03, 0xED]).close_reason(),
            Err(ProtocolViolation::InvalidCloseCode(1005))
        );
        assert_eq!(
            Frame::new(true, OpCode::Close, vec![0x03, 0xF5]).close_reason(),
            Ok(Some((CloseCode::from(1013), "")))
        );
        assert_eq!(
            Frame::new(true, OpCode::Close, vec![0x03, 0xE8, 0xFF]).close_reason(),
            Err(ProtocolViolation::InvalidClosePayload)
        );
    }

    #[test]
    fn test_role_masking() {
        assert!(Role::Client.outbound_mask().is_some());
        assert!(Role::Server.outbound_mask().is_none());
    }

    #[test]
    fn test_message_as_text() {
        assert_eq!(Message::text("hi").as_text(), Some("hi"));
        assert_eq!(Message::binary(vec![1, 2]).as_text(), None);
        assert_eq!(MessageKind::Binary.opcode(), OpCode::Binary);
    }
}
