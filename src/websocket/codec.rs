//! Resumable WebSocket frame codec.
//!
//! [`FrameCodec::decode`] is fed the connection's whole unconsumed receive
//! buffer each time bytes arrive. Header fields already parsed are kept in
//! the codec together with a cursor into that buffer, so a call that cannot
//! finish a frame keeps its progress for the next call. The caller must not
//! drop bytes from the front of the buffer until a frame is returned, and
//! then must drop exactly `consumed` bytes.

use crate::websocket::error::ProtocolViolation;
use crate::websocket::frame::{apply_mask, Frame, OpCode};
use bytes::{BufMut, Bytes, BytesMut};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const LEN_16_SENTINEL: u8 = 126;
const LEN_64_SENTINEL: u8 = 127;

/// Decoder position within the frame currently being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the two fixed header bytes.
    Header,
    /// Waiting for a 16-bit extended length.
    ExtLen16,
    /// Waiting for a 64-bit extended length.
    ExtLen64,
    /// Waiting for the masking key (skipped when unmasked).
    MaskKey,
    /// Waiting for the full payload.
    Payload,
    /// A frame was just returned; the next call starts a new one.
    Complete,
}

/// Result of a successful [`FrameCodec::decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The buffer does not hold a complete frame yet.
    NeedsMoreData,
    /// A complete frame and the number of buffer bytes it occupied.
    Frame {
        /// The decoded frame, payload already unmasked.
        frame: Frame,
        /// Bytes to remove from the front of the buffer.
        consumed: usize,
    },
}

/// Header fields accumulated for the in-progress frame.
#[derive(Debug, Clone, Copy)]
struct PartialHeader {
    fin: bool,
    opcode: OpCode,
    masked: bool,
    payload_len: u64,
    mask: Option<[u8; 4]>,
}

impl Default for PartialHeader {
    fn default() -> Self {
        Self {
            fin: false,
            opcode: OpCode::Continuation,
            masked: false,
            payload_len: 0,
            mask: None,
        }
    }
}

/// WebSocket frame codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: ParseState,
    header: PartialHeader,
    /// Offset of the first byte not yet parsed.
    cursor: usize,
    max_payload_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Default maximum payload size (16 MB).
    pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

    /// Create a codec positioned at the start of a frame.
    pub fn new() -> Self {
        Self {
            state: ParseState::Header,
            header: PartialHeader::default(),
            cursor: 0,
            max_payload_size: Self::DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the largest payload a single frame may declare.
    #[must_use]
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Current parse state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.state = ParseState::Header;
        self.header = PartialHeader::default();
        self.cursor = 0;
    }

    /// Decode the next frame from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] as soon as the header breaks a rule;
    /// the codec is reset and the connection must be failed.
    pub fn decode(&mut self, buf: &[u8]) -> Result<Decoded, ProtocolViolation> {
        let result = self.advance(buf);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn advance(&mut self, buf: &[u8]) -> Result<Decoded, ProtocolViolation> {
        loop {
            match self.state {
                ParseState::Complete => self.reset(),
                ParseState::Header => {
                    if buf.len() < 2 {
                        return Ok(Decoded::NeedsMoreData);
                    }
                    self.parse_header(buf[0], buf[1])?;
                    self.cursor = 2;
                },
                ParseState::ExtLen16 => {
                    let Some(bytes) = buf.get(self.cursor..self.cursor + 2) else {
                        return Ok(Decoded::NeedsMoreData);
                    };
                    let len = u16::from_be_bytes([bytes[0], bytes[1]]);
                    self.cursor += 2;
                    self.set_payload_len(u64::from(len))?;
                },
                ParseState::ExtLen64 => {
                    let Some(bytes) = buf.get(self.cursor..self.cursor + 8) else {
                        return Ok(Decoded::NeedsMoreData);
                    };
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(bytes);
                    let len = u64::from_be_bytes(raw);
                    if len >> 63 != 0 {
                        return Err(ProtocolViolation::PayloadLengthOverflow(len));
                    }
                    self.cursor += 8;
                    self.set_payload_len(len)?;
                },
                ParseState::MaskKey => {
                    if self.header.masked {
                        let Some(bytes) = buf.get(self.cursor..self.cursor + 4) else {
                            return Ok(Decoded::NeedsMoreData);
                        };
                        self.header.mask = Some([bytes[0], bytes[1], bytes[2], bytes[3]]);
                        self.cursor += 4;
                    }
                    self.state = ParseState::Payload;
                },
                ParseState::Payload => {
                    // Bounded by max_payload_size, which is a usize.
                    let len = self.header.payload_len as usize;
                    let end = self.cursor + len;
                    let Some(bytes) = buf.get(self.cursor..end) else {
                        return Ok(Decoded::NeedsMoreData);
                    };

                    let mut payload = BytesMut::from(bytes);
                    if let Some(key) = self.header.mask {
                        apply_mask(&mut payload, key);
                    }

                    let frame = Frame {
                        fin: self.header.fin,
                        rsv1: false,
                        rsv2: false,
                        rsv3: false,
                        opcode: self.header.opcode,
                        mask: self.header.mask,
                        payload: payload.freeze(),
                    };
                    self.state = ParseState::Complete;
                    return Ok(Decoded::Frame {
                        frame,
                        consumed: end,
                    });
                },
            }
        }
    }

    fn parse_header(&mut self, first: u8, second: u8) -> Result<(), ProtocolViolation> {
        if first & 0x70 != 0 {
            return Err(ProtocolViolation::ReservedBitsUsed);
        }

        let fin = first & 0x80 != 0;
        let opcode = OpCode::try_from(first & 0x0F)?;
        if opcode.is_control() && !fin {
            return Err(ProtocolViolation::ControlFrameFragmented);
        }

        let len7 = second & 0x7F;
        if opcode.is_control() && usize::from(len7) > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolViolation::PayloadTooLarge { declared: len7 });
        }

        self.header = PartialHeader {
            fin,
            opcode,
            masked: second & 0x80 != 0,
            payload_len: 0,
            mask: None,
        };

        match len7 {
            LEN_16_SENTINEL => self.state = ParseState::ExtLen16,
            LEN_64_SENTINEL => self.state = ParseState::ExtLen64,
            len => self.set_payload_len(u64::from(len))?,
        }
        Ok(())
    }

    fn set_payload_len(&mut self, len: u64) -> Result<(), ProtocolViolation> {
        if len > self.max_payload_size as u64 {
            return Err(ProtocolViolation::FrameTooLarge {
                size: len,
                max: self.max_payload_size,
            });
        }
        self.header.payload_len = len;
        self.state = ParseState::MaskKey;
        Ok(())
    }

    /// Serialize `frame` onto `dst`, masking the payload iff `frame.mask` is set.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) {
        let len = frame.payload.len();
        let mask_len = if frame.mask.is_some() { 4 } else { 0 };
        dst.reserve(header_len(len) + mask_len + len);

        let mut first = u8::from(frame.opcode);
        if frame.fin {
            first |= 0x80;
        }
        if frame.rsv1 {
            first |= 0x40;
        }
        if frame.rsv2 {
            first |= 0x20;
        }
        if frame.rsv3 {
            first |= 0x10;
        }
        dst.put_u8(first);

        let mask_bit = if frame.mask.is_some() { 0x80 } else { 0x00 };
        if len <= MAX_CONTROL_PAYLOAD {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | LEN_16_SENTINEL);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | LEN_64_SENTINEL);
            dst.put_u64(len as u64);
        }

        match frame.mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], key);
            },
            None => dst.put_slice(&frame.payload),
        }
    }

    /// Serialize `frame` into a fresh buffer.
    pub fn encode_to_bytes(&self, frame: &Frame) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(frame, &mut dst);
        dst.freeze()
    }
}

/// Size of the fixed header plus extended length for a payload of `len` bytes.
pub fn header_len(len: usize) -> usize {
    if len <= MAX_CONTROL_PAYLOAD {
        2
    } else if len <= usize::from(u16::MAX) {
        4
    } else {
        10
    }
}
