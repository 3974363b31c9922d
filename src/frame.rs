//! Websocket frames on the wire.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use alloc::vec::Vec;
use core::fmt;

use embedded_io_async::Read;

use crate::mask::apply_mask;
#[cfg(feature = "getrandom")]
use crate::mask::generate_mask;
use crate::stream::{ByteStream, StreamError};
use crate::websocket::{CloseReason, WebsocketError};

const FIN_BIT: u8 = 0b1000_0000;
const RSV_BITS: u8 = 0b0111_0000;
const OPCODE_BITS: u8 = 0b0000_1111;
const MASK_BIT: u8 = 0b1000_0000;
const LEN_BITS: u8 = 0b0111_1111;

const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Largest possible frame header: 2 bytes, 8 bytes of extended length, 4 bytes of mask key.
pub const MAX_HEADER_LEN: usize = 14;
/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// FrameError covers every way a client can violate the framing protocol.  Any of these ends
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// More header bytes are needed; the value is how many.
    Incomplete(usize),
    /// A client frame arrived without the mask bit set
    Unmasked,
    /// One of the RSV bits was set but no extension was negotiated
    ReservedBits,
    /// The opcode is reserved, or not valid where it appeared
    UnsupportedOpcode(u8),
    /// A control frame had fin cleared
    FragmentedControl,
    /// A control frame carried more than 125 bytes
    ControlTooLong,
    /// The payload or assembled message exceeds the permitted size
    TooLarge(u64),
    /// A text message was not valid UTF-8
    InvalidEncoding,
    /// A continuation frame arrived with no message in progress
    UnexpectedContinuation,
    /// A new data frame arrived before the previous message's final fragment
    UnexpectedDataFrame,
    /// The peer closed the connection part way through a frame
    Truncated,
    /// A close frame carried a one byte payload or a status code not allowed on the wire
    InvalidCloseCode,
    /// No random source was available to generate a mask key
    MaskUnavailable,
}

impl FrameError {
    /// Status code to send in the close frame that reports this error.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidEncoding => CloseReason::INVALID_PAYLOAD,
            Self::TooLarge(_) => CloseReason::TOO_BIG,
            _ => CloseReason::PROTOCOL_ERROR,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete(n) => write!(f, "frame header needs {} more bytes", n),
            Self::Unmasked => f.write_str("client frame is not masked"),
            Self::ReservedBits => f.write_str("reserved bits set without an extension"),
            Self::UnsupportedOpcode(op) => write!(f, "unsupported opcode {:#x}", op),
            Self::FragmentedControl => f.write_str("control frame is fragmented"),
            Self::ControlTooLong => f.write_str("control frame payload exceeds 125 bytes"),
            Self::TooLarge(n) => write!(f, "payload of {} bytes exceeds limit", n),
            Self::InvalidEncoding => f.write_str("text message is not valid utf8"),
            Self::UnexpectedContinuation => f.write_str("continuation frame without a message"),
            Self::UnexpectedDataFrame => {
                f.write_str("data frame before the previous message completed")
            }
            Self::Truncated => f.write_str("connection closed inside a frame"),
            Self::InvalidCloseCode => f.write_str("invalid close frame status code"),
            Self::MaskUnavailable => f.write_str("no random source for mask key"),
        }
    }
}

impl core::error::Error for FrameError {}

/// The websocket OP code of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OpCode {
    /// Further fragment of a message
    Continuation = 0x0,
    /// UTF-8 text data
    Text = 0x1,
    /// Binary data
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Close, ping and pong are control frames.
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }

    /// Text and binary frames start a message.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            n => Err(FrameError::UnsupportedOpcode(n)),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(s)
    }
}

/// FrameHeader encodes/decodes the part of a frame preceding the payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Last fragment of the message
    pub fin: bool,
    /// The websocket OP code value
    pub opcode: OpCode,
    /// The length of the payload
    pub len: u64,
    /// The masking key, present iff the mask bit is set
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Decode a header from the start of `value`, returning it with the number of bytes it
    /// occupies.  When `value` is too short the error is `FrameError::Incomplete` with the number
    /// of additional bytes required to make progress.
    pub fn decode(value: &[u8]) -> Result<(Self, usize), FrameError> {
        let mut required_bytes = 2usize;

        if value.len() < required_bytes {
            return Err(FrameError::Incomplete(required_bytes - value.len()));
        }

        let fin = value[0] & FIN_BIT != 0;
        if value[0] & RSV_BITS != 0 {
            return Err(FrameError::ReservedBits);
        }
        let opcode = OpCode::try_from(value[0] & OPCODE_BITS)?;

        let masked = value[1] & MASK_BIT != 0;

        let mut len = u64::from(value[1] & LEN_BITS);
        if len == u64::from(LEN_16) {
            // 16 bit length field
            required_bytes += 2;
            if value.len() < required_bytes {
                return Err(FrameError::Incomplete(required_bytes - value.len()));
            }
            len = u64::from(u16::from_be_bytes([value[2], value[3]]));
        } else if len == u64::from(LEN_64) {
            // 64 bit length field
            required_bytes += 8;
            if value.len() < required_bytes {
                return Err(FrameError::Incomplete(required_bytes - value.len()));
            }
            let mut be = [0u8; 8];
            be.copy_from_slice(&value[2..10]);
            len = u64::from_be_bytes(be);
            if len > i64::MAX as u64 {
                // the most significant bit must be 0
                return Err(FrameError::TooLarge(len));
            }
        }

        if opcode.is_control() {
            if !fin {
                return Err(FrameError::FragmentedControl);
            }
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameError::ControlTooLong);
            }
        }

        let mut mask = None;
        if masked {
            let mask_offset = required_bytes;
            required_bytes += 4;
            if value.len() < required_bytes {
                return Err(FrameError::Incomplete(required_bytes - value.len()));
            }
            mask = Some([
                value[mask_offset],
                value[mask_offset + 1],
                value[mask_offset + 2],
                value[mask_offset + 3],
            ]);
        }

        Ok((
            FrameHeader {
                fin,
                opcode,
                len,
                mask,
            },
            required_bytes,
        ))
    }

    /// Encode into `dest`, returning the number of bytes written.
    pub fn encode(&self, dest: &mut [u8; MAX_HEADER_LEN]) -> usize {
        *dest = [0u8; MAX_HEADER_LEN];

        // fin 1 MSB byte 1
        if self.fin {
            dest[0] |= FIN_BIT;
        }

        // opcode 4 LSB bits byte 1
        dest[0] |= self.opcode as u8 & OPCODE_BITS;

        // masked 1 MSB byte 2
        if self.mask.is_some() {
            dest[1] |= MASK_BIT;
        }

        let mask_offset = if self.len <= 125 {
            // 7 LSB byte 2
            dest[1] |= self.len as u8;
            2
        } else if self.len <= u64::from(u16::MAX) {
            // indicate 16 bit length with byte 2 7LSB bits = 126
            dest[1] |= LEN_16;
            dest[2..4].copy_from_slice(&(self.len as u16).to_be_bytes());
            4
        } else {
            // indicate 64 bit length with byte 2 7LSB bits = 127
            dest[1] |= LEN_64;
            dest[2..10].copy_from_slice(&self.len.to_be_bytes());
            10
        };

        match self.mask {
            Some(mask) => {
                dest[mask_offset..mask_offset + 4].copy_from_slice(&mask);
                mask_offset + 4
            }
            None => mask_offset,
        }
    }
}

/// One frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Last fragment of the message
    pub fin: bool,
    /// The websocket OP code value
    pub opcode: OpCode,
    /// The masking key the frame carried on the wire, if any
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// True if the frame was masked on the wire.
    pub fn masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Read one client frame from `stream`.
    ///
    /// Reads exactly the bytes the frame occupies and nothing beyond.  An unmasked frame is
    /// rejected as soon as its second byte is seen, and a payload longer than `max_payload` is
    /// rejected before any of it is read.
    ///
    /// EOF before the first byte is `WebsocketError::ConnectionClosed`; EOF anywhere after it is
    /// `FrameError::Truncated`.
    pub async fn read<C: Read>(
        stream: &mut ByteStream<C>,
        max_payload: usize,
    ) -> Result<Frame, WebsocketError> {
        let mut header_buf = [0u8; MAX_HEADER_LEN];
        let mut offset = 2;

        stream.read_exactly_into(&mut header_buf[..1]).await?;
        stream
            .read_exactly_into(&mut header_buf[1..offset])
            .await
            .map_err(truncated)?;
        if header_buf[1] & MASK_BIT == 0 {
            return Err(FrameError::Unmasked.into());
        }

        let header: FrameHeader;
        loop {
            header = match FrameHeader::decode(&header_buf[..offset]) {
                Ok((h, _)) => h,
                Err(FrameError::Incomplete(n)) => {
                    stream
                        .read_exactly_into(&mut header_buf[offset..offset + n])
                        .await
                        .map_err(truncated)?;
                    offset += n;
                    continue;
                }
                Err(e) => {
                    return Err(e.into());
                }
            };
            break;
        }

        if header.len > max_payload as u64 {
            return Err(FrameError::TooLarge(header.len).into());
        }

        let mut payload = stream
            .read_exactly(header.len as usize)
            .await
            .map_err(truncated)?;
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        trace!(
            "received {} frame fin={} len={}",
            header.opcode,
            header.fin,
            payload.len()
        );

        Ok(Frame {
            fin: header.fin,
            opcode: header.opcode,
            mask: header.mask,
            payload,
        })
    }

    /// Decode one complete frame from the start of `data`, masked or not, returning it with the
    /// number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Frame, usize), FrameError> {
        let (header, header_len) = FrameHeader::decode(data)?;

        let available = (data.len() - header_len) as u64;
        if header.len > available {
            // saturate rather than wrap on 32 bit targets
            let missing = usize::try_from(header.len - available).unwrap_or(usize::MAX);
            return Err(FrameError::Incomplete(missing));
        }

        let end = header_len + header.len as usize;
        let mut payload = data[header_len..end].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        Ok((
            Frame {
                fin: header.fin,
                opcode: header.opcode,
                mask: header.mask,
                payload,
            },
            end,
        ))
    }

    /// Encode the frame, masking the payload with the frame's key if it has one.
    pub fn encode(&self) -> Vec<u8> {
        let header = FrameHeader {
            fin: self.fin,
            opcode: self.opcode,
            len: self.payload.len() as u64,
            mask: self.mask,
        };

        let mut encoded_header = [0u8; MAX_HEADER_LEN];
        let header_len = header.encode(&mut encoded_header);

        let mut out = Vec::with_capacity(header_len + self.payload.len());
        out.extend_from_slice(&encoded_header[..header_len]);
        out.extend_from_slice(&self.payload);
        if let Some(mask) = self.mask {
            apply_mask(&mut out[header_len..], mask);
        }

        out
    }
}

fn truncated(e: StreamError) -> WebsocketError {
    match e {
        StreamError::ConnectionClosed => FrameError::Truncated.into(),
        e => e.into(),
    }
}

#[cfg(feature = "getrandom")]
fn mask_key() -> Result<[u8; 4], FrameError> {
    generate_mask().or(Err(FrameError::MaskUnavailable))
}

#[cfg(not(feature = "getrandom"))]
fn mask_key() -> Result<[u8; 4], FrameError> {
    Err(FrameError::MaskUnavailable)
}

/// Encode `payload` as a single frame.  With `mask` set a random key is generated and the payload
/// is masked with it; servers send unmasked frames (`mask == false`).
///
/// Key generation needs the `getrandom` feature.  Without it a masked encode fails with
/// `FrameError::MaskUnavailable`; build a `Frame` with an explicit key instead.
pub fn encode_frame(
    payload: &[u8],
    opcode: OpCode,
    fin: bool,
    mask: bool,
) -> Result<Vec<u8>, FrameError> {
    let mask = if mask { Some(mask_key()?) } else { None };

    Ok(Frame {
        fin,
        opcode,
        mask,
        payload: payload.to_vec(),
    }
    .encode())
}
