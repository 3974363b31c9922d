use alloc::string::String;
use alloc::vec::Vec;
use core::mem;

use crate::frame::{Frame, FrameError, OpCode};
use crate::websocket::CloseReason;

/// A complete data message, reassembled from one or more frames.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    /// Text message, already decoded from UTF-8
    Text(String),
    /// Binary message, passed through uninterpreted
    Binary(Vec<u8>),
}

impl Message {
    /// Interpret `payload` according to `opcode`.  Text must be valid UTF-8; only text and
    /// binary opcodes carry messages.
    pub fn decode(opcode: OpCode, payload: Vec<u8>) -> Result<Self, FrameError> {
        match opcode {
            OpCode::Text => String::from_utf8(payload)
                .map(Message::Text)
                .or(Err(FrameError::InvalidEncoding)),
            OpCode::Binary => Ok(Message::Binary(payload)),
            other => Err(FrameError::UnsupportedOpcode(other as u8)),
        }
    }

    /// The opcode the message is sent with.
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Text(_) => OpCode::Text,
            Self::Binary(_) => OpCode::Binary,
        }
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(String::from(value))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// What a frame amounted to once fed to the `MessageAssembler`.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A data message is complete
    Message(Message),
    /// The peer sent a ping; it must be answered with a pong carrying the same payload
    Ping(Vec<u8>),
    /// The peer sent a pong
    Pong(Vec<u8>),
    /// The peer closed the connection; the payload is the raw close frame body
    Close(Vec<u8>),
}

#[derive(Debug, PartialEq)]
enum State {
    Idle,
    Accumulating { opcode: OpCode, buffer: Vec<u8> },
    Closed,
}

/// MessageAssembler turns a sequence of frames into messages.
///
/// A data frame with fin set is a message on its own.  A data frame without fin starts a
/// fragmented message which continues with continuation frames until one has fin set; the
/// message keeps the opcode of its first fragment.  Control frames may arrive between fragments
/// and are reported as they come.  A close frame, or any protocol violation, closes the
/// assembler for good.  A close frame must carry either nothing or a valid status code with a
/// UTF-8 reason.
#[derive(Debug)]
pub struct MessageAssembler {
    state: State,
    max_message_size: usize,
}

impl MessageAssembler {
    /// An idle assembler refusing messages larger than `max_message_size` bytes.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: State::Idle,
            max_message_size,
        }
    }

    /// True once a close frame or a protocol error has been seen.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// True while a fragmented message is in progress.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    /// Feed one frame.  Returns the event it completes, if any.  Frames pushed after the
    /// assembler has closed are ignored.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Event>, FrameError> {
        if self.is_closed() {
            return Ok(None);
        }

        let res = self.step(frame);
        if res.is_err() {
            self.state = State::Closed;
        }
        res
    }

    fn step(&mut self, frame: Frame) -> Result<Option<Event>, FrameError> {
        match frame.opcode {
            OpCode::Close => {
                CloseReason::parse(&frame.payload)?;
                self.state = State::Closed;
                Ok(Some(Event::Close(frame.payload)))
            }
            OpCode::Ping => Ok(Some(Event::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Event::Pong(frame.payload))),
            OpCode::Continuation => {
                let State::Accumulating { opcode, buffer } = &mut self.state else {
                    return Err(FrameError::UnexpectedContinuation);
                };

                let total = buffer.len() + frame.payload.len();
                if total > self.max_message_size {
                    return Err(FrameError::TooLarge(total as u64));
                }
                buffer.extend_from_slice(&frame.payload);

                if !frame.fin {
                    return Ok(None);
                }

                let opcode = *opcode;
                let payload = mem::take(buffer);
                self.state = State::Idle;
                Message::decode(opcode, payload).map(|m| Some(Event::Message(m)))
            }
            opcode => {
                if self.is_accumulating() {
                    return Err(FrameError::UnexpectedDataFrame);
                }
                if frame.payload.len() > self.max_message_size {
                    return Err(FrameError::TooLarge(frame.payload.len() as u64));
                }

                if frame.fin {
                    return Message::decode(opcode, frame.payload).map(|m| Some(Event::Message(m)));
                }

                self.state = State::Accumulating {
                    opcode,
                    buffer: frame.payload,
                };
                Ok(None)
            }
        }
    }
}
