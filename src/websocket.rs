//! A websocket is a connection that is "upgraded" to a Websocket.  Which basically implies
//! taking the underlying client connection (e.g. TCP connection) and re-purposing it to carry a
//! Websocket session.  Once upgraded, it cannot be downgraded.
//!
//! `Websocket::receive` reads frames until a complete message is available.  Along the way it
//! answers pings with pongs and, when the client sends a close frame, replies with a close frame
//! of its own and reports the end of the session.  A frame that violates the protocol ends the
//! session too: a close frame carrying the matching status code is sent on a best-effort basis
//! and the error is returned.  All frames sent by the server are unmasked.
//!
//! For more info:
//!
//! * <https://developer.mozilla.org/en-US/docs/Web/API/WebSockets_API/Writing_WebSocket_servers>
//! * <https://datatracker.ietf.org/doc/html/rfc6455#section-5>

use alloc::vec::Vec;
use core::fmt;

use embedded_io_async::{Read, Write};

use crate::frame::{Frame, FrameError, MAX_CONTROL_PAYLOAD, OpCode};
use crate::message::{Event, Message, MessageAssembler};
use crate::stream::{ByteStream, StreamError};

/// WebsocketError contains the errors that may be returned while handling a websocket connection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WebsocketError {
    /// The client closed the TCP connection without a close frame
    ConnectionClosed,
    /// Network Error during a read or write with the client
    NetworkError,
    /// The client violated the framing protocol
    Protocol(FrameError),
}

impl From<StreamError> for WebsocketError {
    fn from(value: StreamError) -> Self {
        match value {
            StreamError::ConnectionClosed => Self::ConnectionClosed,
            StreamError::NetworkError => Self::NetworkError,
        }
    }
}

impl From<FrameError> for WebsocketError {
    fn from(value: FrameError) -> Self {
        Self::Protocol(value)
    }
}

impl fmt::Display for WebsocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => f.write_str("connection closed by peer"),
            Self::NetworkError => f.write_str("network error"),
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl core::error::Error for WebsocketError {}

/// Status codes carried in close frames.
pub struct CloseReason;

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;

    /// Status code of a close frame payload, if it carries one.
    pub fn code(payload: &[u8]) -> Option<u16> {
        match payload {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// True if `code` may appear in a close frame on the wire.  1005, 1006 and 1015 are
    /// reserved for local use, everything below 1000 is unassigned.
    pub fn is_valid(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Check a received close frame payload: empty, or a valid status code followed by a UTF-8
    /// reason.  Returns the status code if there is one.
    pub fn parse(payload: &[u8]) -> Result<Option<u16>, FrameError> {
        match payload {
            [] => Ok(None),
            [_] => Err(FrameError::InvalidCloseCode),
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                if !Self::is_valid(code) {
                    return Err(FrameError::InvalidCloseCode);
                }
                core::str::from_utf8(reason).or(Err(FrameError::InvalidEncoding))?;
                Ok(Some(code))
            }
        }
    }

    /// Close frame payload for `code` and `reason`.  The reason is cut, on a character boundary,
    /// to fit a control frame.
    pub fn payload(code: u16, reason: &str) -> Vec<u8> {
        let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        let reason = &reason.as_bytes()[..end];

        let mut out = Vec::with_capacity(2 + reason.len());
        out.extend_from_slice(&code.to_be_bytes());
        out.extend_from_slice(reason);
        out
    }
}

/// Provides the Websocket protocol over the client connection
pub struct Websocket<'a, C> {
    stream: &'a mut ByteStream<C>,
    assembler: MessageAssembler,
    max_message_size: usize,
    close_sent: bool,
}

impl<'a, C: Read + Write> Websocket<'a, C> {
    /// Return a new Websocket over the provided client connection.  The upgrade handshake must
    /// already be complete.
    pub fn new(stream: &'a mut ByteStream<C>, max_message_size: usize) -> Self {
        Self {
            stream,
            assembler: MessageAssembler::new(max_message_size),
            max_message_size,
            close_sent: false,
        }
    }

    /// True once the session has ended, by a close frame or a protocol error.
    pub fn is_closed(&self) -> bool {
        self.assembler.is_closed()
    }

    /// Receive the next complete message.  Returns `Ok(None)` once the client has closed the
    /// session; nothing further is read after that.
    pub async fn receive(&mut self) -> Result<Option<Message>, WebsocketError> {
        loop {
            if self.assembler.is_closed() {
                return Ok(None);
            }

            let event = match Frame::read(&mut *self.stream, self.max_message_size).await {
                Ok(frame) => self.assembler.push(frame),
                Err(WebsocketError::Protocol(e)) => Err(e),
                Err(e) => return Err(e),
            };

            match event {
                Ok(None) => {}
                Ok(Some(Event::Message(message))) => return Ok(Some(message)),
                Ok(Some(Event::Ping(payload))) => {
                    trace!("answering ping of {} bytes", payload.len());
                    self.send_frame(OpCode::Pong, &payload).await?;
                }
                Ok(Some(Event::Pong(_))) => {}
                Ok(Some(Event::Close(payload))) => {
                    info!("websocket close requested by client");
                    if !self.close_sent {
                        let reply = match CloseReason::code(&payload) {
                            Some(code) => CloseReason::payload(code, ""),
                            None => Vec::new(),
                        };
                        self.send_close(&reply).await?;
                    }
                    return Ok(None);
                }
                Err(e) => {
                    warn!("websocket protocol error: {}", e);
                    if !self.close_sent {
                        // the connection is dropped regardless
                        let _ = self
                            .send_close(&CloseReason::payload(e.close_code(), ""))
                            .await;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Send a text message.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WebsocketError> {
        self.send_frame(OpCode::Text, text.as_bytes()).await
    }

    /// Send a binary message.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), WebsocketError> {
        self.send_frame(OpCode::Binary, data).await
    }

    /// Send `message` with the opcode matching its kind.
    pub async fn send_message(&mut self, message: &Message) -> Result<(), WebsocketError> {
        self.send_frame(message.opcode(), message.as_bytes()).await
    }

    /// Send a ping.  The payload is truncated to the 125 bytes a control frame allows.
    pub async fn ping(&mut self, payload: &[u8]) -> Result<(), WebsocketError> {
        let payload = &payload[..payload.len().min(MAX_CONTROL_PAYLOAD)];
        self.send_frame(OpCode::Ping, payload).await
    }

    /// Start closing the session with `code` and `reason`.  Messages already in flight from the
    /// client can still be received until its close frame arrives.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), WebsocketError> {
        if self.close_sent {
            return Ok(());
        }
        self.send_close(&CloseReason::payload(code, reason)).await
    }

    async fn send_close(&mut self, payload: &[u8]) -> Result<(), WebsocketError> {
        self.close_sent = true;
        self.send_frame(OpCode::Close, payload).await
    }

    async fn send_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), WebsocketError> {
        let frame = Frame {
            fin: true,
            opcode,
            mask: None,
            payload: payload.to_vec(),
        };

        self.stream.write_all(&frame.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{MockClient, client_frame};

    const KEY: [u8; 4] = [9, 8, 7, 6];

    /// Decode every frame the server wrote.
    fn sent_frames(output: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = output;
        while !rest.is_empty() {
            let (frame, used) = Frame::decode(rest).unwrap();
            assert!(!frame.masked());
            frames.push(frame);
            rest = &rest[used..];
        }
        frames
    }

    #[tokio::test]
    async fn test_receive_messages_then_close() {
        let mut raw = client_frame(true, 0x1, KEY, b"hello");
        raw.extend(client_frame(false, 0x2, KEY, &[1, 2]));
        raw.extend(client_frame(true, 0x0, KEY, &[3]));
        raw.extend(client_frame(true, 0x8, KEY, &[0x03, 0xe8, b'b', b'y', b'e']));
        raw.extend(client_frame(true, 0x1, KEY, b"never read"));

        let mut stream = ByteStream::new(MockClient::new(raw).chunked(5));
        let mut ws = Websocket::new(&mut stream, 1024);

        assert_eq!(ws.receive().await, Ok(Some(Message::from("hello"))));
        assert_eq!(
            ws.receive().await,
            Ok(Some(Message::Binary(std::vec![1, 2, 3])))
        );
        assert_eq!(ws.receive().await, Ok(None));
        assert!(ws.is_closed());
        assert_eq!(ws.receive().await, Ok(None));

        let client = stream.into_inner();
        let sent = sent_frames(&client.output);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(sent[0].payload, [0x03, 0xe8]);
        assert!(!client.remaining().is_empty());
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let mut raw = client_frame(false, 0x1, KEY, b"hel");
        raw.extend(client_frame(true, 0x9, KEY, b"are you there"));
        raw.extend(client_frame(true, 0x0, KEY, b"lo"));

        let mut stream = ByteStream::new(MockClient::new(raw));
        let mut ws = Websocket::new(&mut stream, 1024);
        assert_eq!(ws.receive().await, Ok(Some(Message::from("hello"))));

        let sent = sent_frames(&stream.into_inner().output);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, OpCode::Pong);
        assert_eq!(sent[0].payload, b"are you there");
    }

    #[tokio::test]
    async fn test_unmasked_frame_terminates() {
        let raw = std::vec![0x81, 0x02, b'h', b'i'];
        let mut stream = ByteStream::new(MockClient::new(raw));
        let mut ws = Websocket::new(&mut stream, 1024);

        assert_eq!(
            ws.receive().await,
            Err(WebsocketError::Protocol(FrameError::Unmasked))
        );

        let sent = sent_frames(&stream.into_inner().output);
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(CloseReason::code(&sent[0].payload), Some(CloseReason::PROTOCOL_ERROR));
    }

    #[tokio::test]
    async fn test_interleaved_data_frame_terminates() {
        let mut raw = client_frame(false, 0x1, KEY, b"one");
        raw.extend(client_frame(true, 0x1, KEY, b"two"));

        let mut stream = ByteStream::new(MockClient::new(raw));
        let mut ws = Websocket::new(&mut stream, 1024);
        assert_eq!(
            ws.receive().await,
            Err(WebsocketError::Protocol(FrameError::UnexpectedDataFrame))
        );
        assert!(ws.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_utf8_close_code() {
        let raw = client_frame(true, 0x1, KEY, &[0xc3, 0x28]);
        let mut stream = ByteStream::new(MockClient::new(raw));
        let mut ws = Websocket::new(&mut stream, 1024);
        assert_eq!(
            ws.receive().await,
            Err(WebsocketError::Protocol(FrameError::InvalidEncoding))
        );

        let sent = sent_frames(&stream.into_inner().output);
        assert_eq!(CloseReason::code(&sent[0].payload), Some(CloseReason::INVALID_PAYLOAD));
    }

    #[tokio::test]
    async fn test_eof_without_close_frame() {
        let raw = client_frame(true, 0x1, KEY, b"hello");
        let mut stream = ByteStream::new(MockClient::new(raw));
        let mut ws = Websocket::new(&mut stream, 1024);
        assert_eq!(ws.receive().await, Ok(Some(Message::from("hello"))));
        assert_eq!(ws.receive().await, Err(WebsocketError::ConnectionClosed));
        assert!(stream.into_inner().output.is_empty());
    }

    #[tokio::test]
    async fn test_send_api() {
        let mut stream = ByteStream::new(MockClient::new(Vec::new()));
        let mut ws = Websocket::new(&mut stream, 1024);

        ws.send_text("hi").await.unwrap();
        ws.send_binary(&[0u8; 300]).await.unwrap();
        ws.send_message(&Message::from("echo")).await.unwrap();
        ws.ping(&[1u8; 200]).await.unwrap();
        ws.close(CloseReason::GOING_AWAY, "shutting down").await.unwrap();
        ws.close(CloseReason::NORMAL, "").await.unwrap();

        let sent = sent_frames(&stream.into_inner().output);
        let kinds: Vec<_> = sent.iter().map(|f| (f.opcode, f.payload.len())).collect();
        assert_eq!(
            kinds,
            [
                (OpCode::Text, 2),
                (OpCode::Binary, 300),
                (OpCode::Text, 4),
                (OpCode::Ping, 125),
                (OpCode::Close, 15),
            ]
        );
        assert!(sent.iter().all(|f| f.fin));
        assert_eq!(&sent[4].payload[2..], b"shutting down");
    }

    #[test]
    fn test_close_payload() {
        assert_eq!(CloseReason::code(&[]), None);
        assert_eq!(CloseReason::code(&[0x03]), None);
        assert_eq!(CloseReason::code(&[0x03, 0xe9, b'x']), Some(1001));

        let long = "x".repeat(200);
        let payload = CloseReason::payload(CloseReason::NORMAL, &long);
        assert_eq!(payload.len(), MAX_CONTROL_PAYLOAD);
        assert_eq!(payload[..2], [0x03, 0xe8]);
    }

    #[test]
    fn test_close_reason_cut_on_char_boundary() {
        let long = "é".repeat(70);
        let payload = CloseReason::payload(CloseReason::GOING_AWAY, &long);
        assert_eq!(payload.len(), 2 + 122);
        assert!(core::str::from_utf8(&payload[2..]).is_ok());
        assert_eq!(CloseReason::parse(&payload), Ok(Some(CloseReason::GOING_AWAY)));
    }

    #[test]
    fn test_close_parse() {
        assert_eq!(CloseReason::parse(&[]), Ok(None));
        assert_eq!(CloseReason::parse(&[0x03]), Err(FrameError::InvalidCloseCode));
        assert_eq!(CloseReason::parse(&[0x03, 0xe8, b'o', b'k']), Ok(Some(1000)));
        assert_eq!(CloseReason::parse(&4000u16.to_be_bytes()), Ok(Some(4000)));
        for code in [0u16, 999, 1004, 1005, 1006, 1015, 2000, 5000] {
            assert_eq!(
                CloseReason::parse(&code.to_be_bytes()),
                Err(FrameError::InvalidCloseCode),
                "code {}",
                code
            );
        }
        assert_eq!(
            CloseReason::parse(&[0x03, 0xe8, 0xff]),
            Err(FrameError::InvalidEncoding)
        );
    }

    #[tokio::test]
    async fn test_invalid_close_code_answered_with_protocol_error() {
        for payload in [&1005u16.to_be_bytes()[..], &[0x03][..]] {
            let raw = client_frame(true, 0x8, KEY, payload);
            let mut stream = ByteStream::new(MockClient::new(raw));
            let mut ws = Websocket::new(&mut stream, 1024);
            assert_eq!(
                ws.receive().await,
                Err(WebsocketError::Protocol(FrameError::InvalidCloseCode))
            );

            let sent = sent_frames(&stream.into_inner().output);
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].opcode, OpCode::Close);
            assert_eq!(
                CloseReason::code(&sent[0].payload),
                Some(CloseReason::PROTOCOL_ERROR)
            );
        }
    }
}
