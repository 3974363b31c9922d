//! The opening handshake that upgrades an HTTP connection to a Websocket.
//!
//! A request qualifies for upgrade when it is a `GET`, its `Connection` header lists the
//! `Upgrade` token, its `Upgrade` header is `websocket` and it carries a `Sec-WebSocket-Key`.
//! A `Sec-WebSocket-Version` other than 13 is refused; the server answers it with
//! `426 Upgrade Required` naming the version it speaks.
//! The server proves it understood the request by hashing the key with a fixed GUID and
//! returning the result in `Sec-WebSocket-Accept`.
//!
//! ```
//! use wslite::handshake::accept_key;
//!
//! assert_eq!(
//!     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
//!     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
//! );
//! ```
//!
//! For more info:
//!
//! * <https://datatracker.ietf.org/doc/html/rfc6455#section-4.2>

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use base64ct::{Base64, Encoding};
use sha1::{Digest, Sha1};

use crate::ascii::contains_token;
use crate::header::{
    CONNECTION, HeaderMerge, Headers, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use crate::request::{Method, Request};
use crate::response::{ResponseBuilder, StatusCode};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version spoken.
pub const WEBSOCKET_VERSION: &str = "13";

const WEBSOCKET: &str = "websocket";

/// HandshakeError explains why a request was refused an upgrade.  The server answers
/// `UnsupportedVersion` with 426 Upgrade Required and the rest with 400 Bad Request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeError {
    /// The request method was not GET
    MethodNotGet,
    /// The Connection header is missing or does not contain the `Upgrade` token
    NotAnUpgrade,
    /// The Upgrade header is missing or is not `websocket`
    NotWebsocket,
    /// The Sec-WebSocket-Key header is missing or empty
    MissingKey,
    /// The Sec-WebSocket-Version header names a version other than 13
    UnsupportedVersion,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MethodNotGet => "websocket upgrade must use GET",
            Self::NotAnUpgrade => "connection header does not request an upgrade",
            Self::NotWebsocket => "upgrade header is not websocket",
            Self::MissingKey => "websocket upgrade did not include a Sec-WebSocket-Key header",
            Self::UnsupportedVersion => "unsupported websocket version",
        };
        f.write_str(s)
    }
}

impl core::error::Error for HandshakeError {}

/// Check that `request` asks for a Websocket upgrade, returning the client key.
pub fn validate(request: &Request) -> Result<&str, HandshakeError> {
    if request.method != Method::GET {
        return Err(HandshakeError::MethodNotGet);
    }

    match request.header(CONNECTION) {
        Some(v) if contains_token(v, UPGRADE) => {}
        _ => return Err(HandshakeError::NotAnUpgrade),
    }

    match request.header(UPGRADE) {
        Some(v) if v.eq_ignore_ascii_case(WEBSOCKET) => {}
        _ => return Err(HandshakeError::NotWebsocket),
    }

    let key = match request.header(SEC_WEBSOCKET_KEY) {
        Some(k) if !k.is_empty() => k,
        _ => return Err(HandshakeError::MissingKey),
    };

    match request.header(SEC_WEBSOCKET_VERSION) {
        Some(v) if v != WEBSOCKET_VERSION => Err(HandshakeError::UnsupportedVersion),
        _ => Ok(key),
    }
}

/// Compute the `Sec-WebSocket-Accept` value for the client supplied `key`: the base64 encoding
/// of the SHA-1 digest of the key followed by `WEBSOCKET_GUID`.
pub fn accept_key(key: &str) -> String {
    let mut key_hasher = Sha1::new();
    key_hasher.update(key.as_bytes());
    key_hasher.update(WEBSOCKET_GUID.as_bytes());
    let key_hash = key_hasher.finalize();

    Base64::encode_string(&key_hash)
}

/// A validated upgrade request.
#[derive(Clone, Debug, PartialEq)]
pub struct Handshake {
    /// Value to return in `Sec-WebSocket-Accept`
    pub accept: String,
}

impl Handshake {
    /// Validate `request` and derive the accept value from its key.
    pub fn from_request(request: &Request) -> Result<Self, HandshakeError> {
        let key = validate(request)?;
        Ok(Self {
            accept: accept_key(key),
        })
    }

    /// The `101 Switching Protocols` response completing the handshake.  It carries only the
    /// upgrade headers: no `Server`, no `Content-Length`.
    pub fn response(&self, builder: &ResponseBuilder<'_>) -> Vec<u8> {
        let headers = Headers::new()
            .with(UPGRADE, WEBSOCKET)
            .with(CONNECTION, UPGRADE)
            .with(SEC_WEBSOCKET_ACCEPT, self.accept.to_string());

        builder.build(
            StatusCode::SwitchingProtocols,
            None,
            &headers,
            HeaderMerge::Replace,
        )
    }
}
