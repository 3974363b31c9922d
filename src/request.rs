use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use embedded_io_async::Read;

use crate::ascii::{COLON, CR, LF, SP, find_head_end};
use crate::header::{HOST, Headers, USER_AGENT};
use crate::stream::{ByteStream, StreamError};

const GET: &str = "GET";
const POST: &str = "POST";
const PUT: &str = "PUT";
const PATCH: &str = "PATCH";
const DELETE: &str = "DELETE";
const OPTIONS: &str = "OPTIONS";
const HEAD: &str = "HEAD";

/// RequestError is returned while reading or parsing a request head.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// The peer closed the connection before a complete request head arrived.
    ConnectionClosed,
    /// The transport failed while reading the request.
    NetworkError,
    /// The request head could not be parsed.  Answered with 400 Bad Request.
    Malformed(&'static str),
    /// The request head exceeded the configured maximum size.
    TooLarge,
}

impl From<StreamError> for RequestError {
    fn from(value: StreamError) -> Self {
        match value {
            StreamError::ConnectionClosed => Self::ConnectionClosed,
            StreamError::NetworkError => Self::NetworkError,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => f.write_str("connection closed before request completed"),
            Self::NetworkError => f.write_str("network error reading request"),
            Self::Malformed(s) => write!(f, "malformed request: {}", s),
            Self::TooLarge => f.write_str("request head too large"),
        }
    }
}

impl core::error::Error for RequestError {}

/// Method such as GET. POST, DELETE etc.
#[non_exhaustive]
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Method {
    #[allow(missing_docs)]
    GET,
    #[allow(missing_docs)]
    POST,
    #[allow(missing_docs)]
    PUT,
    #[allow(missing_docs)]
    PATCH,
    #[allow(missing_docs)]
    DELETE,
    #[allow(missing_docs)]
    OPTIONS,
    #[allow(missing_docs)]
    HEAD,
    /// Any other method token, kept verbatim
    Other(String),
}

impl Method {
    /// The method token as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::GET => GET,
            Self::POST => POST,
            Self::PUT => PUT,
            Self::PATCH => PATCH,
            Self::DELETE => DELETE,
            Self::OPTIONS => OPTIONS,
            Self::HEAD => HEAD,
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value {
            GET => Self::GET,
            POST => Self::POST,
            PUT => Self::PUT,
            PATCH => Self::PATCH,
            DELETE => Self::DELETE,
            OPTIONS => Self::OPTIONS,
            HEAD => Self::HEAD,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request contains the details parsed from the request head read from the client.  It is
/// created once per connection and not modified afterwards.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Method (GET, POST etc) parsed from the request line
    pub method: Method,
    /// Request target e.g. `/index.html?foo=bar`
    pub path: String,
    /// Protocol version token e.g. `HTTP/1.1`
    pub version: String,
    /// Header fields, names lower cased.  Later duplicates replace earlier ones.
    pub headers: Headers,
}

impl Request {
    /// Parse a complete request head.  Lines may end in `\r\n` or a bare `\n`.
    pub fn parse(data: &[u8]) -> Result<Self, RequestError> {
        let data = core::str::from_utf8(data)
            .map_err(|_| RequestError::Malformed("http request is not valid utf8"))?;

        let mut lines = data
            .split(LF as char)
            .map(|l| l.strip_suffix(CR as char).unwrap_or(l));

        let request_line = lines
            .next()
            .ok_or(RequestError::Malformed("missing request line"))?;
        let mut req = Self::parse_request_line(request_line)?;

        for line in lines {
            if line.is_empty() {
                break;
            }
            req.parse_header_line(line);
        }

        Ok(req)
    }

    fn parse_request_line(line: &str) -> Result<Self, RequestError> {
        let mut words = line.split(SP as char);

        match (words.next(), words.next(), words.next(), words.next()) {
            (Some(method), Some(path), Some(version), None)
                if !method.is_empty() && !path.is_empty() && !version.is_empty() =>
            {
                Ok(Request {
                    method: Method::from(method),
                    path: path.to_string(),
                    version: version.to_string(),
                    headers: Headers::new(),
                })
            }
            _ => Err(RequestError::Malformed(
                "request line is not `method path version`",
            )),
        }
    }

    fn parse_header_line(&mut self, line: &str) {
        if let Some((name, value)) = line.split_once(COLON as char) {
            let name = name.trim();
            if !name.is_empty() {
                self.headers
                    .insert(name.to_ascii_lowercase(), value.trim().to_string());
            }
        }
    }

    /// Value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Host extracted from the Host header if present.
    pub fn host(&self) -> Option<&str> {
        self.header(HOST)
    }

    /// User agent extracted from the User-Agent header if present.
    pub fn user_agent(&self) -> Option<&str> {
        self.header(USER_AGENT)
    }
}

/// Read from `stream` until the blank line ending the request head, then parse it.
///
/// Reads are `read_chunk` bytes at a time and the accumulated buffer is checked for the
/// terminator after each one, so a head split across any number of segments is handled.  Bytes
/// following the head are pushed back into `stream`.  A head longer than `max_size` fails with
/// `RequestError::TooLarge`.
pub async fn read_request<C: Read>(
    stream: &mut ByteStream<C>,
    max_size: usize,
    read_chunk: usize,
) -> Result<Request, RequestError> {
    let mut head: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; read_chunk.max(1)];

    loop {
        let n = stream.read_some(&mut chunk).await?;
        let scanned = head.len();
        head.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&head, scanned) {
            if end > max_size {
                return Err(RequestError::TooLarge);
            }
            stream.unread(&head[end..]);
            head.truncate(end);
            return Request::parse(&head);
        }

        if head.len() >= max_size {
            return Err(RequestError::TooLarge);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::MockClient;

    #[test]
    fn test_http_request_parsing() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: example\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "/");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.host(), Some("example"));

        let req = Request::parse(
            b"GET /index.html HTTP/1.1\r\ncontent-type: application/json\r\nUser-Agent:  curl/8 \r\naccept: application/json\r\nAccept-Encoding: gzip\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.user_agent(), Some("curl/8"));
        assert_eq!(req.header("accept-encoding"), Some("gzip"));
        assert_eq!(req.headers.len(), 4);
    }

    #[test]
    fn test_header_names_are_normalised() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n\r\n").unwrap();
        assert_eq!(
            req.headers.iter().collect::<Vec<_>>(),
            [("sec-websocket-key", "abc")]
        );
    }

    #[test]
    fn test_header_value_keeps_later_colons() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: localhost:8000\r\n\r\n").unwrap();
        assert_eq!(req.host(), Some("localhost:8000"));
    }

    #[test]
    fn test_duplicate_header_last_wins() {
        let req =
            Request::parse(b"GET / HTTP/1.1\r\nX-A: one\r\nx-a: two\r\n\r\n").unwrap();
        assert_eq!(req.header("X-A"), Some("two"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_lines_without_colon_ignored() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nnonsense\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.host(), Some("h"));
    }

    #[test]
    fn test_unknown_method_kept() {
        let req = Request::parse(b"BREW /pot HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Other(String::from("BREW")));
        assert_eq!(req.method.as_str(), "BREW");
    }

    #[test]
    fn test_malformed_request_line() {
        for head in [
            &b"GET /\r\n\r\n"[..],
            &b"GET / HTTP/1.1 extra\r\n\r\n"[..],
            &b"GET  / HTTP/1.1\r\n\r\n"[..],
            &b"\r\n\r\n"[..],
            &b"GET\r\n\r\n"[..],
        ] {
            assert!(
                matches!(Request::parse(head), Err(RequestError::Malformed(_))),
                "{:?}",
                core::str::from_utf8(head)
            );
        }

        assert!(matches!(
            Request::parse(b"GET /\xff HTTP/1.1\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_read_request_multiple_segments() {
        let raw = b"GET /x HTTP/1.1\r\nHost: h\r\nUpgrade: websocket\r\n\r\n";
        for chunk in [1, 2, 3, 7, 64] {
            let mut stream = ByteStream::new(MockClient::new(raw.to_vec()).chunked(chunk));
            let req = read_request(&mut stream, 8192, 16).await.unwrap();
            assert_eq!(req.path, "/x");
            assert_eq!(req.header("upgrade"), Some("websocket"));
            assert_eq!(stream.buffered(), 0);
        }
    }

    #[tokio::test]
    async fn test_read_request_keeps_trailing_bytes() {
        let mut raw = b"GET /socket HTTP/1.1\r\nHost: h\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0x81, 0x80, 1, 2, 3, 4]);

        let mut stream = ByteStream::new(MockClient::new(raw));
        let req = read_request(&mut stream, 8192, 1024).await.unwrap();
        assert_eq!(req.path, "/socket");
        assert_eq!(stream.buffered(), 6);
        assert_eq!(
            stream.read_exactly(6).await.unwrap(),
            [0x81, 0x80, 1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn test_read_request_waits_for_terminator() {
        // a head that never terminates must not parse early
        let mut stream =
            ByteStream::new(MockClient::new(b"GET / HTTP/1.1\r\nHost: h\r\n".to_vec()).chunked(4));
        assert_eq!(
            read_request(&mut stream, 8192, 1024).await,
            Err(RequestError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_read_request_empty_stream() {
        let mut stream = ByteStream::new(MockClient::new(Vec::new()));
        assert_eq!(
            read_request(&mut stream, 8192, 1024).await,
            Err(RequestError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_read_request_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..100 {
            raw.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");

        let mut stream = ByteStream::new(MockClient::new(raw));
        assert_eq!(
            read_request(&mut stream, 256, 64).await,
            Err(RequestError::TooLarge)
        );
    }
}
