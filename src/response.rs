use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;

use crate::ascii::{CR, LF, SP};
use crate::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMerge, Headers, SERVER};

pub(crate) const HTTP_PROTO: &str = "HTTP/1.1";

const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// HTTP status code returned in a response
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    /// 101 Switching Protocols - eg from HTTP to Websocket
    SwitchingProtocols,
    /// 200 Ok
    OK,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 426 Upgrade Required
    UpgradeRequired,
    /// 431 Request Header Fields Too Large
    RequestHeaderFieldsTooLarge,
    /// 500 Server Error
    InternalServerError,
    /// 505 HTTP Version Not Supported
    HttpVersionNotSupported,
    /// Any other code
    Other(u16),
}

impl StatusCode {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            Self::SwitchingProtocols => 101,
            Self::OK => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::UpgradeRequired => 426,
            Self::RequestHeaderFieldsTooLarge => 431,
            Self::InternalServerError => 500,
            Self::HttpVersionNotSupported => 505,
            Self::Other(n) => n,
        }
    }

    /// Reason phrase for the status line, if the code is a known one.
    #[rustfmt::skip]
    pub fn reason(self) -> Option<&'static str> {
        let reason = match self.code() {
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            426 => "Upgrade Required",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            505 => "HTTP Version Not Supported",
            _ => return None,
        };
        Some(reason)
    }
}

impl From<u16> for StatusCode {
    fn from(value: u16) -> Self {
        match value {
            101 => Self::SwitchingProtocols,
            200 => Self::OK,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            426 => Self::UpgradeRequired,
            431 => Self::RequestHeaderFieldsTooLarge,
            500 => Self::InternalServerError,
            505 => Self::HttpVersionNotSupported,
            n => Self::Other(n),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} {}", self.code(), reason),
            None => write!(f, "{}", self.code()),
        }
    }
}

/// A complete HTTP response.  Built once, serialized once.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Status of the response
    pub status: StatusCode,
    /// Header fields in the order they are sent
    pub headers: Headers,
    /// Body, if any
    pub body: Option<Vec<u8>>,
}

impl Response {
    /// Render the response as wire bytes: status line, one line per header, a blank line and the
    /// body if present.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(128 + body_len);

        out.extend_from_slice(HTTP_PROTO.as_bytes());
        out.push(SP);
        out.extend_from_slice(self.status.to_string().as_bytes());
        out.extend_from_slice(&[CR, LF]);

        self.headers.render(&mut out);
        out.extend_from_slice(&[CR, LF]);

        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }

        out
    }
}

/// ResponseBuilder produces responses carrying the server's base headers: `Connection: close`,
/// the server identity and, when there is a body, `Content-Type` and `Content-Length`.
#[derive(Clone, Copy, Debug)]
pub struct ResponseBuilder<'a> {
    server_name: &'a str,
}

impl<'a> ResponseBuilder<'a> {
    /// A builder identifying itself as `server_name` in the `Server` header.
    pub fn new(server_name: &'a str) -> Self {
        Self { server_name }
    }

    /// Build a response.  `extra` is combined with the base headers according to `merge`;
    /// `HeaderMerge::Replace` discards the base set entirely, including `Content-Length`.
    pub fn response(
        &self,
        status: StatusCode,
        body: Option<&[u8]>,
        extra: &Headers,
        merge: HeaderMerge,
    ) -> Response {
        let mut headers = Headers::new()
            .with(CONNECTION, "close")
            .with(SERVER, self.server_name);

        if let Some(body) = body {
            headers.insert(CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
            headers.insert(CONTENT_LENGTH, body.len().to_string());
        }

        headers.merge(extra, merge);

        Response {
            status,
            headers,
            body: body.map(<[u8]>::to_vec),
        }
    }

    /// Build and render a response in one step.
    pub fn build(
        &self,
        status: StatusCode,
        body: Option<&[u8]>,
        extra: &Headers,
        merge: HeaderMerge,
    ) -> Vec<u8> {
        self.response(status, body, extra, merge).to_bytes()
    }

    /// Render a response with the base headers and `body`.
    pub fn with_body(&self, status: StatusCode, body: impl AsRef<[u8]>) -> Vec<u8> {
        self.build(
            status,
            Some(body.as_ref()),
            &Headers::new(),
            HeaderMerge::Overlay,
        )
    }

    /// Render a response with the base headers and no body.
    pub fn no_body(&self, status: StatusCode) -> Vec<u8> {
        self.build(status, None, &Headers::new(), HeaderMerge::Overlay)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::*;

    use super::*;

    // HTTP uses `\r\n` as EOL delimeters.  In the expected data, we manually add
    // the \r at the end of the line, before the inherrent \n.

    #[test]
    fn test_http_response_default_with_body() {
        let resp = ResponseBuilder::new("RustServer");

        let body = "<html>
    <head>
        <title>Testing</title>
    </head>
    <body>
        <p>works!</p>
    </body>
</html>
";
        let got = resp.with_body(StatusCode::OK, body);

        let expected = "HTTP/1.1 200 OK\r
Connection: close\r
Server: RustServer\r
Content-Type: text/html\r
Content-Length: 114\r
\r
<html>
    <head>
        <title>Testing</title>
    </head>
    <body>
        <p>works!</p>
    </body>
</html>
"
        .as_bytes();

        assert_eq!(
            got,
            expected,
            "oops, got:\n{}",
            str::from_utf8(&got).unwrap()
        );
    }

    #[test]
    fn test_http_response_no_body() {
        let got = ResponseBuilder::new("RustServer").no_body(StatusCode::NotFound);

        let expected = "HTTP/1.1 404 Not Found\r
Connection: close\r
Server: RustServer\r
\r
"
        .as_bytes();

        assert_eq!(got, expected, "oops, got:\n{}", str::from_utf8(&got).unwrap());
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let got = ResponseBuilder::new("RustServer").with_body(StatusCode::OK, "héllo");
        let got = str::from_utf8(&got).unwrap();
        assert!(got.contains("Content-Length: 6\r\n"), "{}", got);
        assert!(got.ends_with("\r\n\r\nhéllo"), "{}", got);
    }

    #[test]
    fn test_http_response_overlay_headers() {
        let extra = Headers::new()
            .with("content-type", "application/json")
            .with("Foo", "Bar");
        let got = ResponseBuilder::new("RustServer").build(
            StatusCode::OK,
            Some(b"{}"),
            &extra,
            HeaderMerge::Overlay,
        );

        let expected = "HTTP/1.1 200 OK\r
Connection: close\r
Server: RustServer\r
content-type: application/json\r
Content-Length: 2\r
Foo: Bar\r
\r
{}"
        .as_bytes();

        assert_eq!(got, expected, "oops, got:\n{}", str::from_utf8(&got).unwrap());
    }

    #[test]
    fn test_http_response_replace_headers() {
        let extra = Headers::new()
            .with("Upgrade", "websocket")
            .with("Connection", "Upgrade");
        let got = ResponseBuilder::new("RustServer").build(
            StatusCode::SwitchingProtocols,
            None,
            &extra,
            HeaderMerge::Replace,
        );

        let expected = "HTTP/1.1 101 Switching Protocols\r
Upgrade: websocket\r
Connection: Upgrade\r
\r
"
        .as_bytes();

        assert_eq!(got, expected, "oops, got:\n{}", str::from_utf8(&got).unwrap());
    }

    #[test]
    fn test_http_response_with_custom_status() {
        let got = ResponseBuilder::new("RustServer").no_body(StatusCode::Other(599));
        assert!(got.starts_with(b"HTTP/1.1 599\r\n"));

        let got = ResponseBuilder::new("RustServer").no_body(StatusCode::Other(401));
        assert!(got.starts_with(b"HTTP/1.1 401 Unauthorized\r\n"));
    }

    #[test]
    fn test_status_table() {
        for (code, line) in [
            (StatusCode::SwitchingProtocols, "101 Switching Protocols"),
            (StatusCode::OK, "200 OK"),
            (StatusCode::BadRequest, "400 Bad Request"),
            (StatusCode::NotFound, "404 Not Found"),
            (StatusCode::InternalServerError, "500 Internal Server Error"),
            (StatusCode::HttpVersionNotSupported, "505 HTTP Version Not Supported"),
        ] {
            assert_eq!(code.to_string(), line);
            assert_eq!(StatusCode::from(code.code()), code);
        }
    }
}
