//! # Wslite
//!
//! `wslite` is a small implementation of the HTTP/1.1 upgrade path and the Websocket protocol
//! for servers that handle a single request per connection.  It is `no_std` and needs only an
//! allocator, so it runs on embedded targets as well as on hosted async runtimes.
//!
//! This crate provides:
//!
//! * reading and parsing of HTTP request heads, and rendering of responses, on the "wire".
//! * the Websocket opening handshake.
//! * encoding and decoding of Websocket frames, and reassembly of fragmented messages.
//! * a route table mapping paths to content handlers or Websocket endpoints.
//!
//! This crate does **not** provide:
//!
//! * persistent (keep-alive) connections, request bodies or chunked encoding.
//! * TLS, compression or any Websocket extension or subprotocol.
//!
//! ## Basic Use
//!
//! Build a `router::Router` and create a `server::Server` from it, a `server::ServerConfig` and a
//! resource that implements `server::MessageHandler`.  When a client connects on a TCP socket
//! (or anything that implements `embedded_io_async::{Read, Write}`), call `serve()` on the
//! `Server` passing the "socket".  `serve()` answers a single request and, for Websocket routes,
//! carries the session until it ends.  Connections are independent, so one `Server` can be
//! shared by any number of concurrent `serve()` calls.
//!
//! ## Example
//!
//! ```
//! # use tokio;
//! use embedded_io_async::{Read, Write};
//!
//! use wslite::response::StatusCode;
//! use wslite::router::{Route, Router};
//! use wslite::server::{LogMessages, Server, ServerConfig};
//!
//! # struct Client {
//! #     reader: &'static [u8],
//! #     writer: Vec<u8>,
//! # }
//! #
//! # impl embedded_io_async::ErrorType for Client {
//! #     type Error = embedded_io_async::ErrorKind;
//! # }
//! #
//! # impl embedded_io_async::Read for Client {
//! #     async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
//! #         match self.reader.read(buf).await {
//! #             Ok(n) => Ok(n),
//! #             Err(_) => Err(embedded_io_async::ErrorKind::Other),
//! #         }
//! #     }
//! # }
//! #
//! # impl embedded_io_async::Write for Client {
//! #     async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
//! #         self.writer.extend_from_slice(buf);
//! #         Ok(buf.len())
//! #     }
//! # }
//! #
//! async fn run_server() {
//!     let router = Router::new()
//!         .route(Route::upgrade("/socket"))
//!         .route(Route::content("/*", |req, resp| {
//!             Ok(resp.with_body(StatusCode::OK, req.path.as_bytes()))
//!         }));
//!
//!     let server = Server::new(ServerConfig::default(), router, LogMessages);
//!
//!     // Client implements embedded_io_async::{Read, Write} (not shown)
//!     // this would typically be an implementation of a TCP Socket that implements the traits.
//!     // e.g. embassy_net::tcp::TcpSocket
//!     let mut client = Client {
//!         reader: b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n",
//!         writer: Vec::new(),
//!     };
//!
//!     if server.serve(&mut client, "127.0.0.1:50000").await.is_err() {
//!         // handle error
//!     }
//! #   assert!(client.writer.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! #   assert!(client.writer.ends_with(b"/hello"));
//! }
//! #
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! #     run_server().await;
//! # })
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod fmt;

mod ascii;
#[cfg(test)]
mod mock;

pub mod frame;
pub mod handshake;
/// HTTP Headers
pub mod header;
/// Websocket masking
pub mod mask;
/// Websocket messages and their reassembly from frames
pub mod message;
/// HTTP Requests
pub mod request;
/// HTTP responses
pub mod response;
pub mod router;
/// HTTP server
pub mod server;
/// Exact-length reads over a client connection
pub mod stream;
pub mod websocket;
