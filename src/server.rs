use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use embedded_io_async::{Read, Write};

use crate::handshake::{Handshake, HandshakeError, WEBSOCKET_VERSION};
use crate::header::{HeaderMerge, Headers, SEC_WEBSOCKET_VERSION};
use crate::message::Message;
use crate::request::{Request, RequestError, read_request};
use crate::response::{HTTP_PROTO, ResponseBuilder, StatusCode};
use crate::router::{RouteHandler, Router};
use crate::stream::{ByteStream, StreamError};
use crate::websocket::{CloseReason, Websocket, WebsocketError};

/// HandlerError is returned by content handlers and `MessageHandler` implementations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerError {
    /// Custom errors as specified by the handler implementation author
    CustomError(&'static str),
}

impl From<&'static str> for HandlerError {
    fn from(value: &'static str) -> Self {
        Self::CustomError(value)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomError(s) => write!(f, "handler error: {}", s),
        }
    }
}

impl core::error::Error for HandlerError {}

/// ServerError is returned by `Server::serve` when a connection ends abnormally.  Requests that
/// were answered with an HTTP error status are not errors.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerError {
    /// The transport failed during a read or write
    NetworkError,
    /// The upgraded connection failed
    Websocket(WebsocketError),
    /// The `MessageHandler` failed; the session was closed with status 1011
    HandlerError(HandlerError),
}

impl From<StreamError> for ServerError {
    fn from(_: StreamError) -> Self {
        Self::NetworkError
    }
}

impl From<WebsocketError> for ServerError {
    fn from(value: WebsocketError) -> Self {
        Self::Websocket(value)
    }
}

impl From<HandlerError> for ServerError {
    fn from(value: HandlerError) -> Self {
        Self::HandlerError(value)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError => f.write_str("network error"),
            Self::Websocket(e) => write!(f, "websocket error: {}", e),
            Self::HandlerError(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for ServerError {}

/// Settings shared by every connection a `Server` handles.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Value of the `Server` header
    pub server_name: String,
    /// Largest request head accepted; larger heads are answered with 431
    pub max_request_size: usize,
    /// Largest frame payload or reassembled message accepted
    pub max_message_size: usize,
    /// Bytes requested per read while accumulating the request head
    pub read_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: String::from("wslite"),
            max_request_size: 8 * 1024,
            max_message_size: 16 * 1024 * 1024,
            read_chunk: 1024,
        }
    }
}

impl ServerConfig {
    /// Set the `Server` header value.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Set the largest request head accepted.
    pub fn with_max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size;
        self
    }

    /// Set the largest message accepted on an upgraded connection.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the read size used while accumulating the request head.
    pub fn with_read_chunk(mut self, size: usize) -> Self {
        self.read_chunk = size;
        self
    }
}

/// Where a connection is in its lifetime.  States only move forward; `Closed` may be entered
/// from anywhere and is final.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// Reading the request head
    #[default]
    AwaitingHttpRequest,
    /// A request has been read and is being answered
    HttpRequestComplete,
    /// The handshake completed and frames are being exchanged
    WebSocketActive,
    /// Nothing more will be read or written
    Closed,
}

impl ConnectionState {
    /// Move to `next` if that is a legal transition.  Returns false, leaving the state untouched,
    /// otherwise.
    pub fn advance(&mut self, next: Self) -> bool {
        let legal = matches!(
            (*self, next),
            (Self::AwaitingHttpRequest, Self::HttpRequestComplete)
                | (Self::HttpRequestComplete, Self::WebSocketActive)
                | (
                    Self::AwaitingHttpRequest | Self::HttpRequestComplete | Self::WebSocketActive,
                    Self::Closed
                )
        );

        if legal {
            trace!("connection state {:?} -> {:?}", *self, next);
            *self = next;
        }
        legal
    }
}

/// Result of handling a request: either a complete response after which the connection closes,
/// or a validated handshake after which the connection carries Websocket frames.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Send the bytes, then close
    RespondAndClose(Vec<u8>),
    /// Send the 101 response and hand the connection to the frame loop
    SwitchProtocol(Handshake),
}

/// Trait required to be implemented by the resource that consumes Websocket messages.
pub trait MessageHandler {
    /// Called by the server with each complete message received on an upgraded connection.  A
    /// returned message is sent back to the client.  An error closes the session with status
    /// 1011.
    ///
    /// ```
    /// use wslite::message::Message;
    /// use wslite::server::{HandlerError, MessageHandler};
    ///
    /// struct Echo;
    ///
    /// impl MessageHandler for Echo {
    ///     async fn handle_message(&self, message: Message) -> Result<Option<Message>, HandlerError> {
    ///         Ok(Some(message))
    ///     }
    /// }
    /// ```
    fn handle_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Option<Message>, HandlerError>>;
}

/// A `MessageHandler` that logs each message and never replies.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMessages;

impl MessageHandler for LogMessages {
    async fn handle_message(&self, message: Message) -> Result<Option<Message>, HandlerError> {
        match &message {
            Message::Text(text) => info!("websocket text message: {}", text.as_str()),
            Message::Binary(data) => info!("websocket binary message of {} bytes", data.len()),
        }
        Ok(None)
    }
}

/// Server is the main struct to be used by users of the crate.  It is constructed with a
/// configuration, a route table and a `MessageHandler`, and provides a `serve()` method to be
/// called on each new client connection.  A `Server` holds no per-connection state, so a single
/// instance can serve any number of connections concurrently.
pub struct Server<H> {
    config: ServerConfig,
    router: Router,
    handler: H,
}

impl<H> Server<H>
where
    H: MessageHandler,
{
    /// Construct a Server.
    pub fn new(config: ServerConfig, router: Router, handler: H) -> Self {
        Self {
            config,
            router,
            handler,
        }
    }

    /// The configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn responses(&self) -> ResponseBuilder<'_> {
        ResponseBuilder::new(&self.config.server_name)
    }

    fn error_response(&self, status: StatusCode) -> Vec<u8> {
        info!("responding {}", status.code());
        self.responses()
            .with_body(status, status.reason().unwrap_or_default())
    }

    /// Decide what to do with a parsed request: check the protocol version, find the route and
    /// either run its content handler or validate the upgrade.
    pub fn handle_request(&self, request: &Request) -> Outcome {
        info!(
            "request received: {} {} {}",
            request.method.as_str(),
            request.path.as_str(),
            request.version.as_str()
        );

        if request.version != HTTP_PROTO {
            return Outcome::RespondAndClose(
                self.error_response(StatusCode::HttpVersionNotSupported),
            );
        }

        match self.router.find(&request.path) {
            None => {
                info!("route not found: {}", request.path.as_str());
                Outcome::RespondAndClose(self.error_response(StatusCode::NotFound))
            }
            Some(RouteHandler::Content(handler)) => match handler(request, &self.responses()) {
                Ok(bytes) => Outcome::RespondAndClose(bytes),
                Err(e) => {
                    warn!("content handler failed: {}", e);
                    Outcome::RespondAndClose(self.error_response(StatusCode::InternalServerError))
                }
            },
            Some(RouteHandler::Upgrade) => match Handshake::from_request(request) {
                Ok(handshake) => Outcome::SwitchProtocol(handshake),
                Err(HandshakeError::UnsupportedVersion) => {
                    warn!("websocket version not supported");
                    let status = StatusCode::UpgradeRequired;
                    Outcome::RespondAndClose(self.responses().build(
                        status,
                        status.reason().map(str::as_bytes),
                        &Headers::new().with(SEC_WEBSOCKET_VERSION, WEBSOCKET_VERSION),
                        HeaderMerge::Overlay,
                    ))
                }
                Err(e) => {
                    warn!("websocket handshake rejected: {}", e);
                    Outcome::RespondAndClose(self.error_response(StatusCode::BadRequest))
                }
            },
        }
    }

    /// Serve one client connection to completion: read a single request, answer it and, if it
    /// was a Websocket upgrade, exchange frames until either side closes.  The client is dropped,
    /// closing it, before this returns.
    ///
    /// The result is `Ok(())` when the client disconnects, when the request was answered (with
    /// any status) and when the Websocket session ended with a close frame.  Any `Err(_)` means
    /// the connection was abandoned mid-way.
    pub async fn serve<C>(&self, client: C, peer: &str) -> Result<(), ServerError>
    where
        C: Read + Write,
    {
        info!("client connected: {}", peer);

        let mut state = ConnectionState::default();
        let mut stream = ByteStream::new(client);
        let res = self.drive(&mut stream, &mut state).await;
        state.advance(ConnectionState::Closed);
        drop(stream);

        match &res {
            Ok(()) => info!("connection closed: {}", peer),
            Err(e) => warn!("connection closed: {}: {}", peer, e),
        }
        res
    }

    async fn drive<C: Read + Write>(
        &self,
        stream: &mut ByteStream<C>,
        state: &mut ConnectionState,
    ) -> Result<(), ServerError> {
        let read = read_request(
            stream,
            self.config.max_request_size,
            self.config.read_chunk,
        )
        .await;

        let outcome = match read {
            Ok(request) => {
                state.advance(ConnectionState::HttpRequestComplete);
                self.handle_request(&request)
            }
            Err(RequestError::ConnectionClosed) => {
                debug!("client closed before a complete request");
                return Ok(());
            }
            Err(RequestError::NetworkError) => {
                debug!("network error reading request");
                return Err(ServerError::NetworkError);
            }
            Err(RequestError::Malformed(e)) => {
                warn!("malformed request: {}", e);
                Outcome::RespondAndClose(self.error_response(StatusCode::BadRequest))
            }
            Err(RequestError::TooLarge) => {
                warn!("request head exceeds {} bytes", self.config.max_request_size);
                Outcome::RespondAndClose(
                    self.error_response(StatusCode::RequestHeaderFieldsTooLarge),
                )
            }
        };

        match outcome {
            Outcome::RespondAndClose(bytes) => send(stream, &bytes).await,
            Outcome::SwitchProtocol(handshake) => {
                info!("switching protocol to websocket");
                send(stream, &handshake.response(&self.responses())).await?;
                state.advance(ConnectionState::WebSocketActive);

                let mut websocket = Websocket::new(stream, self.config.max_message_size);
                self.run_websocket(&mut websocket).await
            }
        }
    }

    async fn run_websocket<C: Read + Write>(
        &self,
        websocket: &mut Websocket<'_, C>,
    ) -> Result<(), ServerError> {
        loop {
            let message = match websocket.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(WebsocketError::ConnectionClosed) => {
                    debug!("client dropped the connection without a close frame");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            debug!("websocket message of {} bytes", message.len());
            match self.handler.handle_message(message).await {
                Ok(Some(reply)) => websocket.send_message(&reply).await?,
                Ok(None) => {}
                Err(e) => {
                    let _ = websocket.close(CloseReason::INTERNAL, "").await;
                    return Err(e.into());
                }
            }
        }
    }
}

async fn send<C: Write>(stream: &mut ByteStream<C>, bytes: &[u8]) -> Result<(), ServerError> {
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}
