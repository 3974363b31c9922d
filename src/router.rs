//! Mapping of request paths to handlers.
//!
//! A route either produces the full response for a request (`RouteHandler::Content`) or marks
//! the path as a Websocket endpoint (`RouteHandler::Upgrade`), in which case the server performs
//! the opening handshake and hands the connection to its `MessageHandler`.
//!
//! Patterns are either an exact path or a prefix ending in `*`.  Routes are tried in the order
//! they were added and the first match wins, so catch-all routes belong last.
//!
//! ```
//! use wslite::response::StatusCode;
//! use wslite::router::{Route, Router};
//!
//! let router = Router::new()
//!     .route(Route::upgrade("/socket"))
//!     .route(Route::content("/*", |req, resp| {
//!         Ok(resp.with_body(StatusCode::OK, req.path.as_bytes()))
//!     }));
//!
//! assert!(router.find("/socket").is_some());
//! assert!(router.find("/anything/else").is_some());
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::request::Request;
use crate::response::ResponseBuilder;
use crate::server::HandlerError;

/// Produces the rendered HTTP response for a request.
pub type ContentHandler =
    Box<dyn Fn(&Request, &ResponseBuilder<'_>) -> Result<Vec<u8>, HandlerError> + Send + Sync>;

/// What the server does with a request whose path matched.
pub enum RouteHandler {
    /// Answer with the bytes the handler renders, then close
    Content(ContentHandler),
    /// Perform the Websocket opening handshake and switch protocol
    Upgrade,
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(_) => f.write_str("Content"),
            Self::Upgrade => f.write_str("Upgrade"),
        }
    }
}

/// Path pattern of a route.
#[derive(Clone, Debug, PartialEq)]
pub enum PathPattern {
    /// The path must equal the pattern
    Exact(String),
    /// The path must start with the pattern, which had its trailing `*` removed
    Prefix(String),
}

impl PathPattern {
    /// Parse `pattern`: a trailing `*` makes it a prefix match.
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(String::from(prefix)),
            None => Self::Exact(String::from(pattern)),
        }
    }

    /// True if `path` matches.  Any query string is ignored.
    pub fn matches(&self, path: &str) -> bool {
        let path = match path.split_once('?') {
            Some((p, _)) => p,
            None => path,
        };

        match self {
            Self::Exact(p) => path == p,
            Self::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

/// A pattern and the handler for the paths it matches.
#[derive(Debug)]
pub struct Route {
    /// Paths this route applies to
    pub pattern: PathPattern,
    /// What to do with a matching request
    pub handler: RouteHandler,
}

impl Route {
    /// A route answered by `handler`.
    pub fn content<F>(pattern: &str, handler: F) -> Self
    where
        F: Fn(&Request, &ResponseBuilder<'_>) -> Result<Vec<u8>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            pattern: PathPattern::parse(pattern),
            handler: RouteHandler::Content(Box::new(handler)),
        }
    }

    /// A Websocket endpoint.
    pub fn upgrade(pattern: &str) -> Self {
        Self {
            pattern: PathPattern::parse(pattern),
            handler: RouteHandler::Upgrade,
        }
    }
}

/// Ordered route table.  Read-only once the server is built.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// An empty table; every path is not found.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Append `route`, matched after all routes added before it.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// The handler of the first route matching `path`.
    pub fn find(&self, path: &str) -> Option<&RouteHandler> {
        self.routes
            .iter()
            .find(|r| r.pattern.matches(path))
            .map(|r| &r.handler)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if there are no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<Route> for Router {
    fn from_iter<T: IntoIterator<Item = Route>>(iter: T) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::response::StatusCode;

    fn body(text: &'static str) -> Route {
        Route::content("/*", move |_, resp| Ok(resp.with_body(StatusCode::OK, text)))
    }

    #[test]
    fn test_pattern_matching() {
        let exact = PathPattern::parse("/socket");
        assert_eq!(exact, PathPattern::Exact(String::from("/socket")));
        assert!(exact.matches("/socket"));
        assert!(exact.matches("/socket?token=1"));
        assert!(!exact.matches("/socket/"));
        assert!(!exact.matches("/sock"));

        let prefix = PathPattern::parse("/static/*");
        assert_eq!(prefix, PathPattern::Prefix(String::from("/static/")));
        assert!(prefix.matches("/static/"));
        assert!(prefix.matches("/static/app.js"));
        assert!(!prefix.matches("/static"));

        assert!(PathPattern::parse("*").matches(""));
    }

    #[test]
    fn test_first_match_wins() {
        let router = Router::new()
            .route(Route::upgrade("/socket"))
            .route(Route::content("/static/*", |_, resp| {
                Ok(resp.no_body(StatusCode::OK))
            }))
            .route(body("fallback"));

        assert_eq!(router.len(), 3);
        assert!(matches!(router.find("/socket"), Some(RouteHandler::Upgrade)));
        assert!(matches!(
            router.find("/socket/x"),
            Some(RouteHandler::Content(_))
        ));

        let resp = ResponseBuilder::new("test");
        let req = Request::parse(b"GET /static/a HTTP/1.1\r\n\r\n").unwrap();
        let Some(RouteHandler::Content(handler)) = router.find(&req.path) else {
            std::panic!("expected a content route");
        };
        let out = handler(&req, &resp).unwrap();
        assert!(!out.ends_with(b"fallback"));
    }

    #[test]
    fn test_not_found() {
        let router: Router = [Route::upgrade("/socket")].into_iter().collect();
        assert!(router.find("/").is_none());
        assert!(Router::new().is_empty());
        assert!(Router::new().find("/").is_none());
    }
}
