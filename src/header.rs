use alloc::string::String;
use alloc::vec::Vec;

use crate::ascii::{CR, LF};

/// Host
pub const HOST: &str = "Host";
/// User-Agent
pub const USER_AGENT: &str = "User-Agent";
/// Connection
pub const CONNECTION: &str = "Connection";
/// Upgrade
pub const UPGRADE: &str = "Upgrade";
/// Server
pub const SERVER: &str = "Server";
/// Content-Length
pub const CONTENT_LENGTH: &str = "Content-Length";
/// Content-Type
pub const CONTENT_TYPE: &str = "Content-Type";
/// Sec-WebSocket-Key
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
/// Sec-WebSocket-Accept
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
/// Sec-WebSocket-Version
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";

/// How a set of caller supplied headers is combined with a base set.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderMerge {
    /// Caller headers are laid over the base set.  On a name collision the caller's value wins
    /// and keeps the base header's position; new names are appended.
    Overlay,
    /// Caller headers replace the base set entirely.
    Replace,
}

/// An ordered collection of header fields.
///
/// Names compare case-insensitively.  Each name appears at most once: inserting a name that is
/// already present replaces the earlier value in place, so the last duplicate wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// An empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the header `name`.  CR and LF are stripped from both name and value so
    /// a header can never end early and start another.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let mut name = name.into();
        let mut value = value.into();
        name.retain(|c| c != CR as char && c != LF as char);
        value.retain(|c| c != CR as char && c != LF as char);

        match self.position(&name) {
            Some(i) => self.entries[i] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of the header `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// True if a header `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove the header `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Iterate headers in order as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine `other` into `self` according to `mode`.
    pub fn merge(&mut self, other: &Headers, mode: HeaderMerge) {
        if mode == HeaderMerge::Replace {
            self.entries.clear();
        }

        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Append one `Name: Value\r\n` line per header to `out`.
    pub(crate) fn render(&self, out: &mut Vec<u8>) {
        for (name, value) in self.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(&[CR, LF]);
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}
