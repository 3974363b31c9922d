use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use embedded_io_async::{Read, ReadExactError, Write};

/// StreamError is returned by `ByteStream` operations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError {
    /// The peer closed the connection (zero byte read) before the requested data arrived.
    ConnectionClosed,
    /// The underlying transport reported an error during a read or write.
    NetworkError,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => f.write_str("connection closed by peer"),
            Self::NetworkError => f.write_str("network error"),
        }
    }
}

impl core::error::Error for StreamError {}

/// ByteStream wraps a client connection and guarantees exact-length reads.
///
/// Bytes read ahead of need (e.g. frame data arriving in the same segment as the request head)
/// can be handed back with `unread` and are served before anything else is read from the client.
/// Dropping the `ByteStream` drops the client, which closes it.
pub struct ByteStream<C> {
    inner: C,
    pending: Vec<u8>,
}

impl<C> ByteStream<C> {
    /// Wrap the provided client connection.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    /// Push `bytes` back so they are returned by the next read, ahead of any bytes already
    /// pending.
    pub(crate) fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.pending.splice(0..0, bytes.iter().copied());
    }

    /// Number of bytes pushed back and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Give back the client connection.  Any pushed back bytes are lost.
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}

impl<C: Read> ByteStream<C> {
    /// Read exactly `n` bytes, blocking until they have all arrived.  Never returns a short
    /// result: a peer EOF before `n` bytes is `StreamError::ConnectionClosed`.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        let mut buf = vec![0u8; n];
        self.read_exactly_into(&mut buf).await?;
        Ok(buf)
    }

    /// Fill `buf` completely.  Same semantics as `read_exactly` without the allocation.
    pub async fn read_exactly_into(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        let offset = self.take_pending(buf);

        self.inner
            .read_exact(&mut buf[offset..])
            .await
            .map_err(|e| match e {
                ReadExactError::UnexpectedEof => StreamError::ConnectionClosed,
                ReadExactError::Other(_) => StreamError::NetworkError,
            })
    }

    /// Read whatever is available, at least one byte.  A zero byte read is reported as
    /// `StreamError::ConnectionClosed`.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = self.take_pending(buf);
        if n > 0 {
            return Ok(n);
        }

        match self.inner.read(buf).await {
            Ok(0) => Err(StreamError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(_) => Err(StreamError::NetworkError),
        }
    }
}

impl<C: Write> ByteStream<C> {
    /// Write all of `data` to the client.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.inner
            .write_all(data)
            .await
            .or(Err(StreamError::NetworkError))
    }

    /// Flush any data buffered by the client connection.
    pub async fn flush(&mut self) -> Result<(), StreamError> {
        self.inner.flush().await.or(Err(StreamError::NetworkError))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::MockClient;

    #[tokio::test]
    async fn test_read_exactly_absorbs_partial_reads() {
        let client = MockClient::new(b"0123456789".to_vec()).chunked(3);
        let mut stream = ByteStream::new(client);

        assert_eq!(stream.read_exactly(7).await.unwrap(), b"0123456");
        assert_eq!(stream.read_exactly(3).await.unwrap(), b"789");
        assert!(stream.into_inner().reads >= 4);
    }

    #[tokio::test]
    async fn test_read_exactly_zero() {
        let mut stream = ByteStream::new(MockClient::new(b"abc".to_vec()));
        assert_eq!(stream.read_exactly(0).await.unwrap(), b"");
        assert_eq!(stream.read_exactly(3).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_read_exactly_eof_is_connection_closed() {
        let mut stream = ByteStream::new(MockClient::new(b"abc".to_vec()).chunked(1));
        assert_eq!(
            stream.read_exactly(4).await,
            Err(StreamError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_read_exactly_transport_error() {
        let mut stream = ByteStream::new(MockClient::new(b"ab".to_vec()).reset_at_end());
        assert_eq!(stream.read_exactly(4).await, Err(StreamError::NetworkError));
    }

    #[tokio::test]
    async fn test_unread_is_served_first() {
        let mut stream = ByteStream::new(MockClient::new(b"world".to_vec()));
        stream.unread(b"lo ");
        stream.unread(b"hel");
        assert_eq!(stream.buffered(), 6);

        let mut buf = [0u8; 2];
        assert_eq!(stream.read_some(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"he");

        assert_eq!(stream.read_exactly(9).await.unwrap(), b"llo world");
        assert_eq!(stream.buffered(), 0);
    }

    #[tokio::test]
    async fn test_read_some_eof() {
        let mut stream = ByteStream::new(MockClient::new(Vec::new()));
        let mut buf = [0u8; 8];
        assert_eq!(
            stream.read_some(&mut buf).await,
            Err(StreamError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_write_all() {
        let mut stream = ByteStream::new(MockClient::new(Vec::new()));
        stream.write_all(b"HTTP/1.1").await.unwrap();
        stream.write_all(b" 200 OK").await.unwrap();
        stream.flush().await.unwrap();
        assert_eq!(stream.into_inner().output, b"HTTP/1.1 200 OK");
    }
}
