//! In-memory client used by the unit tests.  Input is handed out at most `chunk` bytes per read
//! so partial reads are exercised; everything written is recorded in `output`.

use alloc::vec::Vec;

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

pub(crate) struct MockClient {
    input: Vec<u8>,
    pos: usize,
    chunk: usize,
    fail_at_end: bool,
    pub(crate) reads: usize,
    pub(crate) output: Vec<u8>,
}

impl MockClient {
    pub(crate) fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            pos: 0,
            chunk: usize::MAX,
            fail_at_end: false,
            reads: 0,
            output: Vec::new(),
        }
    }

    /// Deliver at most `chunk` bytes per read.
    pub(crate) fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Return `ConnectionReset` instead of EOF once the input is exhausted.
    pub(crate) fn reset_at_end(mut self) -> Self {
        self.fail_at_end = true;
        self
    }

    pub(crate) fn remaining(&self) -> &[u8] {
        &self.input[self.pos..]
    }
}

impl ErrorType for MockClient {
    type Error = ErrorKind;
}

impl Read for MockClient {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.reads += 1;
        let left = self.input.len() - self.pos;
        if left == 0 {
            if self.fail_at_end {
                return Err(ErrorKind::ConnectionReset);
            }
            return Ok(0);
        }

        let n = left.min(buf.len()).min(self.chunk);
        buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MockClient {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Frame `payload` the way a browser would: masked with `key`.
pub(crate) fn client_frame(fin: bool, opcode: u8, key: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(if fin { 0x80 } else { 0 } | opcode);
    match payload.len() {
        n if n < 126 => out.push(0x80 | n as u8),
        n if n <= u16::MAX as usize => {
            out.push(0x80 | 126);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            out.push(0x80 | 127);
            out.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(&key);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    out
}
