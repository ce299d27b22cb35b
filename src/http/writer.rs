use std::io::{self, Write};

use crate::http::date::{self, RFC822_LEN};
use crate::http::request::{Request, RequestStatus};

/// Fixed-capacity output buffer.
///
/// Bytes in `[start, end)` are waiting to be sent; bytes before `start`
/// are already on the wire. Once everything is sent both cursors go back
/// to zero, so the same buffer serves a whole keep-alive session.
pub struct OutputBuffer {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Bytes still to be sent.
    pub fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Free space after `end`.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.end
    }

    pub fn pending_bytes(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Appends `bytes` whole, or not at all.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.data[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
        true
    }

    /// Marks `n` pending bytes as sent.
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Free space for callers that fill the buffer directly.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Accounts for `n` bytes written into [`spare_mut`](Self::spare_mut).
    pub fn commit(&mut self, n: usize) {
        self.end = (self.end + n).min(self.data.len());
    }

    /// Formats an RFC 822 date straight into the tail.
    ///
    /// Returns the number of bytes written: 29, or 0 when there is no room.
    pub fn write_rfc822_time(&mut self, t: i64) -> usize {
        let end = self.end;
        let Some(tail) = self.data.get_mut(end..end + RFC822_LEN) else {
            return 0;
        };
        let Ok(slot) = <&mut [u8; RFC822_LEN]>::try_from(tail) else {
            return 0;
        };
        date::rfc822_time_buf(slot, t);
        self.end += RFC822_LEN;
        RFC822_LEN
    }
}

/// Why [`Request::write`] refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// The request is already marked for closing.
    Closed,
    /// The message does not fit. The request is now marked for closing.
    Overflow,
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// The socket took some or all of the data; `pending` bytes remain.
    Written { pending: usize },
    /// The socket is full. Wait for writability before trying again.
    Blocked,
    /// The connection is broken. The buffer has been discarded.
    Fatal,
}

impl<S> Request<S> {
    /// Buffers `msg` for sending.
    ///
    /// Returns the new end cursor. A message that does not fit is not
    /// copied at all: half a header cannot be taken back, so the connection
    /// is marked for closing instead.
    pub fn write(&mut self, msg: impl AsRef<[u8]>) -> Result<usize, WriteError> {
        let msg = msg.as_ref();
        if self.status == RequestStatus::Close {
            return Err(WriteError::Closed);
        }
        if msg.is_empty() {
            return Ok(self.output.end());
        }
        if !self.output.push(msg) {
            tracing::error!(
                remote = ?self.remote,
                needed = msg.len(),
                remaining = self.output.remaining(),
                capacity = self.output.capacity(),
                "Ran out of buffer space"
            );
            self.status = RequestStatus::Close;
            return Err(WriteError::Overflow);
        }
        Ok(self.output.end())
    }
}

impl<S: Write> Request<S> {
    /// Sends as much of the pending output as the socket takes in one call.
    pub fn flush(&mut self) -> Flush {
        if self.output.pending() > 0 {
            let Some(socket) = self.socket.as_mut() else {
                self.output.reset();
                self.status = RequestStatus::Close;
                return Flush::Fatal;
            };

            match socket.write(self.output.pending_bytes()) {
                Ok(0) => {
                    tracing::debug!(remote = ?self.remote, "Client stopped accepting data");
                    self.output.reset();
                    self.status = RequestStatus::Close;
                    return Flush::Fatal;
                }
                Ok(n) => {
                    self.output.consume(n);
                    self.bytes_sent += n as u64;
                    self.touch();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Flush::Blocked,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Flush::Written {
                        pending: self.output.pending(),
                    };
                }
                Err(e) => {
                    self.output.reset();
                    self.status = RequestStatus::Close;
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        tracing::warn!(remote = ?self.remote, error = %e, "Buffer flush failed");
                    }
                    return Flush::Fatal;
                }
            }
        }

        Flush::Written {
            pending: self.output.pending(),
        }
    }

    /// Formats an RFC 822 date into the output buffer and flushes.
    ///
    /// Returns the number of date bytes written, 0 if they did not fit.
    pub fn write_rfc822_time(&mut self, t: i64) -> usize {
        if self.status == RequestStatus::Close {
            return 0;
        }
        let n = self.output.write_rfc822_time(t);
        if n > 0 {
            self.flush();
        }
        n
    }
}
