#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;

use cinder::http::connection::{ConnectionHandler, Progress};
use cinder::http::request::Request;

/// In-memory socket with a scripted input and a limited write budget.
#[derive(Debug, Default)]
pub struct MockStream {
    pub fd: RawFd,
    pub input: Vec<u8>,
    pub read_pos: usize,
    /// Report end of stream once the input is used up instead of WouldBlock.
    pub eof: bool,
    pub written: Vec<u8>,
    /// Bytes the socket takes before reporting WouldBlock.
    pub write_budget: Option<usize>,
    pub write_error: Option<io::ErrorKind>,
}

impl MockStream {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            ..Self::default()
        }
    }

    pub fn with_input(fd: RawFd, input: &[u8]) -> Self {
        Self {
            fd,
            input: input.to_vec(),
            ..Self::default()
        }
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.input[self.read_pos..];
        if rest.is_empty() {
            return if self.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(kind.into());
        }
        let n = match self.write_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => {
                let n = budget.min(buf.len());
                self.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for MockStream {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// Runs `process` until the request stops making progress on its own.
pub fn drive(handler: &ConnectionHandler, req: &mut Request<MockStream>) -> Progress {
    for _ in 0..10_000 {
        let progress = handler.process(req);
        if progress != Progress::Continue {
            return progress;
        }
    }
    panic!("request never blocked or closed");
}

pub fn written(req: &Request<MockStream>) -> String {
    req.socket().map(MockStream::written_str).unwrap_or_default()
}

/// Splits a response into its head and body.
pub fn split_response(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").unwrap_or((response, ""))
}

/// A fresh directory under the system temp dir.
pub fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cinder-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
