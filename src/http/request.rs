use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use bytes::BytesMut;

use crate::http::response::StatusCode;
use crate::http::writer::OutputBuffer;
use crate::server::scheduler::Links;

/// HTTP request methods.
///
/// Only the methods an HTTP/1.0 server has to know about are recognized.
/// Anything else is answered with 501 Not Implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// POST - Submit data to a script
    POST,
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// # Example
    ///
    /// ```
    /// # use cinder::http::request::Method;
    /// assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    /// assert_eq!(Method::from_str("head"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "HEAD" => Some(Method::HEAD),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
        }
    }
}

/// Where a request is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Waiting for a complete request head.
    ReadHeader,
    /// Collecting a POST body for a script.
    ReadBody,
    /// Streaming the data source to the client.
    Write,
    /// Response generated; drain the buffer, then log and turn over.
    Done,
    /// Terminal. The record goes back to the pool.
    Close,
}

/// Keep-alive state of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    Inactive,
    Active,
}

/// One pooled connection record.
///
/// Records are created once when the pool is built and recycled for every
/// connection afterwards; the output buffer and input stream keep their
/// allocations across reuse.
pub struct Request<S> {
    pub(crate) socket: Option<S>,
    pub status: RequestStatus,
    pub response_status: Option<StatusCode>,
    /// HTTP/0.9 request: the response carries no status line or headers.
    pub simple: bool,
    pub keepalive: KeepAlive,
    /// Requests still allowed on this connection.
    pub kacount: u32,
    pub time_last: Instant,

    pub method: Method,
    pub http_version: String,
    pub request_uri: String,
    pub pathname: Option<PathBuf>,
    pub if_modified_since: Option<String>,
    /// Modification time of the resource, seconds since the epoch.
    pub last_modified: i64,

    pub data: Option<Box<dyn Read>>,
    pub filesize: u64,
    pub filepos: u64,
    pub bytes_sent: u64,

    pub remote: Option<SocketAddr>,

    pub is_cgi: bool,
    pub cgi_env: Vec<String>,
    pub path_info: Option<String>,
    pub path_translated: Option<String>,
    pub script_name: Option<String>,
    pub query_string: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub post_data: Vec<u8>,

    pub(crate) client_stream: BytesMut,
    stream_capacity: usize,
    pub(crate) output: OutputBuffer,
    pub(crate) links: Links,
}

impl<S> Request<S> {
    /// Creates an unattached record with fixed-size buffers.
    pub fn new(buffer_size: usize, stream_size: usize) -> Self {
        Self {
            socket: None,
            status: RequestStatus::ReadHeader,
            response_status: None,
            simple: false,
            keepalive: KeepAlive::Inactive,
            kacount: 0,
            time_last: Instant::now(),
            method: Method::GET,
            http_version: String::new(),
            request_uri: String::new(),
            pathname: None,
            if_modified_since: None,
            last_modified: 0,
            data: None,
            filesize: 0,
            filepos: 0,
            bytes_sent: 0,
            remote: None,
            is_cgi: false,
            cgi_env: Vec::new(),
            path_info: None,
            path_translated: None,
            script_name: None,
            query_string: None,
            content_type: None,
            content_length: None,
            post_data: Vec::new(),
            client_stream: BytesMut::with_capacity(stream_size),
            stream_capacity: stream_size,
            output: OutputBuffer::new(buffer_size),
            links: Links::default(),
        }
    }

    /// Gives the record a freshly accepted connection.
    pub fn attach(&mut self, socket: S, remote: Option<SocketAddr>, ka_max: u32) {
        self.socket = Some(socket);
        self.remote = remote;
        self.kacount = ka_max;
        self.status = RequestStatus::ReadHeader;
        self.time_last = Instant::now();
    }

    /// Drops the socket and every per-connection field.
    pub(crate) fn recycle(&mut self) {
        self.socket = None;
        self.remote = None;
        self.kacount = 0;
        self.client_stream.clear();
        self.output.reset();
        self.clear_exchange();
    }

    /// Prepares for the next request on a kept-alive connection.
    ///
    /// Pipelined input already read from the client stays in the stream.
    pub fn reset_for_next(&mut self) {
        self.clear_exchange();
        self.time_last = Instant::now();
    }

    fn clear_exchange(&mut self) {
        self.status = RequestStatus::ReadHeader;
        self.response_status = None;
        self.simple = false;
        self.keepalive = KeepAlive::Inactive;
        self.method = Method::GET;
        self.http_version.clear();
        self.request_uri.clear();
        self.pathname = None;
        self.if_modified_since = None;
        self.last_modified = 0;
        self.data = None;
        self.filesize = 0;
        self.filepos = 0;
        self.bytes_sent = 0;
        self.is_cgi = false;
        self.cgi_env.clear();
        self.path_info = None;
        self.path_translated = None;
        self.script_name = None;
        self.query_string = None;
        self.content_type = None;
        self.content_length = None;
        self.post_data.clear();
    }

    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> Option<&mut S> {
        self.socket.as_mut()
    }

    pub fn is_attached(&self) -> bool {
        self.socket.is_some()
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Bytes read from the client but not yet consumed by the parser.
    pub fn client_stream(&self) -> &[u8] {
        &self.client_stream
    }

    pub fn stream_capacity(&self) -> usize {
        self.stream_capacity
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Records activity for idle-timeout accounting.
    pub fn touch(&mut self) {
        self.time_last = Instant::now();
    }
}
