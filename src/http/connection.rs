use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Buf;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::alias::{AliasKind, AliasTable};
use crate::http::cgi::{self, CgiContext, CgiGateway, ScriptTarget};
use crate::http::date::{self, COMMONLOG_LEN, ModifiedSince};
use crate::http::parser::{ParseError, RequestHead, parse_request_head};
use crate::http::request::{KeepAlive, Method, Request, RequestStatus};
use crate::http::response::Responder;
use crate::http::uri::{clean_pathname, unescape_uri};
use crate::http::writer::Flush;

/// What the event loop should do with a request after one processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work can be done right away; keep it on the ready list.
    Continue,
    /// Nothing to do until the client sends more.
    BlockRead,
    /// Nothing to do until the socket drains.
    BlockWrite,
    /// Release the record.
    Close,
}

/// The owned parts of a request head, taken out of the input stream.
struct Head {
    method: Option<Method>,
    uri: String,
    version: Option<String>,
    keep_alive: bool,
    if_modified_since: Option<String>,
    content_type: Option<String>,
    content_length: Option<String>,
    env: Vec<(String, String)>,
}

impl Head {
    fn from_parsed(head: &RequestHead<'_>) -> Self {
        let mut out = Head {
            method: Method::from_str(head.method),
            uri: head.uri.to_string(),
            version: head.version.map(str::to_string),
            keep_alive: false,
            if_modified_since: None,
            content_type: None,
            content_length: None,
            env: Vec::new(),
        };
        for &(name, value) in &head.headers {
            match name {
                "CONNECTION" => out.keep_alive |= value.eq_ignore_ascii_case("keep-alive"),
                "IF_MODIFIED_SINCE" => {
                    // Some clients append "; length=N"
                    let date = value.split(';').next().unwrap_or(value).trim();
                    out.if_modified_since.get_or_insert_with(|| date.to_string());
                }
                "CONTENT_TYPE" => out.content_type = Some(value.to_string()),
                "CONTENT_LENGTH" => out.content_length = Some(value.to_string()),
                _ => out.env.push((name.to_string(), value.to_string())),
            }
        }
        out
    }
}

/// Drives requests through their states.
///
/// ```text
///   ReadHeader ──► (ReadBody) ──► Write ──► Done ──► ReadHeader (keep-alive)
///        │                          │         └────► Close
///        └── error response ────────┴──► Done
/// ```
///
/// Every call does a bounded amount of work and never waits: a read or
/// write that would block hands the request back to the event loop.
pub struct ConnectionHandler {
    responder: Responder,
    aliases: AliasTable,
    document_root: PathBuf,
    directory_index: String,
    max_post_size: usize,
    cgi: CgiContext,
    gateway: Option<Box<dyn CgiGateway>>,
}

impl ConnectionHandler {
    pub fn new(cfg: &Config) -> Self {
        Self {
            responder: Responder::new(cfg),
            aliases: AliasTable::from_config(cfg),
            document_root: cfg.document_root.clone(),
            directory_index: cfg.directory_index.clone(),
            max_post_size: cfg.max_post_size,
            cgi: CgiContext {
                server_software: cfg.server_name.clone(),
                server_admin: cfg.server_admin.clone(),
                document_root: cfg.document_root.clone(),
            },
            gateway: None,
        }
    }

    /// Enables script aliases. Without a gateway they answer 501.
    pub fn with_gateway(mut self, gateway: impl CgiGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }

    /// Picks up a new configuration, keeping the gateway.
    pub fn reconfigure(&mut self, cfg: &Config) {
        let gateway = self.gateway.take();
        *self = Self::new(cfg);
        self.gateway = gateway;
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Runs one step of `req`.
    pub fn process<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        if req.status == RequestStatus::Close {
            // last chance for whatever is still buffered
            req.flush();
            return Progress::Close;
        }

        if req.output.pending() > 0 {
            match req.flush() {
                Flush::Fatal => return Progress::Close,
                Flush::Blocked => return Progress::BlockWrite,
                Flush::Written { pending } if pending > 0 => return Progress::BlockWrite,
                Flush::Written { .. } => {}
            }
        }

        match req.status {
            RequestStatus::ReadHeader => self.read_header(req),
            RequestStatus::ReadBody => self.read_body(req),
            RequestStatus::Write => self.write_body(req),
            RequestStatus::Done => self.finish(req),
            RequestStatus::Close => Progress::Close,
        }
    }

    fn read_header<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        loop {
            if let Some(progress) = self.try_parse(req) {
                return progress;
            }
            if req.client_stream.len() >= req.stream_capacity() {
                warn!(remote = ?req.remote, size = req.client_stream.len(), "Request head too large");
                self.responder.bad_request(req);
                return done(req);
            }
            if let Some(progress) = read_more(req) {
                return progress;
            }
        }
    }

    fn try_parse<S: Read + Write>(&self, req: &mut Request<S>) -> Option<Progress> {
        if req.client_stream.is_empty() {
            return None;
        }
        let parsed = match parse_request_head(&mut req.client_stream) {
            Ok((head, consumed)) => Ok((Head::from_parsed(&head), consumed)),
            Err(e) => Err(e),
        };

        match parsed {
            Err(ParseError::Incomplete) => None,
            Err(e) => {
                debug!(remote = ?req.remote, error = ?e, "Malformed request head");
                req.client_stream.clear();
                self.responder.bad_request(req);
                Some(done(req))
            }
            Ok((head, consumed)) => {
                req.client_stream.advance(consumed);
                req.touch();
                Some(self.start_request(req, head))
            }
        }
    }

    fn start_request<S: Read + Write>(&self, req: &mut Request<S>, head: Head) -> Progress {
        req.request_uri = head.uri;
        req.if_modified_since = head.if_modified_since;
        req.content_type = head.content_type;
        req.content_length = head.content_length;
        for (name, value) in &head.env {
            cgi::add_header_env(req, name, value);
        }

        match head.version {
            None => {
                req.simple = true;
                req.http_version = "HTTP/0.9".to_string();
                if head.method != Some(Method::GET) {
                    self.responder.bad_request(req);
                    return done(req);
                }
            }
            Some(version) => {
                req.http_version = version;
                match major_version(&req.http_version) {
                    None => {
                        self.responder.bad_request(req);
                        return done(req);
                    }
                    Some(major) if major > 1 => {
                        self.responder.bad_version(req);
                        return done(req);
                    }
                    Some(_) => {}
                }
            }
        }

        // a declared body is never left in the stream for the next request
        let has_body = req.content_length.is_some() && content_length(req) != Some(0);
        if head.keep_alive && !has_body && !req.simple && req.kacount > 0 {
            req.kacount -= 1;
            req.keepalive = KeepAlive::Active;
        }

        let Some(method) = head.method else {
            self.responder.not_implemented(req);
            return done(req);
        };
        req.method = method;

        self.dispatch(req)
    }

    fn dispatch<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        let uri = req.request_uri.clone();
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri.as_str(), None),
        };
        if !path.starts_with('/') {
            self.responder.bad_request(req);
            return done(req);
        }

        let mut raw = path.as_bytes().to_vec();
        if let Err(e) = unescape_uri(&mut raw) {
            debug!(remote = ?req.remote, offset = e.offset, "Malformed escape in URI");
            self.responder.bad_request(req);
            return done(req);
        }
        let Ok(decoded) = String::from_utf8(raw) else {
            self.responder.bad_request(req);
            return done(req);
        };
        let clean = clean_pathname(&decoded);
        req.query_string = query.map(str::to_string);

        let file = match self.aliases.translate(&clean) {
            Some(m) if m.kind == AliasKind::Redirect => {
                let location = with_query(m.target, query);
                self.responder.redirect_perm(req, &location);
                return done(req);
            }
            Some(m) if m.kind == AliasKind::ScriptAlias => {
                let target = ScriptTarget::from_alias(&m);
                return self.start_script(req, target);
            }
            Some(m) => PathBuf::from(m.target),
            None => self.document_root.join(clean.trim_start_matches('/')),
        };

        if req.method == Method::POST {
            self.responder.not_implemented(req);
            return done(req);
        }
        self.serve_file(req, file, &clean, query)
    }

    fn serve_file<S: Read + Write>(
        &self,
        req: &mut Request<S>,
        mut path: PathBuf,
        clean: &str,
        query: Option<&str>,
    ) -> Progress {
        let mut meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => return self.file_error(req, &path, e),
        };

        if meta.is_dir() {
            if !clean.ends_with('/') {
                let location = with_query(format!("{clean}/"), query);
                self.responder.redirect_perm(req, &location);
                return done(req);
            }
            let index = path.join(&self.directory_index);
            match fs::metadata(&index) {
                Ok(index_meta) if index_meta.is_file() => {
                    path = index;
                    meta = index_meta;
                }
                _ => {
                    self.responder.forbidden(req);
                    return done(req);
                }
            }
        }
        if !meta.is_file() {
            self.responder.forbidden(req);
            return done(req);
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => return self.file_error(req, &path, e),
        };
        req.filesize = meta.len();
        req.last_modified = mtime(&meta);
        req.pathname = Some(path);

        let verdict = req
            .if_modified_since
            .as_deref()
            .map(|header| date::modified_since(req.last_modified, header));
        match verdict {
            Some(ModifiedSince::NotModified) => {
                self.responder.not_modified(req);
                return done(req);
            }
            Some(ModifiedSince::Unparseable) => {
                debug!(remote = ?req.remote, "Ignoring unparseable If-Modified-Since");
            }
            _ => {}
        }

        if self.responder.request_ok(req).is_err() || req.is_head() {
            return done(req);
        }
        req.data = Some(Box::new(file));
        req.status = RequestStatus::Write;
        Progress::Continue
    }

    fn file_error<S: Write>(&self, req: &mut Request<S>, path: &Path, e: io::Error) -> Progress {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => self.responder.not_found(req),
            io::ErrorKind::PermissionDenied => self.responder.forbidden(req),
            _ => {
                warn!(path = %path.display(), error = %e, "Cannot access file");
                self.responder.server_error(req);
            }
        }
        done(req)
    }

    fn start_script<S: Read + Write>(&self, req: &mut Request<S>, target: ScriptTarget) -> Progress {
        req.is_cgi = true;
        // script output carries no length; closing the connection ends it
        req.keepalive = KeepAlive::Inactive;
        if self.gateway.is_none() {
            self.responder.not_implemented(req);
            return done(req);
        }
        match fs::metadata(&target.script_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                self.responder.forbidden(req);
                return done(req);
            }
            Err(e) => return self.file_error(req, &target.script_path, e),
        }

        req.script_name = Some(target.script_name);
        req.path_translated = target
            .path_info
            .as_deref()
            .map(|info| self.document_root.join(info.trim_start_matches('/')).display().to_string());
        req.path_info = target.path_info;
        req.pathname = Some(target.script_path);

        if req.method == Method::POST {
            match content_length(req) {
                Some(length) if length <= self.max_post_size => {
                    req.post_data.reserve(length);
                    req.status = RequestStatus::ReadBody;
                    return Progress::Continue;
                }
                Some(length) => {
                    warn!(remote = ?req.remote, length, limit = self.max_post_size, "POST body too large");
                    self.responder.bad_request(req);
                    return done(req);
                }
                None => {
                    self.responder.bad_request(req);
                    return done(req);
                }
            }
        }
        self.run_script(req)
    }

    fn read_body<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        let expected = content_length(req).unwrap_or(0);
        loop {
            let missing = expected.saturating_sub(req.post_data.len());
            let take = missing.min(req.client_stream.len());
            req.post_data.extend_from_slice(&req.client_stream[..take]);
            req.client_stream.advance(take);

            if req.post_data.len() >= expected {
                return self.run_script(req);
            }
            if let Some(progress) = read_more(req) {
                return progress;
            }
        }
    }

    fn run_script<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        let (Some(gateway), Some(script)) = (self.gateway.as_deref(), req.pathname.clone()) else {
            self.responder.not_implemented(req);
            return done(req);
        };
        cgi::complete_env(req, &self.cgi);

        match gateway.launch(&script, &req.cgi_env, &req.post_data) {
            Ok(output) => {
                if self.responder.request_ok(req).is_err() {
                    return done(req);
                }
                req.data = Some(output);
                req.status = RequestStatus::Write;
                Progress::Continue
            }
            Err(e) => {
                warn!(script = %script.display(), error = %e, "Script launch failed");
                self.responder.server_error(req);
                done(req)
            }
        }
    }

    /// Moves one buffer's worth of the data source to the socket.
    fn write_body<S: Read + Write>(&self, req: &mut Request<S>) -> Progress {
        let Some(data) = req.data.as_mut() else {
            return done(req);
        };

        if req.output.remaining() > 0 {
            match data.read(req.output.spare_mut()) {
                Ok(0) => {
                    req.data = None;
                    return done(req);
                }
                Ok(n) => {
                    req.output.commit(n);
                    req.filepos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(remote = ?req.remote, error = %e, "Reading response body failed");
                    req.data = None;
                    req.status = RequestStatus::Close;
                    return Progress::Close;
                }
            }
        }

        match req.flush() {
            Flush::Fatal => Progress::Close,
            Flush::Blocked => Progress::BlockWrite,
            Flush::Written { pending } if pending > 0 => Progress::BlockWrite,
            Flush::Written { .. } => Progress::Continue,
        }
    }

    /// The response has left the buffer: log it, then keep the connection
    /// for the next request or close it.
    fn finish<S>(&self, req: &mut Request<S>) -> Progress {
        log_access(req);
        if req.keepalive == KeepAlive::Active {
            req.reset_for_next();
            Progress::Continue
        } else {
            req.status = RequestStatus::Close;
            Progress::Close
        }
    }
}

fn done<S>(req: &mut Request<S>) -> Progress {
    if req.status != RequestStatus::Close {
        req.status = RequestStatus::Done;
    }
    Progress::Continue
}

/// Reads whatever the socket has into the client stream.
fn fill_stream<S: Read>(req: &mut Request<S>) -> io::Result<usize> {
    let capacity = req.stream_capacity();
    let len = req.client_stream.len();
    let Some(socket) = req.socket.as_mut() else {
        return Ok(0);
    };

    req.client_stream.resize(capacity, 0);
    let result = socket.read(&mut req.client_stream[len..]);
    req.client_stream.truncate(len + result.as_ref().map_or(0, |n| *n));

    if matches!(result, Ok(n) if n > 0) {
        req.touch();
    }
    result
}

/// `None` when the caller can keep going with what was read.
fn read_more<S: Read>(req: &mut Request<S>) -> Option<Progress> {
    match fill_stream(req) {
        Ok(0) => {
            debug!(remote = ?req.remote, "Client closed connection");
            req.status = RequestStatus::Close;
            Some(Progress::Close)
        }
        Ok(_) => None,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Some(Progress::BlockRead),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
        Err(e) => {
            debug!(remote = ?req.remote, error = %e, "Read failed");
            req.status = RequestStatus::Close;
            Some(Progress::Close)
        }
    }
}

fn content_length<S>(req: &Request<S>) -> Option<usize> {
    req.content_length.as_deref()?.trim().parse().ok()
}

fn major_version(version: &str) -> Option<u32> {
    let (major, minor) = version.strip_prefix("HTTP/")?.split_once('.')?;
    if minor.is_empty() || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    major.parse().ok()
}

fn with_query(mut location: String, query: Option<&str>) -> String {
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }
    location
}

fn mtime(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64)
}

/// One common-log-format line per finished request.
fn log_access<S>(req: &Request<S>) {
    let mut stamp = [0u8; COMMONLOG_LEN];
    date::commonlog_time(&mut stamp, 0);
    let stamp = std::str::from_utf8(&stamp).unwrap_or("");
    let host = req.remote.map_or_else(|| "-".to_string(), |addr| addr.ip().to_string());
    let status = req.response_status.map_or(0, |s| s.as_u16());

    info!(
        target: "access",
        "{host} - - {stamp}\"{} {} {}\" {status} {}",
        req.method.as_str(),
        req.request_uri,
        req.http_version,
        req.bytes_sent
    );
}
