use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::http::date::{self, RFC822_LEN};
use crate::http::mime::MimeTypes;
use crate::http::request::{KeepAlive, Request, RequestStatus};
use crate::http::uri::{escape_string, simple_itoa};
use crate::http::writer::{Flush, WriteError};

/// HTTP status codes the server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Moved Temporarily
    MovedTemporarily,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Server Error
    ServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 505 HTTP Version Not Supported
    VersionNotSupported,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use cinder::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::VersionNotSupported.as_u16(), 505);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::MovedPermanently => 301,
            StatusCode::MovedTemporarily => 302,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::ServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::VersionNotSupported => 505,
        }
    }

    /// Returns the reason phrase sent on the status line.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::ServerError => "Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::VersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// The complete status line, CRLF included.
    pub fn status_line(&self) -> &'static str {
        match self {
            StatusCode::Ok => "HTTP/1.0 200 OK\r\n",
            StatusCode::MovedPermanently => "HTTP/1.0 301 Moved Permanently\r\n",
            StatusCode::MovedTemporarily => "HTTP/1.0 302 Moved Temporarily\r\n",
            StatusCode::NotModified => "HTTP/1.0 304 Not Modified\r\n",
            StatusCode::BadRequest => "HTTP/1.0 400 Bad Request\r\n",
            StatusCode::Unauthorized => "HTTP/1.0 401 Unauthorized\r\n",
            StatusCode::Forbidden => "HTTP/1.0 403 Forbidden\r\n",
            StatusCode::NotFound => "HTTP/1.0 404 Not Found\r\n",
            StatusCode::ServerError => "HTTP/1.0 500 Server Error\r\n",
            StatusCode::NotImplemented => "HTTP/1.0 501 Not Implemented\r\n",
            StatusCode::VersionNotSupported => "HTTP/1.0 505 HTTP Version Not Supported\r\n",
        }
    }
}

/// Builds the keep-alive header pair for the configured limits.
pub fn keep_alive_phrase(timeout: u32, max: u32) -> String {
    format!("Connection: Keep-Alive\r\nKeep-Alive: timeout={timeout}, max={max}\r\n")
}

const CONNECTION_CLOSE: &str = "Connection: close\r\n";
const TEXT_HTML: &str = "Content-Type: text/html\r\n";

/// Writes complete responses into a request's output buffer.
///
/// Every error and redirect entry point follows the same shape: record the
/// status, emit the status line and headers unless the request is simple,
/// emit a small HTML body unless the method is HEAD, then flush.
pub struct Responder {
    ka_phrase: String,
    server_line: String,
    mime: MimeTypes,
}

impl Responder {
    pub fn new(cfg: &Config) -> Self {
        Self {
            ka_phrase: keep_alive_phrase(cfg.keep_alive.timeout, cfg.keep_alive.max),
            server_line: format!("Server: {}\r\n", cfg.server_name),
            mime: MimeTypes::from_config(cfg),
        }
    }

    /// Regenerates the precomputed header text after a configuration change.
    pub fn reconfigure(&mut self, cfg: &Config) {
        *self = Self::new(cfg);
    }

    pub fn ka_phrase(&self) -> &str {
        &self.ka_phrase
    }

    pub fn mime(&self) -> &MimeTypes {
        &self.mime
    }

    fn print_http_headers<S>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        let mut date_line = [0u8; 6 + RFC822_LEN + 2];
        date_line[..6].copy_from_slice(b"Date: ");
        let mut stamp = [0u8; RFC822_LEN];
        date::rfc822_time_buf(&mut stamp, 0);
        date_line[6..6 + RFC822_LEN].copy_from_slice(&stamp);
        date_line[6 + RFC822_LEN..].copy_from_slice(b"\r\n");

        req.write(date_line)?;
        req.write(&self.server_line)?;
        if req.keepalive == KeepAlive::Active {
            req.write(&self.ka_phrase)?;
        } else {
            req.write(CONNECTION_CLOSE)?;
        }
        Ok(())
    }

    fn print_content_type<S>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        let name = req
            .pathname
            .as_deref()
            .and_then(Path::to_str)
            .unwrap_or(&req.request_uri);
        let mime = self.mime.lookup(name);
        emit(req, &["Content-Type: ", mime, "\r\n"])
    }

    fn print_content_length<S>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        let mut digits = [0u8; 20];
        let size = req.filesize;
        req.write("Content-Length: ")?;
        req.write(simple_itoa(size, &mut digits))?;
        req.write("\r\n")?;
        Ok(())
    }

    fn print_last_modified<S: Write>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        let mtime = req.last_modified;
        req.write("Last-Modified: ")?;
        if req.write_rfc822_time(mtime) == 0 {
            if req.status == RequestStatus::Close {
                return Err(WriteError::Closed);
            }
            tracing::error!(remote = ?req.remote, "No room for Last-Modified date");
            req.status = RequestStatus::Close;
            return Err(WriteError::Overflow);
        }
        req.write("\r\n")?;
        Ok(())
    }

    /// Status line and headers of a 200 response.
    ///
    /// Does not flush: the body follows in the same buffer. For script
    /// output the length, date and type headers and the blank line come
    /// from the script itself. An error means the request is now closing.
    pub fn request_ok<S: Write>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        req.response_status = Some(StatusCode::Ok);
        if req.simple {
            return Ok(());
        }

        req.write(StatusCode::Ok.status_line())?;
        self.print_http_headers(req)?;

        if !req.is_cgi {
            self.print_content_length(req)?;
            self.print_last_modified(req)?;
            self.print_content_type(req)?;
            req.write("\r\n")?;
        }
        Ok(())
    }

    /// 301 with a `Location` header.
    pub fn redirect_perm<S: Write>(&self, req: &mut Request<S>, url: &str) {
        self.redirect(req, StatusCode::MovedPermanently, url);
    }

    /// 302 with a `Location` header.
    pub fn redirect_temp<S: Write>(&self, req: &mut Request<S>, url: &str) {
        self.redirect(req, StatusCode::MovedTemporarily, url);
    }

    fn redirect<S: Write>(&self, req: &mut Request<S>, status: StatusCode, url: &str) {
        let url = escape_string(url);
        req.response_status = Some(status);
        let emitted = self.redirect_message(req, status, &url);
        send(req, emitted);
    }

    fn redirect_message<S: Write>(
        &self,
        req: &mut Request<S>,
        status: StatusCode,
        url: &str,
    ) -> Result<(), WriteError> {
        if !req.simple {
            req.write(status.status_line())?;
            self.print_http_headers(req)?;
            emit(req, &[TEXT_HTML, "Location: ", url, "\r\n\r\n"])?;
        }
        if !req.is_head() {
            let code = status.as_u16();
            let reason = status.reason_phrase();
            req.write(format!(
                "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD>\n\
                 <BODY>\n<H1>{code} Moved</H1>The document has moved\n<A HREF=\""
            ))?;
            emit(req, &[url, "\">here</A>.\n</BODY></HTML>\n"])?;
        }
        Ok(())
    }

    /// 304: headers only, whatever the method.
    pub fn not_modified<S: Write>(&self, req: &mut Request<S>) {
        req.response_status = Some(StatusCode::NotModified);
        let emitted = self.not_modified_message(req);
        send(req, emitted);
    }

    fn not_modified_message<S: Write>(&self, req: &mut Request<S>) -> Result<(), WriteError> {
        if !req.simple {
            req.write(StatusCode::NotModified.status_line())?;
            self.print_http_headers(req)?;
            self.print_content_type(req)?;
            req.write("\r\n")?;
        }
        Ok(())
    }

    pub fn bad_request<S: Write>(&self, req: &mut Request<S>) {
        self.error(
            req,
            StatusCode::BadRequest,
            None,
            &["Your client has issued a malformed or illegal request.\n"],
        );
    }

    /// 401 asking for Basic credentials for `realm`.
    pub fn unauthorized<S: Write>(&self, req: &mut Request<S>, realm: &str) {
        let uri = escape_string(&req.request_uri).into_owned();
        let challenge = format!("WWW-Authenticate: Basic realm=\"{realm}\"\r\n");
        self.error(
            req,
            StatusCode::Unauthorized,
            Some(&challenge),
            &["Your client does not have permission to get URL ", uri.as_str(), " from this server.\n"],
        );
    }

    pub fn forbidden<S: Write>(&self, req: &mut Request<S>) {
        let uri = escape_string(&req.request_uri).into_owned();
        self.error(
            req,
            StatusCode::Forbidden,
            None,
            &["Your client does not have permission to get URL ", uri.as_str(), " from this server.\n"],
        );
    }

    pub fn not_found<S: Write>(&self, req: &mut Request<S>) {
        let uri = escape_string(&req.request_uri).into_owned();
        self.error(
            req,
            StatusCode::NotFound,
            None,
            &["The requested URL ", uri.as_str(), " was not found on this server.\n"],
        );
    }

    pub fn server_error<S: Write>(&self, req: &mut Request<S>) {
        self.error(
            req,
            StatusCode::ServerError,
            None,
            &["The server encountered an internal error and could not complete your request.\n"],
        );
    }

    pub fn not_implemented<S: Write>(&self, req: &mut Request<S>) {
        let uri = escape_string(&req.request_uri).into_owned();
        self.error(
            req,
            StatusCode::NotImplemented,
            None,
            &["The requested method is not supported for URL ", uri.as_str(), " on this server.\n"],
        );
    }

    /// 505, echoing the version the client sent.
    pub fn bad_version<S: Write>(&self, req: &mut Request<S>) {
        let version = escape_string(&req.http_version).into_owned();
        self.error(
            req,
            StatusCode::VersionNotSupported,
            None,
            &[
                "HTTP versions other than 0.9 and 1.0 are not supported by this server.\n",
                "<p><p>Version encountered: ",
                version.as_str(),
                "<p><p>\n",
            ],
        );
    }

    fn error<S: Write>(
        &self,
        req: &mut Request<S>,
        status: StatusCode,
        extra_header: Option<&str>,
        body: &[&str],
    ) {
        req.response_status = Some(status);
        let emitted = self.error_message(req, status, extra_header, body);
        send(req, emitted);
    }

    fn error_message<S: Write>(
        &self,
        req: &mut Request<S>,
        status: StatusCode,
        extra_header: Option<&str>,
        body: &[&str],
    ) -> Result<(), WriteError> {
        if !req.simple {
            req.write(status.status_line())?;
            self.print_http_headers(req)?;
            if let Some(header) = extra_header {
                req.write(header)?;
            }
            emit(req, &[TEXT_HTML, "\r\n"])?;
        }
        if !req.is_head() {
            let code = status.as_u16();
            let reason = status.reason_phrase();
            req.write(format!(
                "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD>\n<BODY><H1>{code} {reason}</H1>\n"
            ))?;
            emit(req, body)?;
            req.write("</BODY></HTML>\n")?;
        }
        Ok(())
    }
}

/// Buffers `parts` in order, stopping at the first refusal.
fn emit<S>(req: &mut Request<S>, parts: &[&str]) -> Result<(), WriteError> {
    for part in parts {
        req.write(part)?;
    }
    Ok(())
}

/// Flushes a complete response. A refused write has already closed the
/// request; the driver hands whatever was buffered to the socket once more
/// before releasing it.
fn send<S: Write>(req: &mut Request<S>, emitted: Result<(), WriteError>) {
    match emitted {
        Ok(()) => {
            // partial and blocked flushes are resumed by the driver
            if req.flush() == Flush::Fatal {
                tracing::debug!(remote = ?req.remote, status = ?req.response_status, "Response lost");
            }
        }
        Err(e) => {
            tracing::debug!(remote = ?req.remote, status = ?req.response_status, error = ?e, "Response cut short");
        }
    }
}
