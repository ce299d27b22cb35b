mod common;

use std::path::PathBuf;

use cinder::config::Config;
use cinder::http::request::{KeepAlive, Method, Request, RequestStatus};
use cinder::http::response::{Responder, StatusCode, keep_alive_phrase};
use cinder::http::writer::WriteError;
use common::{MockStream, written};

fn responder() -> Responder {
    let cfg = Config {
        server_name: "Test/1.0".to_string(),
        ..Config::default()
    };
    Responder::new(&cfg)
}

fn request(uri: &str) -> Request<MockStream> {
    let mut req = Request::new(4096, 1024);
    req.attach(MockStream::new(5), None, 10);
    req.request_uri = uri.to_string();
    req.http_version = "HTTP/1.0".to_string();
    req
}

/// Replaces the 29 date characters after `Date: ` so output can be compared.
fn mask_date(response: &str) -> String {
    match response.find("Date: ") {
        Some(at) => {
            let start = at + "Date: ".len();
            format!("{}<date>{}", &response[..start], &response[start + 29..])
        }
        None => response.to_string(),
    }
}

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::MovedPermanently.as_u16(), 301);
    assert_eq!(StatusCode::MovedTemporarily.as_u16(), 302);
    assert_eq!(StatusCode::NotModified.as_u16(), 304);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Unauthorized.as_u16(), 401);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::ServerError.as_u16(), 500);
    assert_eq!(StatusCode::NotImplemented.as_u16(), 501);
    assert_eq!(StatusCode::VersionNotSupported.as_u16(), 505);
}

#[test]
fn test_status_line_matches_code_and_reason() {
    for status in [
        StatusCode::Ok,
        StatusCode::NotModified,
        StatusCode::Forbidden,
        StatusCode::VersionNotSupported,
    ] {
        let expected = format!("HTTP/1.0 {} {}\r\n", status.as_u16(), status.reason_phrase());
        assert_eq!(status.status_line(), expected);
    }
}

#[test]
fn test_not_found_exact_bytes() {
    let mut req = request("/missing");
    responder().not_found(&mut req);

    assert_eq!(req.response_status, Some(StatusCode::NotFound));
    assert_eq!(
        mask_date(&written(&req)),
        "HTTP/1.0 404 Not Found\r\n\
         Date: <date>\r\n\
         Server: Test/1.0\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         \r\n\
         <HTML><HEAD><TITLE>404 Not Found</TITLE></HEAD>\n\
         <BODY><H1>404 Not Found</H1>\n\
         The requested URL /missing was not found on this server.\n\
         </BODY></HTML>\n"
    );
    assert_eq!(req.output().pending(), 0);
}

#[test]
fn test_date_header_is_rfc822() {
    let mut req = request("/");
    responder().forbidden(&mut req);
    let out = written(&req);
    let at = out.find("Date: ").unwrap() + 6;
    let date = &out[at..at + 29];
    assert!(date.ends_with(" GMT"));
    assert!(cinder::http::date::parse_http_date(date).is_some());
}

#[test]
fn test_simple_request_gets_body_only() {
    let mut req = request("/missing");
    req.simple = true;
    responder().not_found(&mut req);

    let out = written(&req);
    assert!(out.starts_with("<HTML><HEAD><TITLE>404 Not Found"));
    assert!(!out.contains("HTTP/1.0"));
}

#[test]
fn test_head_request_gets_headers_only() {
    let mut req = request("/missing");
    req.method = Method::HEAD;
    responder().not_found(&mut req);

    let out = written(&req);
    assert!(out.starts_with("HTTP/1.0 404 Not Found\r\n"));
    assert!(out.ends_with("Content-Type: text/html\r\n\r\n"));
}

#[test]
fn test_keep_alive_phrase() {
    assert_eq!(
        keep_alive_phrase(10, 1000),
        "Connection: Keep-Alive\r\nKeep-Alive: timeout=10, max=1000\r\n"
    );

    let mut req = request("/gone");
    req.keepalive = KeepAlive::Active;
    responder().not_found(&mut req);
    let out = written(&req);
    assert!(out.contains("Connection: Keep-Alive\r\nKeep-Alive: timeout=10, max=1000\r\n"));
    assert!(!out.contains("Connection: close"));
}

#[test]
fn test_redirect_escapes_location() {
    let mut req = request("/old");
    responder().redirect_perm(&mut req, "/new place/");

    let out = written(&req);
    assert!(out.starts_with("HTTP/1.0 301 Moved Permanently\r\n"));
    assert!(out.contains("Location: /new%20place/\r\n\r\n"));
    assert!(out.contains("<A HREF=\"/new%20place/\">here</A>"));

    let mut req = request("/old");
    responder().redirect_temp(&mut req, "http://example.com/");
    assert!(written(&req).starts_with("HTTP/1.0 302 Moved Temporarily\r\n"));
    assert_eq!(req.response_status, Some(StatusCode::MovedTemporarily));
}

#[test]
fn test_unauthorized_sends_challenge() {
    let mut req = request("/private");
    responder().unauthorized(&mut req, "staff");
    let out = written(&req);
    assert!(out.starts_with("HTTP/1.0 401 Unauthorized\r\n"));
    assert!(out.contains("WWW-Authenticate: Basic realm=\"staff\"\r\n"));
}

#[test]
fn test_bad_version_echoes_version() {
    let mut req = request("/");
    req.http_version = "HTTP/2.0".to_string();
    responder().bad_version(&mut req);
    let out = written(&req);
    assert!(out.starts_with("HTTP/1.0 505 HTTP Version Not Supported\r\n"));
    assert!(out.contains("Version encountered: HTTP/2.0"));
}

#[test]
fn test_request_ok_writes_entity_headers() {
    let mut req = request("/docs/page.html");
    req.pathname = Some(PathBuf::from("/srv/docs/page.html"));
    req.filesize = 1234;
    req.last_modified = 784111777;
    responder().request_ok(&mut req).unwrap();

    assert_eq!(req.response_status, Some(StatusCode::Ok));
    // Last-Modified flushes on its own, so the head is split between the
    // socket and the buffer
    let pending = String::from_utf8_lossy(req.output().pending_bytes()).into_owned();
    assert!(!pending.is_empty());
    let head = written(&req) + &pending;
    assert!(head.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(head.contains("Content-Length: 1234\r\n"));
    assert!(head.contains("Last-Modified: Sun, 06 Nov 1994 08:49:37 GMT\r\n"));
    assert!(head.contains("Content-Type: text/html\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
}

#[test]
fn test_request_ok_for_script_leaves_headers_to_script() {
    let mut req = request("/cgi-bin/env");
    req.is_cgi = true;
    responder().request_ok(&mut req).unwrap();

    let head = String::from_utf8_lossy(req.output().pending_bytes()).into_owned();
    assert!(head.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(!head.contains("Content-Length"));
    assert!(!head.contains("Content-Type"));
    assert!(!head.ends_with("\r\n\r\n"));
}

#[test]
fn test_not_modified_has_no_body() {
    let mut req = request("/a.txt");
    responder().not_modified(&mut req);
    let out = written(&req);
    assert!(out.starts_with("HTTP/1.0 304 Not Modified\r\n"));
    assert!(out.contains("Content-Type: text/plain\r\n"));
    assert!(out.ends_with("\r\n\r\n"));
}

#[test]
fn test_error_page_overflow_closes() {
    let mut req = Request::new(64, 256);
    req.attach(MockStream::new(5), None, 10);
    req.request_uri = "/missing".to_string();
    responder().not_found(&mut req);
    assert_eq!(req.status, RequestStatus::Close);
}

#[test]
fn test_request_ok_stops_at_first_refused_write() {
    let mut req = Request::new(64, 256);
    req.attach(MockStream::new(5), None, 10);
    req.request_uri = "/a.txt".to_string();

    // status line and Date fit, Server does not
    assert_eq!(responder().request_ok(&mut req), Err(WriteError::Overflow));
    assert_eq!(req.status, RequestStatus::Close);
    assert_eq!(req.output().pending(), "HTTP/1.0 200 OK\r\n".len() + "Date: \r\n".len() + 29);
    assert!(written(&req).is_empty());
}
