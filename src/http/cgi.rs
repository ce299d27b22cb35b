//! Boundary to an external CGI runner.
//!
//! The server does not start scripts itself. It fills in the environment a
//! CGI/1.1 script expects and hands it, together with any POST body, to a
//! [`CgiGateway`]. Whatever the gateway returns is streamed to the client
//! as-is, the script's own header block included.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::http::alias::AliasMatch;
use crate::http::request::Request;

/// Upper bound on environment entries per request.
pub const CGI_ENV_MAX: usize = 50;

/// Runs scripts on behalf of the server.
pub trait CgiGateway {
    /// Starts `script` with `env` (`NAME=value` entries) and `body` on its
    /// standard input, returning its standard output.
    fn launch(&self, script: &Path, env: &[String], body: &[u8]) -> io::Result<Box<dyn Read>>;
}

/// Server-wide values that go into every script environment.
#[derive(Debug, Clone)]
pub struct CgiContext {
    pub server_software: String,
    pub server_admin: Option<String>,
    pub document_root: PathBuf,
}

/// The pieces a script URI is split into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTarget {
    /// URI path of the script itself.
    pub script_name: String,
    /// Script file on disk.
    pub script_path: PathBuf,
    /// Whatever follows the script name, if anything.
    pub path_info: Option<String>,
}

impl ScriptTarget {
    /// Splits `/cgi-bin/name/extra` into the script and its path info.
    pub fn from_alias(m: &AliasMatch<'_>) -> Self {
        let (name, info) = match m.rest.find('/') {
            Some(slash) => (&m.rest[..slash], Some(m.rest[slash..].to_string())),
            None => (m.rest, None),
        };
        Self {
            script_name: format!("{}{}", m.fakename, name),
            script_path: PathBuf::from(format!("{}{}", m.realname, name)),
            path_info: info,
        }
    }
}

/// Adds a `NAME=value` entry. Returns false once the environment is full.
pub fn add_cgi_env<S>(req: &mut Request<S>, name: &str, value: &str) -> bool {
    if req.cgi_env.len() >= CGI_ENV_MAX {
        tracing::warn!(remote = ?req.remote, name, "CGI environment full, dropping variable");
        return false;
    }
    req.cgi_env.push(format!("{name}={value}"));
    true
}

/// Adds an `HTTP_*` entry for a request header whose name has already been
/// through [`to_upper`](crate::http::uri::to_upper).
pub fn add_header_env<S>(req: &mut Request<S>, name: &str, value: &str) -> bool {
    add_cgi_env(req, &format!("HTTP_{name}"), value)
}

/// Adds the standard CGI/1.1 variables derived from the request.
pub fn complete_env<S>(req: &mut Request<S>, ctx: &CgiContext) {
    let mut vars: Vec<(&str, String)> = vec![
        ("GATEWAY_INTERFACE", "CGI/1.1".to_string()),
        ("SERVER_SOFTWARE", ctx.server_software.clone()),
        ("SERVER_PROTOCOL", req.http_version.clone()),
        ("REQUEST_METHOD", req.method.as_str().to_string()),
        ("REQUEST_URI", req.request_uri.clone()),
        ("DOCUMENT_ROOT", ctx.document_root.display().to_string()),
    ];
    if let Some(admin) = &ctx.server_admin {
        vars.push(("SERVER_ADMIN", admin.clone()));
    }
    if let Some(remote) = req.remote {
        vars.push(("REMOTE_ADDR", remote.ip().to_string()));
        vars.push(("REMOTE_PORT", remote.port().to_string()));
    }

    let optional = [
        ("SCRIPT_NAME", &req.script_name),
        ("PATH_INFO", &req.path_info),
        ("PATH_TRANSLATED", &req.path_translated),
        ("QUERY_STRING", &req.query_string),
        ("CONTENT_TYPE", &req.content_type),
        ("CONTENT_LENGTH", &req.content_length),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            vars.push((name, value.clone()));
        }
    }

    for (name, value) in vars {
        add_cgi_env(req, name, &value);
    }
}
