use crate::http::uri::to_upper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// No complete request head yet.
    Incomplete,
    InvalidRequest,
    InvalidHeader,
}

/// A request head viewed in place inside the input buffer.
///
/// Header names have been canonicalized (`If-Modified-Since` becomes
/// `IF_MODIFIED_SINCE`) so they can be matched directly and reused as CGI
/// variable names.
#[derive(Debug)]
pub struct RequestHead<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    /// `None` for an HTTP/0.9 simple request.
    pub version: Option<&'a str>,
    pub headers: Vec<(&'a str, &'a str)>,
}

impl RequestHead<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }

    pub fn is_simple(&self) -> bool {
        self.version.is_none()
    }
}

/// Parses the request line and headers at the front of `buf`.
///
/// Returns the head and the number of bytes it occupied; anything after
/// that (a body or a pipelined request) is left alone. A request line with
/// no version is a complete HTTP/0.9 request by itself. Empty lines before
/// the request line, such as a CRLF trailing a previous POST body, are
/// skipped and counted as consumed.
pub fn parse_request_head(buf: &mut [u8]) -> Result<(RequestHead<'_>, usize), ParseError> {
    let blank = buf.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
    let buf = &mut buf[blank..];
    let (head_len, consumed) = find_head_end(buf).ok_or(ParseError::Incomplete)?;

    for line in buf[..head_len].split_mut(|&b| b == b'\n').skip(1) {
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            to_upper(&mut line[..colon]);
        }
    }

    let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ParseError::InvalidRequest)?;
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_ascii_whitespace();
    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let uri = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next();
    if parts.next().is_some() {
        return Err(ParseError::InvalidRequest);
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        if key.is_empty() || key.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::InvalidHeader);
        }
        headers.push((key, value.trim()));
    }

    Ok((
        RequestHead {
            method,
            uri,
            version,
            headers,
        },
        blank + consumed,
    ))
}

/// Returns `(head length, bytes consumed)`.
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let first_nl = buf.iter().position(|&b| b == b'\n')?;
    let first_line = &buf[..first_nl];
    if first_line.split(u8::is_ascii_whitespace).filter(|t| !t.is_empty()).count() < 3 {
        return Some((first_nl, first_nl + 1));
    }

    let mut i = first_nl;
    while i < buf.len() {
        // i sits on a '\n'; the head ends if the next line is empty
        match &buf[i + 1..] {
            [b'\n', ..] => return Some((i, i + 2)),
            [b'\r', b'\n', ..] => return Some((i, i + 3)),
            _ => {}
        }
        i = i + 1 + buf[i + 1..].iter().position(|&b| b == b'\n')?;
    }
    None
}
