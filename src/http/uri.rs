//! URI and header text helpers.
//!
//! Everything here works on plain byte slices so it can run directly on
//! the request's input buffer.

use std::borrow::Cow;
use std::fmt;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Bytes that may not appear verbatim in a `Location` header or in the
/// HTML bodies of generated responses.
static NEEDS_ESCAPE: [bool; 256] = build_escape_table();

const fn build_escape_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        table[i] = c <= b' '
            || c >= 0x7f
            || matches!(
                c,
                b'"' | b'#' | b'%' | b'\'' | b'<' | b'>' | b'[' | b'\\' | b']' | b'^' | b'`' | b'{'
                    | b'|' | b'}'
            );
        i += 1;
    }
    table
}

/// Returns true if `c` is written as `%XX` by [`escape_string`].
pub fn needs_escape(c: u8) -> bool {
    NEEDS_ESCAPE[c as usize]
}

/// A `%` escape that is cut short or is not followed by two hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedEscape {
    /// Offset of the offending `%`.
    pub offset: usize,
}

impl fmt::Display for MalformedEscape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed percent escape at offset {}", self.offset)
    }
}

impl std::error::Error for MalformedEscape {}

/// Collapses `//`, `/./` and `/../` into `/`.
///
/// A `..` segment drops the segment before it; a `..` with nothing left to
/// drop is discarded, so the result never climbs above the leading `/`.
/// Everything from the first `?` on is copied untouched.
pub fn clean_pathname(path: &str) -> String {
    let (path, query) = match path.find('?') {
        Some(q) => path.split_at(q),
        None => (path, ""),
    };

    let mut out = String::with_capacity(path.len() + query.len());
    let mut segments = path.split('/');
    let lead = segments.next().unwrap_or_default();
    out.push_str(lead);
    let root = lead.len() + 1;

    for segment in segments {
        if !out.ends_with('/') {
            out.push('/');
        }
        match segment {
            "" | "." => {}
            ".." => {
                if out.len() > root {
                    out.pop();
                    let cut = out.rfind('/').map_or(root, |p| (p + 1).max(root));
                    out.truncate(cut);
                }
            }
            _ => out.push_str(segment),
        }
    }

    out.push_str(query);
    out
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decodes `%xx` triplets in place.
///
/// On error the buffer contents are unspecified and the request must be
/// rejected.
pub fn unescape_uri(uri: &mut Vec<u8>) -> Result<(), MalformedEscape> {
    let mut read = 0;
    let mut write = 0;

    while read < uri.len() {
        let c = uri[read];
        if c == b'%' {
            let hi = uri.get(read + 1).copied().and_then(hex_value);
            let lo = uri.get(read + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => uri[write] = hi << 4 | lo,
                _ => return Err(MalformedEscape { offset: read }),
            }
            read += 3;
        } else {
            uri[write] = c;
            read += 1;
        }
        write += 1;
    }

    uri.truncate(write);
    Ok(())
}

/// Writes every byte that [`needs_escape`] as `%XX`.
pub fn escape_string(input: &str) -> Cow<'_, str> {
    if !input.bytes().any(needs_escape) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() * 3);
    for c in input.bytes() {
        if needs_escape(c) {
            out.push('%');
            out.push(HEX_DIGITS[usize::from(c >> 4)] as char);
            out.push(HEX_DIGITS[usize::from(c & 15)] as char);
        } else {
            out.push(c as char);
        }
    }
    Cow::Owned(out)
}

/// Uppercases a header name and turns `-` into `_`, in place.
pub fn to_upper(name: &mut [u8]) {
    for b in name {
        *b = if *b == b'-' { b'_' } else { b.to_ascii_uppercase() };
    }
}

/// Formats `n` in decimal at the end of `buf` and returns the digits.
pub fn simple_itoa(mut n: u64, buf: &mut [u8; 20]) -> &[u8] {
    let mut p = buf.len();
    loop {
        p -= 1;
        buf[p] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    &buf[p..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itoa_edges() {
        let mut buf = [0u8; 20];
        assert_eq!(simple_itoa(0, &mut buf), b"0");
        assert_eq!(simple_itoa(1234, &mut buf), b"1234");
        assert_eq!(simple_itoa(u64::MAX, &mut buf), b"18446744073709551615");
    }

    #[test]
    fn escape_leaves_safe_text_borrowed() {
        assert!(matches!(escape_string("/docs/index.html"), Cow::Borrowed(_)));
        assert_eq!(escape_string("a b<c>"), "a%20b%3Cc%3E");
    }

    #[test]
    fn header_names_become_env_style() {
        let mut name = *b"Accept-Language";
        to_upper(&mut name);
        assert_eq!(&name, b"ACCEPT_LANGUAGE");
    }
}
