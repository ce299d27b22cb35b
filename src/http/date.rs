//! RFC 822 timestamps as used by HTTP/1.0.
//!
//! Formatting produces the fixed 29 byte form
//! `Www, dd Mmm yyyy hh:mm:ss GMT` by filling a buffer backwards from its
//! last byte with digits and table entries. There is no width negotiation
//! and no allocation, so the cost is the same for every timestamp.
//!
//! Parsing accepts the three forms HTTP/1.0 clients send:
//!
//! ```text
//! Sun, 06 Nov 1994 08:49:37 GMT    ; RFC 1123
//! Sunday, 06-Nov-94 08:49:37 GMT   ; RFC 1036
//! Sun Nov  6 08:49:37 1994         ; asctime()
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

/// Length of an RFC 822 (RFC 1123) date.
pub const RFC822_LEN: usize = 29;

/// Length of a bracketed common log timestamp including the trailing space.
pub const COMMONLOG_LEN: usize = 27;

const MONTH_TAB: &[u8; 48] = b"Jan Feb Mar Apr May Jun Jul Aug Sep Oct Nov Dec ";
const DAY_TAB: &[u8; 28] = b"Sun,Mon,Tue,Wed,Thu,Fri,Sat,";

/// Broken-down UTC time. `month` is 0-based, `weekday` has Sunday at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: u32,
}

impl CivilTime {
    /// Splits seconds since the epoch into calendar fields.
    pub fn from_unix(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);

        Self {
            year,
            month: month - 1,
            day,
            hour: (rem / 3600) as u32,
            minute: (rem % 3600 / 60) as u32,
            second: (rem % 60) as u32,
            // 1970-01-01 was a Thursday
            weekday: (days + 4).rem_euclid(7) as u32,
        }
    }
}

/// A date read from an `If-Modified-Since` style header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl HttpDate {
    /// Seconds since the epoch.
    pub fn to_unix(&self) -> i64 {
        days_from_civil(self.year, self.month + 1, self.day) * 86_400
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    fn is_plausible(&self) -> bool {
        (1..=31).contains(&self.day) && self.hour < 24 && self.minute < 60 && self.second <= 60
    }
}

/// Result of comparing a resource's modification time against a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiedSince {
    /// The resource is newer than the header date: send it.
    Modified,
    /// The resource is not newer: 304 is allowed.
    NotModified,
    /// The header could not be read. Callers serve the full resource.
    Unparseable,
}

/// Current time in seconds since the epoch.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

struct Backward<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Backward<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        let pos = buf.len();
        Self { buf, pos }
    }

    fn byte(&mut self, b: u8) {
        self.pos -= 1;
        self.buf[self.pos] = b;
    }

    fn bytes(&mut self, s: &[u8]) {
        self.pos -= s.len();
        self.buf[self.pos..self.pos + s.len()].copy_from_slice(s);
    }

    fn two_digits(&mut self, v: u32) {
        self.byte(b'0' + (v % 10) as u8);
        self.byte(b'0' + (v / 10 % 10) as u8);
    }

    fn four_digits(&mut self, v: i64) {
        let mut a = v.rem_euclid(10_000) as u32;
        for _ in 0..4 {
            self.byte(b'0' + (a % 10) as u8);
            a /= 10;
        }
    }
}

/// Writes `t` (0 meaning now) into `buf` as `Www, dd Mmm yyyy hh:mm:ss GMT`.
pub fn rfc822_time_buf(buf: &mut [u8; RFC822_LEN], t: i64) {
    let tm = CivilTime::from_unix(if t == 0 { now() } else { t });
    let month = tm.month as usize * 4;
    let weekday = tm.weekday as usize * 4;

    let mut p = Backward::new(buf);
    p.bytes(b" GMT");
    p.two_digits(tm.second);
    p.byte(b':');
    p.two_digits(tm.minute);
    p.byte(b':');
    p.two_digits(tm.hour);
    p.byte(b' ');
    p.four_digits(tm.year);
    p.bytes(&MONTH_TAB[month..month + 4]);
    p.byte(b' ');
    p.two_digits(tm.day);
    p.byte(b' ');
    p.bytes(&DAY_TAB[weekday..weekday + 4]);
    debug_assert_eq!(p.pos, 0);
}

/// Writes `t` (0 meaning now) as `[dd/Mmm/yyyy:hh:mm:ss GMT] `.
pub fn commonlog_time(buf: &mut [u8; COMMONLOG_LEN], t: i64) {
    let tm = CivilTime::from_unix(if t == 0 { now() } else { t });
    let month = tm.month as usize * 4;

    let mut p = Backward::new(buf);
    p.bytes(b" GMT] ");
    p.two_digits(tm.second);
    p.byte(b':');
    p.two_digits(tm.minute);
    p.byte(b':');
    p.two_digits(tm.hour);
    p.byte(b':');
    p.four_digits(tm.year);
    p.byte(b'/');
    p.bytes(&MONTH_TAB[month..month + 3]);
    p.byte(b'/');
    p.two_digits(tm.day);
    p.byte(b'[');
    debug_assert_eq!(p.pos, 0);
}

/// Turns a three letter month name into 0..=11.
///
/// Only the letters needed to tell the months apart are looked at: the
/// first one, the second for `Apr`/`Aug` and `Jan`, the third for
/// `Jun`/`Jul` and `Mar`/`May`.
pub fn month2int(name: &[u8]) -> Option<u32> {
    let second = name.get(1).copied();
    let third = name.get(2).copied();
    match *name.first()? {
        b'A' => Some(if second == Some(b'p') { 3 } else { 7 }),
        b'D' => Some(11),
        b'F' => Some(1),
        b'J' => {
            if second == Some(b'a') {
                Some(0)
            } else if third == Some(b'n') {
                Some(5)
            } else {
                Some(6)
            }
        }
        b'M' => Some(if third == Some(b'r') { 2 } else { 4 }),
        b'N' => Some(10),
        b'O' => Some(9),
        b'S' => Some(8),
        _ => None,
    }
}

/// Parses any of the three accepted date forms.
pub fn parse_http_date(s: &str) -> Option<HttpDate> {
    let body = skip_weekday(s.as_bytes());
    rfc1123(body)
        .or_else(|| rfc1036(body))
        .or_else(|| asctime(body))
        .filter(HttpDate::is_plausible)
}

/// Decides whether a resource modified at `mtime` is newer than `header`.
///
/// Fields are compared from the year down to the second and the first
/// unequal field decides.
pub fn modified_since(mtime: i64, header: &str) -> ModifiedSince {
    let Some(date) = parse_http_date(header) else {
        return ModifiedSince::Unparseable;
    };
    let file = CivilTime::from_unix(mtime);

    let file_fields = (file.year, file.month, file.day, file.hour, file.minute, file.second);
    let header_fields = (date.year, date.month, date.day, date.hour, date.minute, date.second);

    if file_fields > header_fields {
        ModifiedSince::Modified
    } else {
        ModifiedSince::NotModified
    }
}

fn skip_weekday(s: &[u8]) -> &[u8] {
    let s = trim_start(s);
    if !s.first().is_some_and(u8::is_ascii_alphabetic) {
        return s;
    }
    let end = s
        .iter()
        .position(|&b| b == b',' || b.is_ascii_whitespace())
        .unwrap_or(s.len());
    let rest = &s[end..];
    match rest.first() {
        Some(b',') => &rest[1..],
        // asctime: a weekday only when another word follows it
        Some(_) if trim_start(rest).first().is_some_and(u8::is_ascii_alphabetic) => rest,
        _ => s,
    }
}

fn trim_start(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &s[n..]
}

fn full_year(year: i64) -> i64 {
    match year {
        0..=69 => year + 2000,
        70..=99 => year + 1900,
        _ => year,
    }
}

// `%d %3s %d %d:%d:%d GMT`
fn rfc1123(s: &[u8]) -> Option<HttpDate> {
    let mut sc = Scanner::new(s);
    let day = sc.int()?;
    let month = month2int(sc.word3()?)?;
    let year = sc.int()?;
    let (hour, minute, second) = sc.clock()?;
    Some(HttpDate {
        year: full_year(year),
        month,
        day: u32::try_from(day).ok()?,
        hour,
        minute,
        second,
    })
}

// `%d-%3s-%d %d:%d:%d GMT`
fn rfc1036(s: &[u8]) -> Option<HttpDate> {
    let mut sc = Scanner::new(s);
    let day = sc.int()?;
    sc.lit(b'-')?;
    let month = month2int(sc.word3()?)?;
    sc.lit(b'-')?;
    let year = sc.int()?;
    let (hour, minute, second) = sc.clock()?;
    Some(HttpDate {
        year: full_year(year),
        month,
        day: u32::try_from(day).ok()?,
        hour,
        minute,
        second,
    })
}

// ` %3s %d %d:%d:%d %d`
fn asctime(s: &[u8]) -> Option<HttpDate> {
    let mut sc = Scanner::new(s);
    let month = month2int(sc.word3()?)?;
    let day = sc.int()?;
    let (hour, minute, second) = sc.clock()?;
    let year = sc.int()?;
    Some(HttpDate {
        year: full_year(year),
        month,
        day: u32::try_from(day).ok()?,
        hour,
        minute,
        second,
    })
}

/// Just enough of `sscanf` for the three date layouts.
struct Scanner<'a> {
    s: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a [u8]) -> Self {
        Self { s, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.s.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn int(&mut self) -> Option<i64> {
        self.skip_ws();
        let start = self.pos;
        let mut value: i64 = 0;
        while let Some(&b) = self.s.get(self.pos) {
            if !b.is_ascii_digit() || self.pos - start >= 9 {
                break;
            }
            value = value * 10 + i64::from(b - b'0');
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    fn word3(&mut self) -> Option<&'a [u8]> {
        self.skip_ws();
        let s = self.s;
        let start = self.pos;
        while self.pos - start < 3 && s.get(self.pos).is_some_and(|b| !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let end = self.pos;
        (end > start).then_some(&s[start..end])
    }

    fn lit(&mut self, c: u8) -> Option<()> {
        if self.s.get(self.pos) == Some(&c) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn clock(&mut self) -> Option<(u32, u32, u32)> {
        let hour = self.int()?;
        self.lit(b':')?;
        let minute = self.int()?;
        self.lit(b':')?;
        let second = self.int()?;
        Some((
            u32::try_from(hour).ok()?,
            u32::try_from(minute).ok()?,
            u32::try_from(second).ok()?,
        ))
    }
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (yoe + era * 400 + i64::from(month <= 2), month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
