use cinder::http::date::{
    self, COMMONLOG_LEN, HttpDate, ModifiedSince, RFC822_LEN, modified_since, parse_http_date,
};
use cinder::http::uri::{clean_pathname, escape_string, needs_escape, unescape_uri};

const SUNDAY_1994: HttpDate = HttpDate {
    year: 1994,
    month: 10,
    day: 6,
    hour: 8,
    minute: 49,
    second: 37,
};

#[test]
fn test_parse_all_three_date_forms() {
    for header in [
        "Sun, 06 Nov 1994 08:49:37 GMT",
        "Sunday, 06-Nov-94 08:49:37 GMT",
        "Sun Nov  6 08:49:37 1994",
    ] {
        assert_eq!(parse_http_date(header), Some(SUNDAY_1994), "{header}");
    }
}

#[test]
fn test_two_digit_years() {
    let date = parse_http_date("Saturday, 01-Jan-00 00:00:00 GMT").unwrap();
    assert_eq!(date.year, 2000);
    let date = parse_http_date("Thursday, 01-Jan-70 00:00:00 GMT").unwrap();
    assert_eq!(date.year, 1970);
}

#[test]
fn test_format_then_parse() {
    let mut buf = [0u8; RFC822_LEN];
    date::rfc822_time_buf(&mut buf, 784111777);
    let text = std::str::from_utf8(&buf).unwrap();
    assert_eq!(text, "Sun, 06 Nov 1994 08:49:37 GMT");
    assert_eq!(parse_http_date(text).unwrap().to_unix(), 784111777);
}

/// Rewrites an RFC 1123 date as its RFC 1036 and asctime equivalents.
fn other_forms(rfc1123: &str) -> [String; 2] {
    let fields: Vec<&str> = rfc1123.split([' ', ',']).filter(|f| !f.is_empty()).collect();
    let [wkday, day, month, year, time, _] = fields[..] else {
        panic!("unexpected date {rfc1123}");
    };
    let weekday = match wkday {
        "Mon" => "Monday",
        "Tue" => "Tuesday",
        "Wed" => "Wednesday",
        "Thu" => "Thursday",
        "Fri" => "Friday",
        "Sat" => "Saturday",
        _ => "Sunday",
    };
    let day: u32 = day.parse().unwrap();
    [
        format!("{weekday}, {day:02}-{month}-{} {time} GMT", &year[2..]),
        format!("{wkday} {month} {day:>2} {time} {year}"),
    ]
}

#[test]
fn test_every_date_form_round_trips() {
    let edges = [
        1,
        68_169_600,    // 1972-02-29
        951_782_400,   // 2000-02-29
        946_684_799,   // 1999-12-31 23:59:59
        946_684_800,   // 2000-01-01
        3_155_759_999, // 2069-12-31 23:59:59
    ];
    let sweep = (1..3_155_760_000i64).step_by(86_400 * 3 + 3_661);

    let mut buf = [0u8; RFC822_LEN];
    for t in edges.into_iter().chain(sweep) {
        date::rfc822_time_buf(&mut buf, t);
        let rfc1123 = std::str::from_utf8(&buf).unwrap().to_string();
        assert_eq!(parse_http_date(&rfc1123).map(|d| d.to_unix()), Some(t), "{rfc1123}");
        for text in other_forms(&rfc1123) {
            assert_eq!(parse_http_date(&text).map(|d| d.to_unix()), Some(t), "{text}");
        }
    }
}

#[test]
fn test_commonlog_format() {
    let mut buf = [0u8; COMMONLOG_LEN];
    date::commonlog_time(&mut buf, 888610804);
    assert_eq!(&buf, b"[27/Feb/1998:20:20:04 GMT] ");
}

#[test]
fn test_unparseable_dates() {
    for header in ["", "yesterday", "Sun, 06 Xyz 1994 08:49:37 GMT", "Sun, 32 Nov 1994 08:49:37 GMT"] {
        assert_eq!(parse_http_date(header), None, "{header}");
        assert_eq!(modified_since(0, header), ModifiedSince::Unparseable);
    }
}

#[test]
fn test_modified_since_comparison() {
    let header = "Sun, 06 Nov 1994 08:49:37 GMT";
    assert_eq!(modified_since(784111777, header), ModifiedSince::NotModified);
    assert_eq!(modified_since(784111776, header), ModifiedSince::NotModified);
    assert_eq!(modified_since(784111778, header), ModifiedSince::Modified);
    assert_eq!(modified_since(784111777 + 86_400 * 365, header), ModifiedSince::Modified);
}

#[test]
fn test_clean_pathname_cases() {
    let cases = [
        ("/", "/"),
        ("//a///b", "/a/b"),
        ("/a/./b/.", "/a/b/"),
        ("/a/b/../c", "/a/c"),
        ("/a/b/..", "/a/"),
        ("/a/../../etc/passwd", "/etc/passwd"),
        ("/../..", "/"),
        ("/dir/", "/dir/"),
        ("/a/../b?x=/../y", "/b?x=/../y"),
    ];
    for (input, expected) in cases {
        assert_eq!(clean_pathname(input), expected, "{input}");
    }
}

#[test]
fn test_clean_pathname_is_idempotent() {
    for input in ["/a//b/../c/./d/", "/../x/../../y", "/p/q/..?r=s"] {
        let once = clean_pathname(input);
        assert_eq!(clean_pathname(&once), once);
        assert!(!once.contains("/../") && !once.contains("//"));
    }
}

#[test]
fn test_unescape_decodes_in_place() {
    let mut uri = b"/a%20b/%7Euser/%2f".to_vec();
    unescape_uri(&mut uri).unwrap();
    assert_eq!(uri, b"/a b/~user//");
}

#[test]
fn test_unescape_rejects_malformed() {
    for (input, offset) in [("/%zz", 1), ("/ok/%4", 4), ("/%", 1), ("/a%g0", 2)] {
        let mut uri = input.as_bytes().to_vec();
        let err = unescape_uri(&mut uri).unwrap_err();
        assert_eq!(err.offset, offset, "{input}");
    }
}

#[test]
fn test_escape_then_unescape() {
    let original = "/my docs/\"quoted\" <tag> 100%";
    let escaped = escape_string(original);
    assert_eq!(escaped, "/my%20docs/%22quoted%22%20%3Ctag%3E%20100%25");

    let mut bytes = escaped.as_bytes().to_vec();
    unescape_uri(&mut bytes).unwrap();
    assert_eq!(bytes, original.as_bytes());
}

#[test]
fn test_escape_set() {
    for c in [b' ', b'"', b'#', b'%', b'\'', b'<', b'>', 0x7f, 0x80, b'\n'] {
        assert!(needs_escape(c), "{c:#x}");
    }
    for c in [b'a', b'Z', b'0', b'/', b'?', b'=', b'&', b'-', b'.', b'~'] {
        assert!(!needs_escape(c), "{c:#x}");
    }
}
