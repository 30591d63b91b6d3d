//! Shared HTTP vocabulary: byte classification, status reason phrases,
//! well-known header names, and small text helpers.

// BYTE CLASSIFICATION
//
// Predicates shared by the request and response parsers. `is_special`
// covers the RFC 7230 separator set.

#[inline(always)]
pub(crate) const fn is_char(c: u8) -> bool {
    c <= 127
}

#[inline(always)]
pub(crate) const fn is_control(c: u8) -> bool {
    c <= 31 || c == 127
}

#[inline(always)]
pub(crate) const fn is_special(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\t'
    )
}

#[inline(always)]
pub(crate) const fn is_token_char(c: u8) -> bool {
    is_char(c) && !is_control(c) && !is_special(c)
}

#[inline(always)]
pub(crate) const fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

#[inline(always)]
pub(crate) const fn is_hex_digit(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

#[inline(always)]
pub(crate) const fn hex_value(c: u8) -> usize {
    match c {
        b'0'..=b'9' => (c - b'0') as usize,
        b'a'..=b'f' => (c - b'a' + 10) as usize,
        _ => (c - b'A' + 10) as usize,
    }
}

// HEADER NAMES

pub(crate) const HEADER_ALLOW: &str = "Allow";
pub(crate) const HEADER_AUTHORIZATION: &str = "Authorization";
pub(crate) const HEADER_CONNECTION: &str = "Connection";
pub(crate) const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub(crate) const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub(crate) const HEADER_COOKIE: &str = "Cookie";
pub(crate) const HEADER_LOCATION: &str = "Location";
pub(crate) const HEADER_SET_COOKIE: &str = "Set-Cookie";
pub(crate) const HEADER_TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub(crate) const HEADER_WWW_AUTHENTICATE: &str = "WWW-Authenticate";

pub(crate) const CONTENT_TYPE_HTML: &str = "text/html";

// STATUS CODES

pub(crate) const STATUS_OK: u16 = 200;
pub(crate) const STATUS_BAD_REQUEST: u16 = 400;
pub(crate) const STATUS_UNAUTHORIZED: u16 = 401;
pub(crate) const STATUS_FORBIDDEN: u16 = 403;
pub(crate) const STATUS_NOT_FOUND: u16 = 404;
pub(crate) const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
pub(crate) const STATUS_FOUND: u16 = 302;
pub(crate) const STATUS_SERVER_ERROR: u16 = 500;

/// Canonical reason phrase for a status code; `"Unknown"` when the code
/// has no registered phrase.
pub fn status_message(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

// TEXT HELPERS

/// Removes one trailing `/` from a resource, leaving the root alone.
pub(crate) fn strip_trailing_slash(resource: &str) -> &str {
    if resource.len() > 1 && resource.ends_with('/') {
        &resource[..resource.len() - 1]
    } else {
        resource
    }
}

/// Escapes text for inclusion in HTML/XML bodies.
pub(crate) fn xml_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_chars() {
        for c in [b'G', b'z', b'0', b'-', b'_', b'!', b'~'] {
            assert!(is_token_char(c), "{}", c as char);
        }
        for c in [b' ', b'\t', b':', b'/', b'?', b'(', 0x7f, 0x00, 200] {
            assert!(!is_token_char(c), "{c:#x}");
        }
    }

    #[test]
    fn hex_values() {
        #[rustfmt::skip]
        let cases = [
            (b'0', 0), (b'9', 9),
            (b'a', 10), (b'f', 15),
            (b'A', 10), (b'F', 15),
        ];
        for (c, v) in cases {
            assert!(is_hex_digit(c));
            assert_eq!(hex_value(c), v);
        }
        assert!(!is_hex_digit(b'g'));
    }

    #[test]
    fn trailing_slash() {
        #[rustfmt::skip]
        let cases = [
            ("/",        "/"),
            ("/a",       "/a"),
            ("/a/",      "/a"),
            ("/a/b/",    "/a/b"),
            ("/a//",     "/a/"),
            ("",         ""),
        ];
        for (input, expected) in cases {
            assert_eq!(strip_trailing_slash(input), expected);
        }
    }

    #[test]
    fn xml_escapes() {
        assert_eq!(
            xml_encode(r#"<a href="/x?a=1&b='2'">"#),
            "&lt;a href=&quot;/x?a=1&amp;b=&#39;2&#39;&quot;&gt;"
        );
        assert_eq!(xml_encode("/plain/path"), "/plain/path");
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(status_message(200), "OK");
        assert_eq!(status_message(404), "Not Found");
        assert_eq!(status_message(500), "Internal Server Error");
        assert_eq!(status_message(799), "Unknown");
    }
}
