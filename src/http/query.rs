//! Query-string and cookie-header parsing.
//!
//! Query pairs keep their arrival order and are matched case-sensitively;
//! `%xx` escapes and `+` are decoded. Cookie pairs come from `Cookie:`
//! header values, `;`-separated, with `$`-prefixed RFC 2109 attributes
//! skipped.

use percent_encoding::percent_decode_str;

/// Decodes one urlencoded component (`+` means space).
fn url_decode(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Parses a query string into ordered `(name, value)` pairs.
///
/// A leading `?` is tolerated. Pairs without `=` become `(name, "")`;
/// empty fragments between `&`s are dropped.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut pairs = Vec::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((name, value)) => pairs.push((url_decode(name), url_decode(value))),
            None => pairs.push((url_decode(part), String::new())),
        }
    }

    pairs
}

/// Parses one `Cookie:` header value into ordered `(name, value)` pairs.
pub fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for part in value.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = match part.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => (part, ""),
        };
        // RFC 2109 attributes describe the cookie, they are not cookies
        if name.starts_with('$') {
            continue;
        }
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        pairs.push((name.to_string(), value.to_string()));
    }

    pairs
}
