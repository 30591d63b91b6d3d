//! Typed HTTP message container shared by the request and response paths.

use crate::http::{query, types};
use std::{mem, net::IpAddr};

// MULTIMAP

/// Ordered multimap used for headers, cookies and query parameters.
///
/// Headers and cookies match keys case-insensitively, query parameters
/// exactly. Multi-value lookups preserve insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiMap {
    entries: Vec<(String, String)>,
    ignore_case: bool,
}

impl MultiMap {
    pub(crate) fn headers() -> Self {
        Self {
            entries: Vec::new(),
            ignore_case: true,
        }
    }

    pub(crate) fn exact() -> Self {
        Self {
            entries: Vec::new(),
            ignore_case: false,
        }
    }

    #[inline]
    fn key_matches(&self, stored: &str, key: &str) -> bool {
        if self.ignore_case {
            stored.eq_ignore_ascii_case(key)
        } else {
            stored == key
        }
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| self.key_matches(k, key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| self.key_matches(k, key))
            .map(|(_, v)| v.as_str())
    }

    /// Appends a value, keeping any existing ones.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replaces the first value for `key` and deletes the rest; inserts
    /// when the key is absent.
    pub fn change(&mut self, key: &str, value: impl Into<String>) {
        match self
            .entries
            .iter()
            .position(|(k, _)| self.key_matches(k, key))
        {
            Some(first) => {
                self.entries[first].1 = value.into();
                let mut i = first + 1;
                while i < self.entries.len() {
                    let matched = self.key_matches(&self.entries[i].0, key);
                    if matched {
                        self.entries.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.entries.push((key.to_string(), value.into())),
        }
    }

    /// Deletes every value for `key`.
    pub fn remove(&mut self, key: &str) {
        let ignore_case = self.ignore_case;
        self.entries.retain(|(k, _)| {
            if ignore_case {
                !k.eq_ignore_ascii_case(key)
            } else {
                k != key
            }
        });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// MESSAGE

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Request {
        method: String,
        resource: String,
        original_resource: String,
        query_string: String,
        params: MultiMap,
        user: Option<String>,
    },
    Response {
        status_code: u16,
        status_message: String,
        request_method: String,
    },
}

/// An HTTP request or response.
///
/// The first line is derived from the typed fields and rebuilt lazily
/// whenever one of them changes.
#[derive(Debug, Clone)]
pub struct Message {
    version_major: u16,
    version_minor: u16,
    headers: MultiMap,
    cookies: MultiMap,
    content: Vec<u8>,
    remote_ip: Option<IpAddr>,
    valid: bool,
    chunked: bool,
    chunks_supported: bool,
    suppress_content_length: bool,
    first_line: Option<String>,
    kind: Kind,
}

impl Message {
    fn new(kind: Kind) -> Self {
        Self {
            version_major: 1,
            version_minor: 1,
            headers: MultiMap::headers(),
            cookies: MultiMap::headers(),
            content: Vec::new(),
            remote_ip: None,
            valid: false,
            chunked: false,
            chunks_supported: false,
            suppress_content_length: false,
            first_line: None,
            kind,
        }
    }

    /// An empty HTTP request.
    pub fn request() -> Self {
        Self::new(Kind::Request {
            method: String::new(),
            resource: String::new(),
            original_resource: String::new(),
            query_string: String::new(),
            params: MultiMap::exact(),
            user: None,
        })
    }

    /// An empty HTTP response.
    pub fn response() -> Self {
        Self::new(Kind::Response {
            status_code: types::STATUS_OK,
            status_message: types::status_message(types::STATUS_OK).to_string(),
            request_method: String::new(),
        })
    }

    /// A response paired with `request`: inherits the version, remembers
    /// the request method (HEAD suppression), and marks chunking as
    /// supported for HTTP/1.1 peers.
    pub fn response_to(request: &Message) -> Self {
        let mut resp = Self::response();
        resp.version_major = request.version_major;
        resp.version_minor = request.version_minor;
        resp.chunks_supported =
            request.version_major > 1 || (request.version_major == 1 && request.version_minor >= 1);
        if let Kind::Response { request_method, .. } = &mut resp.kind {
            *request_method = request.method().to_string();
        }
        resp
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, Kind::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, Kind::Response { .. })
    }

    // VERSION

    pub fn version(&self) -> (u16, u16) {
        (self.version_major, self.version_minor)
    }

    pub fn set_version(&mut self, major: u16, minor: u16) {
        self.version_major = major;
        self.version_minor = minor;
        self.first_line = None;
    }

    // REQUEST FIELDS

    /// Request method; empty for responses.
    pub fn method(&self) -> &str {
        match &self.kind {
            Kind::Request { method, .. } => method,
            Kind::Response { .. } => "",
        }
    }

    pub fn set_method(&mut self, value: impl Into<String>) {
        if let Kind::Request { method, .. } = &mut self.kind {
            *method = value.into();
            self.first_line = None;
        }
    }

    /// Current resource URI-stem (after any redirects).
    pub fn resource(&self) -> &str {
        match &self.kind {
            Kind::Request { resource, .. } => resource,
            Kind::Response { .. } => "",
        }
    }

    /// Resource as originally requested, before redirects.
    pub fn original_resource(&self) -> &str {
        match &self.kind {
            Kind::Request {
                original_resource, ..
            } => original_resource,
            Kind::Response { .. } => "",
        }
    }

    /// Sets both the current and the original resource.
    pub fn set_resource(&mut self, value: impl Into<String>) {
        if let Kind::Request {
            resource,
            original_resource,
            ..
        } = &mut self.kind
        {
            *resource = value.into();
            *original_resource = resource.clone();
            self.first_line = None;
        }
    }

    /// Rewrites the current resource, preserving the original.
    pub fn change_resource(&mut self, value: impl Into<String>) {
        if let Kind::Request { resource, .. } = &mut self.kind {
            *resource = value.into();
            self.first_line = None;
        }
    }

    pub fn query_string(&self) -> &str {
        match &self.kind {
            Kind::Request { query_string, .. } => query_string,
            Kind::Response { .. } => "",
        }
    }

    /// Stores the raw query string and reparses the parameter map.
    pub fn set_query_string(&mut self, value: impl Into<String>) {
        if let Kind::Request {
            query_string,
            params,
            ..
        } = &mut self.kind
        {
            *query_string = value.into();
            params.clear();
            for (name, val) in query::parse_query(query_string) {
                params.add(name, val);
            }
            self.first_line = None;
        }
    }

    /// Parsed query parameters (empty for responses).
    pub fn params(&self) -> &MultiMap {
        match &self.kind {
            Kind::Request { params, .. } => params,
            Kind::Response { .. } => EMPTY_EXACT.get_or_init(MultiMap::exact),
        }
    }

    /// Authenticated-user handle set by an auth gate.
    pub fn user(&self) -> Option<&str> {
        match &self.kind {
            Kind::Request { user, .. } => user.as_deref(),
            Kind::Response { .. } => None,
        }
    }

    pub fn set_user(&mut self, value: Option<String>) {
        if let Kind::Request { user, .. } = &mut self.kind {
            *user = value;
        }
    }

    // RESPONSE FIELDS

    /// Response status code; `0` for requests.
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            Kind::Response { status_code, .. } => *status_code,
            Kind::Request { .. } => 0,
        }
    }

    pub fn set_status_code(&mut self, code: u16) {
        if let Kind::Response { status_code, .. } = &mut self.kind {
            *status_code = code;
            self.first_line = None;
        }
    }

    pub fn status_message(&self) -> &str {
        match &self.kind {
            Kind::Response { status_message, .. } => status_message,
            Kind::Request { .. } => "",
        }
    }

    pub fn set_status_message(&mut self, value: impl Into<String>) {
        if let Kind::Response { status_message, .. } = &mut self.kind {
            *status_message = value.into();
            self.first_line = None;
        }
    }

    /// Sets the status code together with its canonical reason phrase.
    pub fn set_status(&mut self, code: u16) {
        self.set_status_code(code);
        self.set_status_message(types::status_message(code));
    }

    /// Method of the request this response answers; empty for requests.
    pub fn request_method(&self) -> &str {
        match &self.kind {
            Kind::Response { request_method, .. } => request_method,
            Kind::Request { .. } => "",
        }
    }

    pub fn set_request_method(&mut self, value: impl Into<String>) {
        if let Kind::Response { request_method, .. } = &mut self.kind {
            *request_method = value.into();
        }
    }

    // HEADERS, COOKIES, CONTENT

    pub fn headers(&self) -> &MultiMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut MultiMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.add(name, value);
    }

    pub fn change_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.change(name, value);
    }

    pub fn cookies(&self) -> &MultiMap {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut MultiMap {
        &mut self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    pub fn take_content(&mut self) -> Vec<u8> {
        mem::take(&mut self.content)
    }

    /// Body length as the handler sees it; for chunked messages this is
    /// the reassembled buffer length.
    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    // FLAGS AND ANNOTATIONS

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn set_chunked(&mut self, chunked: bool) {
        self.chunked = chunked;
    }

    /// Whether the peer can accept a chunked response.
    pub fn chunks_supported(&self) -> bool {
        self.chunks_supported
    }

    pub fn set_chunks_supported(&mut self, supported: bool) {
        self.chunks_supported = supported;
    }

    /// Suppresses `Content-Length` emission on the wire.
    pub fn suppress_content_length(&self) -> bool {
        self.suppress_content_length
    }

    pub fn set_suppress_content_length(&mut self, suppress: bool) {
        self.suppress_content_length = suppress;
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    pub fn set_remote_ip(&mut self, ip: Option<IpAddr>) {
        self.remote_ip = ip;
    }

    // DERIVED

    /// First line of the message, rebuilt after any contributing field
    /// changed since the last call.
    pub fn first_line(&mut self) -> &str {
        if self.first_line.is_none() {
            self.first_line = Some(match &self.kind {
                Kind::Request {
                    method,
                    resource,
                    query_string,
                    ..
                } => {
                    if query_string.is_empty() {
                        format!(
                            "{method} {resource} HTTP/{}.{}",
                            self.version_major, self.version_minor
                        )
                    } else {
                        format!(
                            "{method} {resource}?{query_string} HTTP/{}.{}",
                            self.version_major, self.version_minor
                        )
                    }
                }
                Kind::Response {
                    status_code,
                    status_message,
                    ..
                } => format!(
                    "HTTP/{}.{} {status_code} {status_message}",
                    self.version_major, self.version_minor
                ),
            });
        }
        self.first_line.as_deref().unwrap()
    }

    /// Whether the body is implied empty regardless of headers: true for
    /// responses to HEAD, informational statuses, and 204/205/304.
    pub fn is_content_length_implied(&self) -> bool {
        match &self.kind {
            Kind::Request { .. } => false,
            Kind::Response {
                status_code,
                request_method,
                ..
            } => {
                request_method == "HEAD"
                    || (100..200).contains(status_code)
                    || matches!(status_code, 204 | 205 | 304)
            }
        }
    }

    /// Keep-alive decision: `Connection: close` always closes; HTTP/1.1
    /// otherwise stays open; HTTP/1.0 stays open only with an explicit
    /// `Connection: keep-alive`.
    pub fn should_keep_alive(&self) -> bool {
        let connection = self
            .headers
            .get(types::HEADER_CONNECTION)
            .map(str::to_ascii_lowercase);
        if let Some(value) = &connection {
            if value.split(',').any(|t| t.trim() == "close") {
                return false;
            }
        }
        if self.version_major > 1 || (self.version_major == 1 && self.version_minor >= 1) {
            return true;
        }
        matches!(&connection, Some(v) if v.split(',').any(|t| t.trim() == "keep-alive"))
    }

    /// Serializes the message monolithically: first line, headers with
    /// `Content-Length` fixed up per the invariants, blank line, body.
    pub fn wire_bytes(&mut self) -> Vec<u8> {
        if self.chunked {
            self.headers
                .change(types::HEADER_TRANSFER_ENCODING, "chunked");
            self.headers.remove(types::HEADER_CONTENT_LENGTH);
        } else if !self.suppress_content_length {
            self.headers
                .change(types::HEADER_CONTENT_LENGTH, self.content.len().to_string());
        }

        let mut out = Vec::with_capacity(self.content.len() + 256);
        out.extend_from_slice(self.first_line().as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        if !self.is_content_length_implied() {
            out.extend_from_slice(&self.content);
        }
        out
    }
}

static EMPTY_EXACT: std::sync::OnceLock<MultiMap> = std::sync::OnceLock::new();

#[cfg(test)]
mod multimap_tests {
    use super::*;

    #[test]
    fn case_insensitive_headers() {
        let mut map = MultiMap::headers();
        map.add("Content-Type", "text/html");

        assert_eq!(map.get("content-type"), Some("text/html"));
        assert_eq!(map.get("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(map.get("content-length"), None);
    }

    #[test]
    fn case_sensitive_queries() {
        let mut map = MultiMap::exact();
        map.add("Name", "a");

        assert_eq!(map.get("Name"), Some("a"));
        assert_eq!(map.get("name"), None);
    }

    #[test]
    fn multi_value_order() {
        let mut map = MultiMap::headers();
        map.add("Set-Cookie", "a=1");
        map.add("set-cookie", "b=2");
        map.add("SET-COOKIE", "c=3");

        let all: Vec<_> = map.get_all("set-cookie").collect();
        assert_eq!(all, ["a=1", "b=2", "c=3"]);
        assert_eq!(map.get("set-cookie"), Some("a=1"));
    }

    #[test]
    fn change_replaces_first_and_deletes_rest() {
        let mut map = MultiMap::headers();
        map.add("X-Tag", "one");
        map.add("Other", "keep");
        map.add("x-tag", "two");
        map.add("X-TAG", "three");

        map.change("x-tag", "only");

        let all: Vec<_> = map.get_all("x-tag").collect();
        assert_eq!(all, ["only"]);
        assert_eq!(map.get("other"), Some("keep"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn change_inserts_when_absent() {
        let mut map = MultiMap::headers();
        map.change("Connection", "close");
        assert_eq!(map.get("connection"), Some("close"));
    }

    #[test]
    fn remove_all_values() {
        let mut map = MultiMap::headers();
        map.add("A", "1");
        map.add("a", "2");
        map.add("B", "3");

        map.remove("a");
        assert!(!map.contains("A"));
        assert_eq!(map.len(), 1);
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn first_line_rebuilds_on_change() {
        let mut req = Message::request();
        req.set_method("GET");
        req.set_resource("/index");
        assert_eq!(req.first_line(), "GET /index HTTP/1.1");

        req.set_query_string("a=1&b=2");
        assert_eq!(req.first_line(), "GET /index?a=1&b=2 HTTP/1.1");

        req.change_resource("/other");
        req.set_version(1, 0);
        assert_eq!(req.first_line(), "GET /other?a=1&b=2 HTTP/1.0");
        assert_eq!(req.original_resource(), "/index");
    }

    #[test]
    fn response_first_line() {
        let mut resp = Message::response();
        resp.set_status(404);
        assert_eq!(resp.first_line(), "HTTP/1.1 404 Not Found");

        resp.set_status_code(500);
        resp.set_status_message("Custom Oops");
        assert_eq!(resp.first_line(), "HTTP/1.1 500 Custom Oops");
    }

    #[test]
    fn keep_alive_rules() {
        #[rustfmt::skip]
        let cases = [
            // version, connection header, expected
            ((1, 1), None,                     true),
            ((1, 1), Some("close"),            false),
            ((1, 1), Some("Close"),            false),
            ((1, 1), Some("keep-alive"),       true),
            ((1, 0), None,                     false),
            ((1, 0), Some("keep-alive"),       true),
            ((1, 0), Some("Keep-Alive"),       true),
            ((1, 0), Some("close"),            false),
        ];

        for ((major, minor), header, expected) in cases {
            let mut req = Message::request();
            req.set_version(major, minor);
            if let Some(value) = header {
                req.add_header("Connection", value);
            }
            assert_eq!(
                req.should_keep_alive(),
                expected,
                "HTTP/{major}.{minor} {header:?}"
            );
        }
    }

    #[test]
    fn implied_empty_bodies() {
        #[rustfmt::skip]
        let cases = [
            ("GET",  200, false),
            ("HEAD", 200, true),
            ("GET",  101, true),
            ("GET",  204, true),
            ("GET",  205, true),
            ("GET",  304, true),
            ("POST", 201, false),
        ];

        for (method, code, expected) in cases {
            let mut resp = Message::response();
            resp.set_request_method(method);
            resp.set_status(code);
            assert_eq!(resp.is_content_length_implied(), expected, "{method} {code}");
        }

        let req = Message::request();
        assert!(!req.is_content_length_implied());
    }

    #[test]
    fn response_to_inherits_request_shape() {
        let mut req = Message::request();
        req.set_method("HEAD");
        req.set_version(1, 0);

        let resp = Message::response_to(&req);
        assert_eq!(resp.version(), (1, 0));
        assert_eq!(resp.request_method(), "HEAD");
        assert!(!resp.chunks_supported());

        req.set_version(1, 1);
        assert!(Message::response_to(&req).chunks_supported());
    }

    #[test]
    fn wire_bytes_sets_content_length() {
        let mut resp = Message::response();
        resp.set_status(200);
        resp.set_content(b"hello".to_vec());

        let bytes = resp.wire_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn wire_bytes_chunked_drops_content_length() {
        let mut resp = Message::response();
        resp.set_status(200);
        resp.add_header("Content-Length", "999");
        resp.set_chunked(true);

        let text = String::from_utf8(resp.wire_bytes()).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.to_ascii_lowercase().contains("content-length"));
    }

    #[test]
    fn set_query_string_parses_params() {
        let mut req = Message::request();
        req.set_query_string("a=1&a=2&flag");

        assert_eq!(req.params().get("a"), Some("1"));
        let all: Vec<_> = req.params().get_all("a").collect();
        assert_eq!(all, ["1", "2"]);
        assert_eq!(req.params().get("flag"), Some(""));
    }
}
