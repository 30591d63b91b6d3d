//! Incremental HTTP/1.x message parser.
//!
//! One `Parser` decodes one message. Bytes are fed through [`Parser::parse`];
//! the caller reads more from the transport on `NeedMore` and, once
//! `Complete`, asks [`Parser::bytes_consumed`] how much of the final slice
//! was used so leftover pipelined bytes can be handed back to the
//! connection. Transport EOF is reported through [`Parser::finish_eof`],
//! which either completes an until-EOF body or fails the parse.
//!
//! Line terminators are accepted as CRLF or lone LF in every state.

use crate::{
    errors::{Field, ParseError},
    http::{
        message::Message,
        query,
        types::{self, is_control, is_digit, is_hex_digit, is_token_char},
    },
    limits::ParserLimits,
};
use memchr::memchr2;
use std::mem;

/// Outcome of one `parse` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsing {
    /// The message is fully decoded; unconsumed bytes belong to the next
    /// message on the connection.
    Complete,
    /// More transport bytes are required.
    NeedMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    // request first line
    MethodStart,
    Method,
    UriStem,
    UriQuery,
    // HTTP-version, shared by both sides
    VersionH,
    VersionT1,
    VersionT2,
    VersionP,
    VersionSlash,
    MajorStart,
    Major,
    MinorStart,
    Minor,
    // response first line
    StatusCodeStart,
    StatusCode,
    StatusMessage,
    // line ends
    ExpectingNewline,
    ExpectingFinalNewline,
    // headers
    HeaderStart,
    HeaderWhitespace,
    HeaderName,
    SpaceBeforeValue,
    HeaderValue,
    // body
    Content,
    ContentUntilEof,
    ChunkSizeStart,
    ChunkSize,
    ChunkExtension,
    ChunkSizeNewline,
    ChunkData,
    ChunkDataCr,
    ChunkDataNewline,
    FinalChunkCr,
    FinalChunkNewline,
    Done,
}

/// Incremental parser for one HTTP message.
pub struct Parser {
    side: Side,
    state: State,
    limits: ParserLimits,

    // first-line and header scratch
    method: Vec<u8>,
    resource: Vec<u8>,
    query: Vec<u8>,
    header_name: Vec<u8>,
    header_value: Vec<u8>,
    status_message: Vec<u8>,
    status_code: u16,
    status_digits: usize,
    version_major: u16,
    version_minor: u16,

    // body bookkeeping
    content: Vec<u8>,
    content_remaining: usize,
    chunk_size: usize,
    chunk_digits: usize,
    chunk_read: usize,

    // counters
    total_read: u64,
    content_read: usize,
    consumed: usize,
}

impl Parser {
    /// Parser for an incoming request.
    pub fn request(limits: &ParserLimits) -> Self {
        Self::new(Side::Request, State::MethodStart, limits)
    }

    /// Parser for an incoming response.
    pub fn response(limits: &ParserLimits) -> Self {
        Self::new(Side::Response, State::VersionH, limits)
    }

    fn new(side: Side, state: State, limits: &ParserLimits) -> Self {
        Self {
            side,
            state,
            limits: limits.clone(),
            method: Vec::new(),
            resource: Vec::new(),
            query: Vec::new(),
            header_name: Vec::new(),
            header_value: Vec::new(),
            status_message: Vec::new(),
            status_code: 0,
            status_digits: 0,
            version_major: 0,
            version_minor: 0,
            content: Vec::new(),
            content_remaining: 0,
            chunk_size: 0,
            chunk_digits: 0,
            chunk_read: 0,
            total_read: 0,
            content_read: 0,
            consumed: 0,
        }
    }

    /// Rearms the parser for the next message on the same connection.
    pub fn reset(&mut self) {
        let limits = self.limits.clone();
        *self = Self::new(
            self.side,
            match self.side {
                Side::Request => State::MethodStart,
                Side::Response => State::VersionH,
            },
            &limits,
        );
    }

    /// Bytes of the last `parse` slice that were consumed. After
    /// `Complete`, anything beyond this index is pipelined input for the
    /// next message.
    pub fn bytes_consumed(&self) -> usize {
        self.consumed
    }

    /// Total bytes consumed over the lifetime of this parser.
    pub fn total_bytes_read(&self) -> u64 {
        self.total_read
    }

    /// Body bytes accumulated so far.
    pub fn content_bytes_read(&self) -> usize {
        self.content_read
    }

    /// Consumes as much of `data` as possible, updating `msg` in place.
    pub fn parse(&mut self, msg: &mut Message, data: &[u8]) -> Result<Parsing, ParseError> {
        let mut i = 0;

        while i < data.len() {
            match self.state {
                State::Done => break,

                State::Content => {
                    let take = self.content_remaining.min(data.len() - i);
                    self.append_content(&data[i..i + take])?;
                    self.content_remaining -= take;
                    i += take;
                    if self.content_remaining == 0 {
                        self.finalize(msg);
                    }
                }

                State::ContentUntilEof => {
                    self.append_content(&data[i..])?;
                    i = data.len();
                }

                State::ChunkData => {
                    let take = (self.chunk_size - self.chunk_read).min(data.len() - i);
                    self.append_content(&data[i..i + take])?;
                    self.chunk_read += take;
                    i += take;
                    if self.chunk_read == self.chunk_size {
                        self.state = State::ChunkDataCr;
                    }
                }

                State::HeaderValue => {
                    // bulk-copy up to the line terminator
                    let rest = &data[i..];
                    let span = memchr2(b'\r', b'\n', rest).unwrap_or(rest.len());
                    if span == 0 {
                        self.step(msg, data[i])?;
                        i += 1;
                        continue;
                    }
                    let chunk = &rest[..span];
                    if chunk.iter().any(|&c| c != b'\t' && is_control(c)) {
                        return Err(ParseError::Malformed);
                    }
                    if self.header_value.len() + span > self.limits.max_header_value {
                        return Err(ParseError::TooLarge(Field::HeaderValue));
                    }
                    self.header_value.extend_from_slice(chunk);
                    i += span;
                }

                _ => {
                    self.step(msg, data[i])?;
                    i += 1;
                }
            }
        }

        self.consumed = i;
        self.total_read += i as u64;

        Ok(if self.state == State::Done {
            Parsing::Complete
        } else {
            Parsing::NeedMore
        })
    }

    /// Signals transport EOF. Completes an until-EOF body; anything else
    /// mid-message is a premature close.
    pub fn finish_eof(&mut self, msg: &mut Message) -> Result<Parsing, ParseError> {
        match self.state {
            State::Done => Ok(Parsing::Complete),
            State::ContentUntilEof => {
                self.finalize(msg);
                Ok(Parsing::Complete)
            }
            _ => Err(ParseError::PrematureEof),
        }
    }

    // STATE STEPPING

    fn step(&mut self, msg: &mut Message, c: u8) -> Result<(), ParseError> {
        match self.state {
            State::MethodStart => match c {
                // tolerate blank lines between pipelined requests
                b'\r' | b'\n' => Ok(()),
                c if is_token_char(c) => {
                    self.method.push(c);
                    self.state = State::Method;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::Method => match c {
                b' ' => {
                    self.state = State::UriStem;
                    Ok(())
                }
                c if is_token_char(c) => {
                    // an over-long method is rejected like an invalid one
                    if self.method.len() == self.limits.max_method {
                        return Err(ParseError::Malformed);
                    }
                    self.method.push(c);
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::UriStem => match c {
                b' ' => {
                    self.state = State::VersionH;
                    Ok(())
                }
                b'?' => {
                    self.state = State::UriQuery;
                    Ok(())
                }
                b'\r' | b'\n' => Err(ParseError::Malformed),
                c if is_control(c) => Err(ParseError::Malformed),
                c => {
                    if self.resource.len() == self.limits.max_uri {
                        return Err(ParseError::TooLarge(Field::Uri));
                    }
                    self.resource.push(c);
                    Ok(())
                }
            },

            State::UriQuery => match c {
                b' ' => {
                    self.state = State::VersionH;
                    Ok(())
                }
                b'\r' | b'\n' => Err(ParseError::Malformed),
                c if is_control(c) => Err(ParseError::Malformed),
                c => {
                    if self.query.len() == self.limits.max_query {
                        return Err(ParseError::TooLarge(Field::Query));
                    }
                    self.query.push(c);
                    Ok(())
                }
            },

            State::VersionH => self.expect(c, b'H', State::VersionT1),
            State::VersionT1 => self.expect(c, b'T', State::VersionT2),
            State::VersionT2 => self.expect(c, b'T', State::VersionP),
            State::VersionP => self.expect(c, b'P', State::VersionSlash),
            State::VersionSlash => self.expect(c, b'/', State::MajorStart),

            State::MajorStart => match c {
                c if is_digit(c) => {
                    self.version_major = (c - b'0') as u16;
                    self.state = State::Major;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::Major => match c {
                c if is_digit(c) => {
                    self.version_major = self.version_major * 10 + (c - b'0') as u16;
                    Ok(())
                }
                b'.' => {
                    self.state = State::MinorStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::MinorStart => match c {
                c if is_digit(c) => {
                    self.version_minor = (c - b'0') as u16;
                    self.state = State::Minor;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::Minor => match (self.side, c) {
                (_, c) if is_digit(c) => {
                    self.version_minor = self.version_minor * 10 + (c - b'0') as u16;
                    Ok(())
                }
                (Side::Request, b'\r') => {
                    self.flush_request_line(msg)?;
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                (Side::Request, b'\n') => {
                    self.flush_request_line(msg)?;
                    self.state = State::HeaderStart;
                    Ok(())
                }
                (Side::Response, b' ') => {
                    self.state = State::StatusCodeStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::StatusCodeStart => match c {
                c if is_digit(c) => {
                    self.status_code = (c - b'0') as u16;
                    self.status_digits = 1;
                    self.state = State::StatusCode;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::StatusCode => match c {
                c if is_digit(c) => {
                    if self.status_digits == 3 {
                        return Err(ParseError::Malformed);
                    }
                    self.status_code = self.status_code * 10 + (c - b'0') as u16;
                    self.status_digits += 1;
                    Ok(())
                }
                b' ' if self.status_digits == 3 => {
                    self.state = State::StatusMessage;
                    Ok(())
                }
                b'\r' if self.status_digits == 3 => {
                    self.flush_status_line(msg)?;
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                b'\n' if self.status_digits == 3 => {
                    self.flush_status_line(msg)?;
                    self.state = State::HeaderStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::StatusMessage => match c {
                b'\r' => {
                    self.flush_status_line(msg)?;
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                b'\n' => {
                    self.flush_status_line(msg)?;
                    self.state = State::HeaderStart;
                    Ok(())
                }
                c if c != b'\t' && is_control(c) => Err(ParseError::Malformed),
                c => {
                    self.status_message.push(c);
                    Ok(())
                }
            },

            State::ExpectingNewline => match c {
                b'\n' => {
                    self.state = State::HeaderStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::HeaderStart => match c {
                b'\r' => {
                    self.commit_header(msg)?;
                    self.state = State::ExpectingFinalNewline;
                    Ok(())
                }
                b'\n' => {
                    self.commit_header(msg)?;
                    self.begin_body(msg)
                }
                b' ' | b'\t' => {
                    // LWS folding joins into the preceding value
                    if self.header_name.is_empty() {
                        return Err(ParseError::Malformed);
                    }
                    self.state = State::HeaderWhitespace;
                    Ok(())
                }
                c if is_token_char(c) => {
                    self.commit_header(msg)?;
                    self.header_name.push(c);
                    self.state = State::HeaderName;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::HeaderWhitespace => match c {
                b' ' | b'\t' => Ok(()),
                b'\r' => {
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                b'\n' => {
                    self.state = State::HeaderStart;
                    Ok(())
                }
                c if is_control(c) => Err(ParseError::Malformed),
                c => {
                    if self.header_value.len() + 2 > self.limits.max_header_value {
                        return Err(ParseError::TooLarge(Field::HeaderValue));
                    }
                    self.header_value.push(b' ');
                    self.header_value.push(c);
                    self.state = State::HeaderValue;
                    Ok(())
                }
            },

            State::HeaderName => match c {
                b':' => {
                    self.state = State::SpaceBeforeValue;
                    Ok(())
                }
                c if is_token_char(c) => {
                    if self.header_name.len() == self.limits.max_header_name {
                        return Err(ParseError::TooLarge(Field::HeaderName));
                    }
                    self.header_name.push(c);
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::SpaceBeforeValue => match c {
                b' ' | b'\t' => Ok(()),
                b'\r' => {
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                b'\n' => {
                    self.state = State::HeaderStart;
                    Ok(())
                }
                c if is_control(c) => Err(ParseError::Malformed),
                c => {
                    self.header_value.push(c);
                    self.state = State::HeaderValue;
                    Ok(())
                }
            },

            State::HeaderValue => match c {
                b'\r' => {
                    self.state = State::ExpectingNewline;
                    Ok(())
                }
                b'\n' => {
                    self.state = State::HeaderStart;
                    Ok(())
                }
                b'\t' => {
                    self.push_header_value(b'\t')
                }
                c if is_control(c) => Err(ParseError::Malformed),
                c => self.push_header_value(c),
            },

            State::ExpectingFinalNewline => match c {
                b'\n' => self.begin_body(msg),
                _ => Err(ParseError::Malformed),
            },

            State::ChunkSizeStart => match c {
                c if is_hex_digit(c) => {
                    self.chunk_size = types::hex_value(c);
                    self.chunk_digits = 1;
                    self.state = State::ChunkSize;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::ChunkSize => match c {
                c if is_hex_digit(c) => {
                    if self.chunk_digits == self.limits.max_chunk_digits {
                        return Err(ParseError::TooLarge(Field::ChunkSize));
                    }
                    self.chunk_size = self.chunk_size * 16 + types::hex_value(c);
                    self.chunk_digits += 1;
                    Ok(())
                }
                b';' => {
                    self.state = State::ChunkExtension;
                    Ok(())
                }
                b'\r' => {
                    self.state = State::ChunkSizeNewline;
                    Ok(())
                }
                b'\n' => self.after_chunk_size(),
                _ => Err(ParseError::Malformed),
            },

            State::ChunkExtension => match c {
                b'\r' => {
                    self.state = State::ChunkSizeNewline;
                    Ok(())
                }
                b'\n' => self.after_chunk_size(),
                _ => Ok(()),
            },

            State::ChunkSizeNewline => match c {
                b'\n' => self.after_chunk_size(),
                _ => Err(ParseError::Malformed),
            },

            State::ChunkDataCr => match c {
                b'\r' => {
                    self.state = State::ChunkDataNewline;
                    Ok(())
                }
                b'\n' => {
                    self.state = State::ChunkSizeStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::ChunkDataNewline => match c {
                b'\n' => {
                    self.state = State::ChunkSizeStart;
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::FinalChunkCr => match c {
                b'\r' => {
                    self.state = State::FinalChunkNewline;
                    Ok(())
                }
                b'\n' => {
                    self.finalize(msg);
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            State::FinalChunkNewline => match c {
                b'\n' => {
                    self.finalize(msg);
                    Ok(())
                }
                _ => Err(ParseError::Malformed),
            },

            // bulk states are handled in `parse`
            State::Content | State::ContentUntilEof | State::ChunkData | State::Done => {
                unreachable!("bulk state stepped byte-wise")
            }
        }
    }

    #[inline]
    fn expect(&mut self, c: u8, want: u8, next: State) -> Result<(), ParseError> {
        if c == want {
            self.state = next;
            Ok(())
        } else {
            Err(ParseError::Malformed)
        }
    }

    #[inline]
    fn push_header_value(&mut self, c: u8) -> Result<(), ParseError> {
        if self.header_value.len() == self.limits.max_header_value {
            return Err(ParseError::TooLarge(Field::HeaderValue));
        }
        self.header_value.push(c);
        Ok(())
    }

    // TRANSIT HELPERS

    fn flush_request_line(&mut self, msg: &mut Message) -> Result<(), ParseError> {
        if self.method.is_empty() || self.resource.is_empty() {
            return Err(ParseError::Malformed);
        }
        let method = utf8(&self.method)?.to_string();
        let resource = utf8(&self.resource)?.to_string();
        let query = utf8(&self.query)?.to_string();

        msg.set_version(self.version_major, self.version_minor);
        msg.set_method(method);
        msg.set_resource(resource);
        msg.set_query_string(query);
        Ok(())
    }

    fn flush_status_line(&mut self, msg: &mut Message) -> Result<(), ParseError> {
        let message = utf8(&self.status_message)?.to_string();
        msg.set_version(self.version_major, self.version_minor);
        msg.set_status_code(self.status_code);
        msg.set_status_message(message);
        Ok(())
    }

    fn commit_header(&mut self, msg: &mut Message) -> Result<(), ParseError> {
        if self.header_name.is_empty() {
            return Ok(());
        }
        let name = utf8(&self.header_name)?.to_string();
        let value = utf8(&self.header_value)?.to_string();
        self.header_name.clear();
        self.header_value.clear();

        if name.eq_ignore_ascii_case(types::HEADER_COOKIE) {
            for (n, v) in query::parse_cookie_header(&value) {
                msg.cookies_mut().add(n, v);
            }
        }
        msg.headers_mut().add(name, value);
        Ok(())
    }

    /// Picks the body mode once the header block is complete.
    fn begin_body(&mut self, msg: &mut Message) -> Result<(), ParseError> {
        if let Some(te) = msg.header(types::HEADER_TRANSFER_ENCODING) {
            let chunked = te
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("chunked"));
            if !chunked {
                return Err(ParseError::UnsupportedTransferEncoding);
            }
            msg.set_chunked(true);
            self.state = State::ChunkSizeStart;
            return Ok(());
        }

        if let Some(cl) = msg.header(types::HEADER_CONTENT_LENGTH) {
            let length: usize = cl.trim().parse().map_err(|_| ParseError::Malformed)?;
            if length > self.limits.max_content_length {
                return Err(ParseError::TooLarge(Field::Body));
            }
            if length == 0 {
                self.finalize(msg);
            } else {
                self.content.reserve(length);
                self.content_remaining = length;
                self.state = State::Content;
            }
            return Ok(());
        }

        if self.side == Side::Response && !msg.is_content_length_implied() {
            self.state = State::ContentUntilEof;
        } else {
            self.finalize(msg);
        }
        Ok(())
    }

    fn after_chunk_size(&mut self) -> Result<(), ParseError> {
        if self.chunk_size == 0 {
            self.state = State::FinalChunkCr;
        } else {
            if self.content.len() + self.chunk_size > self.limits.max_content_length {
                return Err(ParseError::TooLarge(Field::Body));
            }
            self.chunk_read = 0;
            self.state = State::ChunkData;
        }
        Ok(())
    }

    fn append_content(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        if self.content.len() + bytes.len() > self.limits.max_content_length {
            return Err(ParseError::TooLarge(Field::Body));
        }
        self.content.extend_from_slice(bytes);
        self.content_read += bytes.len();
        Ok(())
    }

    fn finalize(&mut self, msg: &mut Message) {
        msg.set_content(mem::take(&mut self.content));
        msg.set_valid(true);
        self.state = State::Done;
    }
}

#[inline]
fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| ParseError::Malformed)
}

#[cfg(test)]
mod request_tests {
    use super::*;

    fn parse_ok(input: &[u8]) -> Message {
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();
        assert_eq!(parser.parse(&mut msg, input), Ok(Parsing::Complete));
        msg
    }

    fn parse_err(input: &[u8]) -> ParseError {
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();
        parser.parse(&mut msg, input).unwrap_err()
    }

    #[test]
    fn minimal_get() {
        let msg = parse_ok(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

        assert_eq!(msg.method(), "GET");
        assert_eq!(msg.resource(), "/");
        assert_eq!(msg.version(), (1, 1));
        assert_eq!(msg.header("host"), Some("x"));
        assert!(msg.content().is_empty());
        assert!(msg.is_valid());
        assert!(!msg.is_chunked());
    }

    #[test]
    fn valid_requests() {
        #[rustfmt::skip]
        let cases: &[(&[u8], &str, &str, &str, (u16, u16))] = &[
            (b"GET / HTTP/1.1\r\n\r\n",                    "GET",    "/",        "",       (1, 1)),
            (b"GET / HTTP/1.0\r\n\r\n",                    "GET",    "/",        "",       (1, 0)),
            (b"GET / HTTP/1.1\n\n",                        "GET",    "/",        "",       (1, 1)),
            (b"POST /up HTTP/1.1\nHost: h\n\n",            "POST",   "/up",      "",       (1, 1)),
            (b"OPTIONS /a/b HTTP/1.1\r\n\r\n",             "OPTIONS", "/a/b",    "",       (1, 1)),
            (b"GET /q?a=1&b=2 HTTP/1.1\r\n\r\n",           "GET",    "/q",       "a=1&b=2", (1, 1)),
            (b"GET /x? HTTP/1.1\r\n\r\n",                  "GET",    "/x",       "",       (1, 1)),
            (b"DELETE /it HTTP/1.2\r\n\r\n",               "DELETE", "/it",      "",       (1, 2)),
        ];

        for (input, method, resource, query, version) in cases {
            let msg = parse_ok(input);
            assert_eq!(msg.method(), *method);
            assert_eq!(msg.resource(), *resource);
            assert_eq!(msg.query_string(), *query);
            assert_eq!(msg.version(), *version);
        }
    }

    #[test]
    fn invalid_requests() {
        #[rustfmt::skip]
        let cases: &[&[u8]] = &[
            b"GET\r\n\r\n",
            b" GET / HTTP/1.1\r\n\r\n",
            b"GET  HTTP/1.1\r\n\r\n",
            b"GET / XTTP/1.1\r\n\r\n",
            b"GET / HTTP/x.1\r\n\r\n",
            b"GET / HTTP/1.\r\n\r\n",
            b"GET / HTTP/1.1 \r\n\r\n",
            b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n",
            b"GET / HTTP/1.1\r\n: novalue\r\n\r\n",
            b"GET / HTTP/1.1\rX",
            b"G\x01T / HTTP/1.1\r\n\r\n",
        ];

        for input in cases {
            assert_eq!(
                parse_err(input),
                ParseError::Malformed,
                "{:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn header_normalization() {
        let msg = parse_ok(b"GET / HTTP/1.1\r\nX-One:  padded  \r\nX-Two:\r\nX-Three: v\r\n\r\n");

        // leading whitespace is stripped, trailing kept
        assert_eq!(msg.header("x-one"), Some("padded  "));
        assert_eq!(msg.header("X-TWO"), Some(""));
        assert_eq!(msg.header("x-three"), Some("v"));
    }

    #[test]
    fn folded_header_joins_with_single_space() {
        let msg = parse_ok(b"GET / HTTP/1.1\r\nX-Fold: first\r\n   second\r\n\tthird\r\n\r\n");
        assert_eq!(msg.header("x-fold"), Some("first second third"));
    }

    #[test]
    fn duplicate_headers_preserve_order() {
        let msg = parse_ok(b"GET / HTTP/1.1\r\nA: 1\r\nB: x\r\nA: 2\r\n\r\n");
        let values: Vec<_> = msg.headers().get_all("a").collect();
        assert_eq!(values, ["1", "2"]);
    }

    #[test]
    fn cookies_are_extracted() {
        let msg = parse_ok(b"GET / HTTP/1.1\r\nCookie: sid=abc; theme=dark\r\n\r\n");
        assert_eq!(msg.cookie("sid"), Some("abc"));
        assert_eq!(msg.cookie("theme"), Some("dark"));
        assert!(msg.header("cookie").is_some());
    }

    #[test]
    fn body_by_content_length() {
        let msg = parse_ok(b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(msg.content(), b"hello");
        assert_eq!(msg.content_length(), 5);
    }

    #[test]
    fn body_zero_length() {
        let msg = parse_ok(b"POST /u HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert!(msg.content().is_empty());
    }

    #[test]
    fn chunked_request_body() {
        // two chunks, sizes in hex, terminated by the zero chunk
        let msg = parse_ok(
            b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              A\r\nabcdefghij\r\n5\r\nklmno\r\n0\r\n\r\n",
        );

        assert_eq!(msg.content(), b"abcdefghijklmno");
        assert_eq!(msg.content_length(), 15);
        assert!(msg.is_chunked());
        assert_eq!(msg.header("content-length"), None);
    }

    #[test]
    fn chunk_extensions_are_ignored() {
        let msg = parse_ok(
            b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5;ext=1\r\nhello\r\n0\r\n\r\n",
        );
        assert_eq!(msg.content(), b"hello");
    }

    #[test]
    fn unsupported_transfer_encoding() {
        assert_eq!(
            parse_err(b"POST /u HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n"),
            ParseError::UnsupportedTransferEncoding
        );
    }

    #[test]
    fn token_caps() {
        let limits = ParserLimits::default();

        // an over-long method is malformed, not a size failure
        assert_eq!(
            parse_err(&format!("{} / HTTP/1.1\r\n\r\n", "M".repeat(limits.max_method + 1)).into_bytes()),
            ParseError::Malformed
        );

        #[rustfmt::skip]
        let cases: &[(Vec<u8>, Field)] = &[
            (format!("GET /{} HTTP/1.1\r\n\r\n", "u".repeat(limits.max_uri)).into_bytes(), Field::Uri),
            (format!("GET /?{} HTTP/1.1\r\n\r\n", "q".repeat(limits.max_query + 1)).into_bytes(), Field::Query),
            (format!("GET / HTTP/1.1\r\n{}: v\r\n\r\n", "N".repeat(limits.max_header_name + 1)).into_bytes(), Field::HeaderName),
            (format!("GET / HTTP/1.1\r\nN: {}\r\n\r\n", "v".repeat(limits.max_header_value + 1)).into_bytes(), Field::HeaderValue),
            (b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n123456789\r\n".to_vec(), Field::ChunkSize),
        ];

        for (input, field) in cases {
            assert_eq!(parse_err(input), ParseError::TooLarge(*field), "{field:?}");
        }
    }

    #[test]
    fn body_cap_fails_before_reading_past_limit() {
        let limits = ParserLimits {
            max_content_length: 8,
            ..ParserLimits::default()
        };
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();

        // declared length is limit + 1; the headers alone must fail it
        let err = parser
            .parse(&mut msg, b"POST /u HTTP/1.1\r\nContent-Length: 9\r\n\r\n")
            .unwrap_err();
        assert_eq!(err, ParseError::TooLarge(Field::Body));
        assert_eq!(parser.content_bytes_read(), 0);
    }

    #[test]
    fn chunked_body_respects_content_cap() {
        let limits = ParserLimits {
            max_content_length: 4,
            ..ParserLimits::default()
        };
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();

        let err = parser
            .parse(
                &mut msg,
                b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
            )
            .unwrap_err();
        assert_eq!(err, ParseError::TooLarge(Field::Body));
    }

    #[test]
    fn need_more_then_complete() {
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();

        assert_eq!(
            parser.parse(&mut msg, b"GET / HT"),
            Ok(Parsing::NeedMore)
        );
        assert_eq!(
            parser.parse(&mut msg, b"TP/1.1\r\nHost: x"),
            Ok(Parsing::NeedMore)
        );
        assert_eq!(
            parser.parse(&mut msg, b"\r\n\r\n"),
            Ok(Parsing::Complete)
        );
        assert_eq!(msg.header("host"), Some("x"));
    }

    #[test]
    fn pipelined_leftover_is_not_consumed() {
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();

        let first = b"GET /a HTTP/1.1\r\n\r\n";
        let mut wire = first.to_vec();
        wire.extend_from_slice(b"GET /b HTTP/1.1\r\n\r\n");

        assert_eq!(parser.parse(&mut msg, &wire), Ok(Parsing::Complete));
        assert_eq!(parser.bytes_consumed(), first.len());
        assert_eq!(msg.resource(), "/a");

        // the leftover parses as the next request
        let mut second = Message::request();
        parser.reset();
        assert_eq!(
            parser.parse(&mut second, &wire[first.len()..]),
            Ok(Parsing::Complete)
        );
        assert_eq!(second.resource(), "/b");
    }

    #[test]
    fn premature_eof_mid_body() {
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut msg = Message::request();

        assert_eq!(
            parser.parse(&mut msg, b"POST /u HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort"),
            Ok(Parsing::NeedMore)
        );
        assert_eq!(parser.finish_eof(&mut msg), Err(ParseError::PrematureEof));
    }

    #[test]
    fn chunking_invariance() {
        // parsing must not depend on where the byte stream is split
        let wire: &[u8] = b"POST /r?x=1 HTTP/1.1\r\nHost: example\r\nX-Fold: a\r\n b\r\n\
                            Transfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n10\r\n0123456789abcdef\r\n0\r\n\r\n";
        let limits = ParserLimits::default();

        let reference = {
            let mut parser = Parser::request(&limits);
            let mut msg = Message::request();
            assert_eq!(parser.parse(&mut msg, wire), Ok(Parsing::Complete));
            msg
        };

        for split in 1..wire.len() {
            let mut parser = Parser::request(&limits);
            let mut msg = Message::request();
            let first = parser.parse(&mut msg, &wire[..split]).unwrap();
            if first == Parsing::NeedMore {
                assert_eq!(
                    parser.parse(&mut msg, &wire[split..]),
                    Ok(Parsing::Complete),
                    "split at {split}"
                );
            }

            assert_eq!(msg.method(), reference.method(), "split at {split}");
            assert_eq!(msg.resource(), reference.resource());
            assert_eq!(msg.query_string(), reference.query_string());
            assert_eq!(msg.headers(), reference.headers(), "split at {split}");
            assert_eq!(msg.content(), reference.content(), "split at {split}");
        }
    }

    #[test]
    fn round_trip() {
        let mut msg = parse_ok(b"POST /echo?k=v HTTP/1.1\r\nHost: h\r\nX-A: 1\r\n\r\n");
        msg.set_content(b"payload".to_vec());

        let wire = msg.wire_bytes();
        let limits = ParserLimits::default();
        let mut parser = Parser::request(&limits);
        let mut again = Message::request();
        assert_eq!(parser.parse(&mut again, &wire), Ok(Parsing::Complete));

        assert_eq!(again.method(), msg.method());
        assert_eq!(again.resource(), msg.resource());
        assert_eq!(again.query_string(), msg.query_string());
        assert_eq!(again.header("host"), msg.header("host"));
        assert_eq!(again.header("x-a"), msg.header("x-a"));
        assert_eq!(again.content(), msg.content());
    }

    #[test]
    fn leading_blank_lines_are_skipped() {
        let msg = parse_ok(b"\r\n\r\nGET / HTTP/1.1\r\n\r\n");
        assert_eq!(msg.method(), "GET");
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;

    fn response_parser() -> (Parser, Message) {
        (
            Parser::response(&ParserLimits::default()),
            Message::response(),
        )
    }

    #[test]
    fn status_lines() {
        #[rustfmt::skip]
        let cases: &[(&[u8], u16, &str)] = &[
            (b"HTTP/1.1 200 OK\r\n\r\n",              200, "OK"),
            (b"HTTP/1.1 404 Not Found\r\n\r\n",       404, "Not Found"),
            (b"HTTP/1.0 204\r\n\r\n",                 204, ""),
            (b"HTTP/1.1 500 Any old text\n\n",        500, "Any old text"),
        ];

        for (input, code, message) in cases {
            let (mut parser, mut msg) = response_parser();
            // bodies without a declared length run until EOF
            if parser.parse(&mut msg, input).unwrap() == Parsing::NeedMore {
                assert_eq!(parser.finish_eof(&mut msg), Ok(Parsing::Complete));
            }
            assert_eq!(msg.status_code(), *code);
            assert_eq!(msg.status_message(), *message);
        }
    }

    #[test]
    fn bad_status_lines() {
        #[rustfmt::skip]
        let cases: &[&[u8]] = &[
            b"HTTP/1.1 20 OK\r\n\r\n",
            b"HTTP/1.1 2000 OK\r\n\r\n",
            b"HTTP/1.1 abc OK\r\n\r\n",
            b"HTTP/1.1\r\n\r\n",
        ];

        for input in cases {
            let (mut parser, mut msg) = response_parser();
            assert_eq!(
                parser.parse(&mut msg, input).unwrap_err(),
                ParseError::Malformed
            );
        }
    }

    #[test]
    fn response_body_by_length() {
        let (mut parser, mut msg) = response_parser();
        assert_eq!(
            parser.parse(&mut msg, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"),
            Ok(Parsing::Complete)
        );
        assert_eq!(msg.content(), b"ok");
    }

    #[test]
    fn response_body_until_eof() {
        let (mut parser, mut msg) = response_parser();
        assert_eq!(
            parser.parse(&mut msg, b"HTTP/1.1 200 OK\r\n\r\npart one, "),
            Ok(Parsing::NeedMore)
        );
        assert_eq!(
            parser.parse(&mut msg, b"part two"),
            Ok(Parsing::NeedMore)
        );
        assert_eq!(parser.finish_eof(&mut msg), Ok(Parsing::Complete));
        assert_eq!(msg.content(), b"part one, part two");
    }

    #[test]
    fn implied_empty_body_completes_at_headers() {
        // a 304 has no body even without Content-Length
        let (mut parser, mut msg) = response_parser();
        assert_eq!(
            parser.parse(&mut msg, b"HTTP/1.1 304 Not Modified\r\nETag: x\r\n\r\n"),
            Ok(Parsing::Complete)
        );
        assert!(msg.content().is_empty());

        // and a response paired with a HEAD request stops at the headers
        let mut head_resp = Message::response();
        head_resp.set_request_method("HEAD");
        let mut parser = Parser::response(&ParserLimits::default());
        assert_eq!(
            parser.parse(
                &mut head_resp,
                b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"
            ),
            Ok(Parsing::Complete)
        );
    }

    #[test]
    fn chunked_response_body() {
        let (mut parser, mut msg) = response_parser();
        assert_eq!(
            parser.parse(
                &mut msg,
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nwiki\r\n0\r\n\r\n"
            ),
            Ok(Parsing::Complete)
        );
        assert_eq!(msg.content(), b"wiki");
        assert!(msg.is_chunked());
    }
}
