use crate::{
    http::{
        multipart::{self, FilePart},
        query,
        types::{into_text, slice_to_usize, trim_token},
    },
    limits::ConnLimits,
};
use std::{collections::HashMap, io, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::sleep,
};
use tracing::debug;

/// A fully received and decoded HTTP request.
///
/// Parsing is lenient: a malformed request still produces a `Request`, with
/// whatever parts could not be recognised left empty.
///
/// # Input layout
///
/// ```text
/// [METHOD] SP [PATH]?[QUERY] SP [VERSION] CRLF
/// [NAME]: [VALUE] CRLF
/// ...
/// CRLF
/// [BODY]
/// ```
///
/// - Line terminators may be `CRLF` or a bare `LF`.
/// - Header names and values are trimmed of spaces, tabs, `CR` and `LF`.
///   A repeated header name replaces the earlier value.
/// - `[QUERY]` pairs are percent/plus-decoded; pairs without `=` are skipped.
/// - `[BODY]` is everything after the blank line, byte for byte.
///
/// ## Body decoding
///
/// | `Content-Type` contains             | Result                                   |
/// |-------------------------------------|------------------------------------------|
/// | `multipart/form-data; boundary=...` | [`form`](Request::form) and [`files`](Request::files) |
/// | `application/x-www-form-urlencoded` | [`form`](Request::form)                  |
/// | anything else, or missing           | only the raw [`body`](Request::body)     |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) version: String,

    pub(crate) headers: HashMap<String, String>,
    pub(crate) query: HashMap<String, String>,

    pub(crate) body: Vec<u8>,
    pub(crate) form: HashMap<String, String>,
    pub(crate) files: HashMap<String, FilePart>,
}

// Public API
impl Request {
    /// Request method exactly as sent, e.g. `"GET"`.
    #[inline(always)]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without the query string.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Protocol token from the request line, e.g. `"HTTP/1.1"`.
    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All headers under the names the client used.
    #[inline(always)]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns a header value with case-insensitive name matching.
    ///
    /// An exact-case match is preferred when the client sent the same name
    /// in several spellings.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Decoded query parameters.
    #[inline(always)]
    pub const fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    #[inline]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Raw body bytes.
    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decoded form fields from an url-encoded body or non-file multipart parts.
    #[inline(always)]
    pub const fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    #[inline]
    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// Multipart parts that declared a filename, keyed by field name.
    #[inline(always)]
    pub const fn files(&self) -> &HashMap<String, FilePart> {
        &self.files
    }
}

// Parsing
impl Request {
    /// Parses a complete raw request. Never fails.
    ///
    /// ```
    /// use crud_http::Request;
    ///
    /// let req = Request::parse(b"GET /items?page=2 HTTP/1.1\r\nHost: x\r\n\r\n");
    ///
    /// assert_eq!(req.method(), "GET");
    /// assert_eq!(req.path(), "/items");
    /// assert_eq!(req.query_param("page"), Some("2"));
    /// assert_eq!(req.header("host"), Some("x"));
    /// ```
    pub fn parse(raw: &[u8]) -> Request {
        let mut request = Request::default();

        let (head, body) = split_head(raw);
        let mut lines = head.split(|&b| b == b'\n').map(strip_cr);

        if let Some(first_line) = lines.next() {
            request.parse_first_line(first_line);
        }

        for line in lines {
            if line.is_empty() {
                break;
            }
            request.parse_header(line);
        }

        request.body = body.to_vec();
        request.decode_body();

        request
    }

    #[inline]
    fn parse_first_line(&mut self, line: &[u8]) {
        let line = into_text(line);
        let mut parts = line.split_whitespace();

        self.method = parts.next().unwrap_or_default().to_owned();
        let target = parts.next().unwrap_or_default();
        self.version = parts.next().unwrap_or_default().to_owned();

        match target.split_once('?') {
            Some((path, query_string)) => {
                self.path = path.to_owned();
                query::parse_pairs_into(&mut self.query, query_string.as_bytes());
            }
            None => self.path = target.to_owned(),
        }
    }

    #[inline]
    fn parse_header(&mut self, line: &[u8]) {
        let Some(colon) = memchr::memchr(b':', line) else {
            return;
        };

        let name = into_text(trim_token(&line[..colon]));
        let value = into_text(trim_token(&line[colon + 1..]));

        self.headers.insert(name, value);
    }

    fn decode_body(&mut self) {
        let Some(content_type) = self.header("Content-Type") else {
            return;
        };

        if content_type.contains("multipart/form-data") {
            if let Some(boundary) = multipart::boundary(content_type).map(str::to_owned) {
                multipart::parse_into(&self.body, &boundary, &mut self.form, &mut self.files);
            }
        } else if content_type.contains("application/x-www-form-urlencoded") {
            query::parse_pairs_into(&mut self.form, &self.body);
        }
    }
}

/// Splits a raw request at the blank line that ends the header block.
///
/// Without a blank line the whole input is treated as the head.
#[inline]
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    match header_end(raw) {
        Some((head, body_start)) => (&raw[..head], &raw[body_start..]),
        None => (raw, &[]),
    }
}

/// Returns `(end of head, start of body)` if the header terminator has arrived.
#[inline]
fn header_end(raw: &[u8]) -> Option<(usize, usize)> {
    find_terminator(raw, 0)
}

/// Finds the first `\r\n\r\n` or `\n\n` whose final line feed is at or
/// after `from`. Earlier bytes are only read to look behind a line feed.
///
/// Hits are visited in order of their last byte, which is also the order of
/// their first byte, so the earliest terminator wins.
fn find_terminator(raw: &[u8], from: usize) -> Option<(usize, usize)> {
    let start = from.min(raw.len());

    memchr::memchr_iter(b'\n', &raw[start..])
        .map(|pos| start + pos)
        .find_map(|lf| match lf {
            _ if lf >= 1 && raw[lf - 1] == b'\n' => Some((lf - 1, lf + 1)),
            _ if lf >= 3 && &raw[lf - 3..lf] == b"\r\n\r" => Some((lf - 3, lf + 1)),
            _ => None,
        })
}

#[inline(always)]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Finds `Content-Length` in a header block by case-insensitive name.
///
/// The first line (the request line) is skipped. Returns `None` when the
/// header is missing or its value is not a plain decimal number.
pub(crate) fn content_length(head: &[u8]) -> Option<usize> {
    head.split(|&b| b == b'\n').skip(1).find_map(|line| {
        let colon = memchr::memchr(b':', line)?;
        trim_token(&line[..colon])
            .eq_ignore_ascii_case(b"content-length")
            .then(|| slice_to_usize(trim_token(&line[colon + 1..])))
            .flatten()
    })
}

//

/// Accumulates the bytes of one request as they arrive from the socket.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parser {
    chunk_size: usize,
    buffer: Vec<u8>,

    /// Bytes already searched for the header terminator without a hit.
    scanned: usize,
    head: Option<Head>,
}

/// What is known once the header terminator has arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Head {
    body_start: usize,
    content_length: Option<usize>,
}

impl Parser {
    #[inline(always)]
    pub(crate) fn new(limits: &ConnLimits) -> Self {
        let chunk_size = limits.read_buffer_size.max(1);

        Parser {
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            scanned: 0,
            head: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &ConnLimits, value: V) -> Self {
        let mut parser = Parser::new(limits);
        parser.buffer.extend_from_slice(value.as_ref());
        parser
    }

    #[inline(always)]
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.head = None;
    }
}

// Work with Buffer
impl Parser {
    /// Appends at most one chunk read from `stream`, returning the byte count.
    ///
    /// `0` means the peer closed its side.
    pub(crate) async fn fill_buffer<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        time: Option<Duration>,
    ) -> Result<usize, io::Error> {
        let start = self.buffer.len();
        self.buffer.resize(start + self.chunk_size, 0);

        let read_result = match time {
            Some(time) => tokio::select! {
                biased;

                read_result = stream.read(&mut self.buffer[start..]) => read_result,
                _ = sleep(time) => {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
                },
            },
            None => stream.read(&mut self.buffer[start..]).await,
        };

        let n = *read_result.as_ref().unwrap_or(&0);
        self.buffer.truncate(start + n);

        read_result
    }

    /// Body bytes still expected according to `Content-Length`.
    ///
    /// `None` while the header terminator has not arrived. A missing or
    /// unparsable `Content-Length` means nothing more is expected.
    ///
    /// Each call only searches the bytes appended since the previous one, and
    /// after the terminator is found the head is never looked at again.
    pub(crate) fn missing_body(&mut self) -> Option<usize> {
        if self.head.is_none() {
            let Some((head_end, body_start)) = find_terminator(&self.buffer, self.scanned) else {
                self.scanned = self.buffer.len();
                return None;
            };

            let content_length = content_length(&self.buffer[..head_end]);
            if content_length.is_none() {
                debug!("no usable Content-Length, treating the request as complete");
            }

            self.head = Some(Head {
                body_start,
                content_length,
            });
        }

        let head = self.head?;
        let received = self.buffer.len() - head.body_start;

        Some(head.content_length.map_or(0, |len| len.saturating_sub(received)))
    }

    #[inline]
    pub(crate) fn parse(&self) -> Request {
        Request::parse(&self.buffer)
    }
}
