//! HTTP response builder and wire serialization.

use crate::http::types::{content_type_for, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

/// Response payload.
///
/// Exactly one variant is sent. A [`Binary`](Body::Binary) payload is written
/// to the socket separately from the head, see [`Response::head`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    /// Number of bytes that will be announced in `Content-Length`.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Body::Text(text) => text.len(),
            Body::Binary(data) => data.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

/// HTTP response builder for constructing server responses.
///
/// A fresh `Response` is `200 OK` with an empty text body. Methods can be
/// chained in any order; the last call for a given part wins.
///
/// `Content-Length` is never taken from the caller: [`head()`](Response::head)
/// computes it from the body and drops any caller-set value.
///
/// # Examples
/// ```
/// use crud_http::{Response, StatusCode};
///
/// let mut resp = Response::new();
/// resp.status(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body("ok");
///
/// assert_eq!(
///     resp.head(),
///     b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nok"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: StatusCode::Ok.as_u16(),
            status_text: StatusCode::Ok.reason().to_owned(),
            headers: BTreeMap::new(),
            body: Body::default(),
        }
    }
}

impl Response {
    #[inline]
    pub fn new() -> Self {
        Response::default()
    }

    #[inline(always)]
    pub const fn status_code(&self) -> u16 {
        self.status
    }

    #[inline(always)]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    #[inline(always)]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns a header value with case-insensitive name matching.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[inline(always)]
    pub const fn body_ref(&self) -> &Body {
        &self.body
    }

    #[inline(always)]
    pub const fn is_binary(&self) -> bool {
        matches!(self.body, Body::Binary(_))
    }
}

// Builder
impl Response {
    /// Sets the status code and its canonical reason phrase.
    #[inline]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status_raw(status.as_u16(), status.reason())
    }

    /// Sets an arbitrary status code and reason phrase.
    ///
    /// ```
    /// use crud_http::Response;
    ///
    /// let mut resp = Response::new();
    /// resp.status_raw(418, "I'm a teapot");
    ///
    /// assert!(resp.head().starts_with(b"HTTP/1.1 418 I'm a teapot\r\n"));
    /// ```
    #[inline]
    pub fn status_raw(&mut self, code: u16, text: impl Into<String>) -> &mut Self {
        self.status = code;
        self.status_text = text.into();
        self
    }

    /// Sets a header, replacing a previous value stored under the same name.
    ///
    /// Setting `Content-Length` has no effect on the wire; it is always
    /// recomputed by [`head()`](Response::head).
    #[inline]
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the body with text.
    #[inline]
    pub fn body(&mut self, text: impl Into<String>) -> &mut Self {
        self.body = Body::Text(text.into());
        self
    }

    /// Replaces the body with raw bytes, sent as a separate write.
    #[inline]
    pub fn binary(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Body::Binary(data.into());
        self
    }

    /// Serializes `value` as the JSON body.
    ///
    /// Sets `Content-Type: application/json` and `Access-Control-Allow-Origin: *`.
    /// If `value` cannot be serialized the response becomes a `500` error.
    ///
    /// ```
    /// use crud_http::{Response, StatusCode};
    /// use serde_json::json;
    ///
    /// let mut resp = Response::new();
    /// resp.json(StatusCode::Created, &json!({"id": "1", "status": "created"}));
    ///
    /// assert_eq!(resp.status_code(), 201);
    /// assert_eq!(resp.header_value("content-type"), Some("application/json"));
    /// ```
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> &mut Self {
        match serde_json::to_string(value) {
            Ok(json) => self.status(status).json_headers().body(json),
            Err(err) => {
                error!(%err, "failed to serialize response body");
                self.error(StatusCode::InternalServerError, "Internal Server Error")
            }
        }
    }

    /// Sets a JSON error body `{"error": message}`.
    #[inline]
    pub fn error(&mut self, status: StatusCode, message: &str) -> &mut Self {
        let body = serde_json::json!({ "error": message }).to_string();
        self.status(status).json_headers().body(body)
    }

    /// Serves file contents.
    ///
    /// HTML is sent as a text body; everything else is sent as a binary
    /// attachment with `Content-Disposition`.
    pub fn file(&mut self, name: &str, data: Vec<u8>) -> &mut Self {
        let content_type = content_type_for(name);

        self.status(StatusCode::Ok)
            .header("Content-Type", content_type)
            .header("Access-Control-Allow-Origin", "*");

        if content_type == "text/html" {
            return self.body(String::from_utf8_lossy(&data));
        }

        self.header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", quoted_filename(name)),
        )
        .binary(data)
    }

    #[inline]
    fn json_headers(&mut self) -> &mut Self {
        self.header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
    }
}

/// Makes `name` safe inside a quoted header parameter: `"` and `\\` are
/// backslash-escaped, control characters become `_`.
fn quoted_filename(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len());

    for c in name.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => quoted.push('_'),
            c => quoted.push(c),
        }
    }

    quoted
}

// Serialization
impl Response {
    /// Builds the first write: status line, headers, `Content-Length` and,
    /// for a text body, the body itself.
    ///
    /// Headers are emitted in name order. For a binary body the payload is
    /// left out; send [`binary_tail()`](Response::binary_tail) right after.
    pub fn head(&self) -> Vec<u8> {
        let text = match &self.body {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(_) => &[],
        };

        let mut buffer = Vec::with_capacity(128 + self.headers.len() * 32 + text.len());

        buffer.extend_from_slice(b"HTTP/1.1 ");
        buffer.extend_from_slice(self.status.to_string().as_bytes());
        buffer.push(b' ');
        buffer.extend_from_slice(self.status_text.as_bytes());
        buffer.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }

            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }

        buffer.extend_from_slice(b"Content-Length: ");
        buffer.extend_from_slice(self.body.len().to_string().as_bytes());
        buffer.extend_from_slice(b"\r\n\r\n");

        buffer.extend_from_slice(text);
        buffer
    }

    /// The second write, present only for a non-empty binary body.
    #[inline]
    pub fn binary_tail(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Binary(data) if !data.is_empty() => Some(data),
            _ => None,
        }
    }
}
