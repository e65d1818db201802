//! `multipart/form-data` body decoding.
//!
//! Body layout handled here:
//! ```text
//! --[BOUNDARY] CRLF
//! Content-Disposition: form-data; name="[NAME]"; filename="[FILE]" CRLF
//! Content-Type: [TYPE] CRLF
//! CRLF
//! [PAYLOAD] CRLF
//! --[BOUNDARY]-- CRLF
//! ```
//! Decoding is best-effort: it stops at the first part whose header block or
//! closing delimiter cannot be found, keeping everything decoded before it.

use crate::http::types::{into_text, trim_token};
use memchr::memmem;
use std::collections::HashMap;

/// A file received as one part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilePart {
    /// Value of `filename="…"` in the part's `Content-Disposition`.
    pub filename: String,
    /// The part's own `Content-Type`, empty when the client did not send one.
    pub content_type: String,
    /// Raw payload, never percent-decoded.
    pub data: Vec<u8>,
}

/// Extracts the `boundary=` parameter from a `Content-Type` value.
///
/// Surrounding quotes and anything after `;`, whitespace or a quote are
/// stripped. Returns `None` when there is no usable boundary.
///
/// ```
/// use crud_http::multipart::boundary;
///
/// assert_eq!(boundary("multipart/form-data; boundary=XyZ"), Some("XyZ"));
/// assert_eq!(boundary("multipart/form-data; boundary=\"XyZ\"; x=1"), Some("XyZ"));
/// assert_eq!(boundary("multipart/form-data"), None);
/// ```
pub fn boundary(content_type: &str) -> Option<&str> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let value = content_type[start..].trim_start_matches('"');

    let end = value
        .find(|c: char| matches!(c, ';' | ' ' | '\t' | '\r' | '\n' | '"'))
        .unwrap_or(value.len());

    Some(&value[..end]).filter(|b| !b.is_empty())
}

/// Decodes `body` into form `fields` and file `files`.
///
/// Parts that declare a `filename` go to `files`; every other part is stored
/// as text in `fields`. Later parts with the same name overwrite earlier ones.
pub fn parse_into(
    body: &[u8],
    boundary: &str,
    fields: &mut HashMap<String, String>,
    files: &mut HashMap<String, FilePart>,
) {
    let delimiter = format!("--{boundary}");
    let finder = memmem::Finder::new(delimiter.as_bytes());

    let Some(first) = finder.find(body) else {
        return;
    };
    let mut pos = first;

    loop {
        pos += delimiter.len();

        if pos >= body.len() || body[pos..].starts_with(b"--") {
            break;
        }

        let Some(header_len) = memmem::find(&body[pos..], b"\r\n\r\n") else {
            break;
        };
        let headers = &body[pos..pos + header_len];
        let content_start = pos + header_len + 4;

        let Some(next) = finder.find(&body[content_start..]) else {
            break;
        };
        let content_end = content_start + next;

        let content = body[content_start..content_end]
            .strip_suffix(b"\r\n")
            .unwrap_or(&body[content_start..content_end]);

        let part = PartHeaders::parse(headers);
        match (part.name, part.filename) {
            (Some(name), Some(filename)) if !filename.is_empty() => {
                let file = FilePart {
                    filename,
                    content_type: part.content_type.unwrap_or_default(),
                    data: content.to_vec(),
                };
                files.insert(name, file);
            }
            (Some(name), _) => {
                fields.insert(name, into_text(content));
            }
            (None, _) => {}
        }

        pos = content_end;
    }
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn parse(block: &[u8]) -> Self {
        let mut part = PartHeaders::default();

        for line in block.split(|&b| b == b'\n') {
            let Some(colon) = memchr::memchr(b':', line) else {
                continue;
            };
            let name = trim_token(&line[..colon]);
            let value = trim_token(&line[colon + 1..]);

            if name.eq_ignore_ascii_case(b"content-disposition") {
                part.name = disposition_name(value);
                part.filename = quoted_param(value, b"filename=\"");
            } else if name.eq_ignore_ascii_case(b"content-type") {
                part.content_type = Some(into_text(value));
            }
        }

        part
    }
}

/// Finds `key` (which ends with the opening quote) and returns the text up to the closing quote.
fn quoted_param(value: &[u8], key: &[u8]) -> Option<String> {
    let start = memmem::find(value, key)? + key.len();
    quoted(&value[start..])
}

/// `name="…"`, skipping matches that are the tail of `filename="…"`.
fn disposition_name(value: &[u8]) -> Option<String> {
    memmem::find_iter(value, b"name=\"")
        .find(|&at| !value[..at].ends_with(b"file"))
        .and_then(|at| quoted(&value[at + 6..]))
}

fn quoted(rest: &[u8]) -> Option<String> {
    let end = memchr::memchr(b'"', rest)?;
    Some(into_text(&rest[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &[u8], boundary: &str) -> (HashMap<String, String>, HashMap<String, FilePart>) {
        let mut fields = HashMap::new();
        let mut files = HashMap::new();
        parse_into(body, boundary, &mut fields, &mut files);
        (fields, files)
    }

    #[test]
    fn field_and_file() {
        let body = b"--X\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
Hi\r\n\
--X\r\n\
Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
Content-Type: image/png\r\n\
\r\n\
\x89PNG\r\n\x00\x01\r\n\
--X--\r\n";

        let (fields, files) = decode(body, "X");

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["title"], "Hi");

        assert_eq!(files.len(), 1);
        let avatar = &files["avatar"];
        assert_eq!(avatar.filename, "a.png");
        assert_eq!(avatar.content_type, "image/png");
        assert_eq!(avatar.data, b"\x89PNG\r\n\x00\x01");
    }

    #[test]
    fn payload_is_not_percent_decoded() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\
\r\n\
a%20b+c\r\n\
--b--";

        let (_, files) = decode(body, "b");
        assert_eq!(files["f"].data, b"a%20b+c");
        assert_eq!(files["f"].content_type, "");
    }

    #[test]
    fn filename_does_not_shadow_name() {
        let body = b"--b\r\n\
Content-Disposition: form-data; filename=\"x.txt\"; name=\"doc\"\r\n\
\r\n\
data\r\n\
--b--";

        let (_, files) = decode(body, "b");
        assert_eq!(files["doc"].filename, "x.txt");
    }

    #[test]
    fn empty_filename_is_a_field() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"\"\r\n\
\r\n\
text\r\n\
--b--";

        let (fields, files) = decode(body, "b");
        assert!(files.is_empty());
        assert_eq!(fields["f"], "text");
    }

    #[test]
    fn malformed_keeps_decoded_prefix() {
        #[rustfmt::skip]
        let cases: [(&[u8], usize); 5] = [
            // second part has no header terminator
            (b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--b\r\nbroken", 1),
            // second part is never closed
            (b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--b\r\n\
Content-Disposition: form-data; name=\"c\"\r\n\r\nno end", 1),
            // no delimiter at all
            (b"just some text", 0),
            // closing marker straight away
            (b"--b--\r\n", 0),
            // delimiter at the very end
            (b"--b", 0),
        ];

        for (body, expected) in cases {
            let (fields, files) = decode(body, "b");
            assert_eq!(fields.len() + files.len(), expected);
        }
    }

    #[test]
    fn duplicate_names_last_wins() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\r\n2\r\n\
--b--";

        let (fields, _) = decode(body, "b");
        assert_eq!(fields["a"], "2");
    }

    #[test]
    fn boundaries() {
        #[rustfmt::skip]
        let cases = [
            ("multipart/form-data; boundary=----WebKitFormBoundary7MA4", Some("----WebKitFormBoundary7MA4")),
            ("multipart/form-data; boundary=\"quoted\"",                 Some("quoted")),
            ("multipart/form-data; boundary=abc; charset=utf-8",          Some("abc")),
            ("multipart/form-data; boundary=abc ",                        Some("abc")),
            ("multipart/form-data; boundary=",                            None),
            ("multipart/form-data",                                       None),
        ];

        for (value, expected) in cases {
            assert_eq!(boundary(value), expected, "{value}");
        }
    }
}
