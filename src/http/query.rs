//! Percent/plus decoding for query strings and `application/x-www-form-urlencoded` bodies.

use crate::http::types::into_text;
use memchr::memchr;
use std::collections::HashMap;

/// Decodes `%XX` escapes and `+` into raw bytes.
///
/// - `%` followed by two hex digits becomes that byte
/// - `+` becomes a space
/// - everything else, including a `%` without two hex digits after it,
///   is copied unchanged
///
/// # Examples
/// ```
/// use crud_http::query::percent_decode;
///
/// assert_eq!(percent_decode(b"a%20b+c"), b"a b c");
/// assert_eq!(percent_decode(b"100%"), b"100%");
/// assert_eq!(percent_decode(b"%zz"), b"%zz");
/// ```
pub fn percent_decode(src: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        match src[i] {
            b'%' => match (src.get(i + 1).and_then(hex), src.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    decoded.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
                _ => decoded.push(b'%'),
            },
            b'+' => decoded.push(b' '),
            byte => decoded.push(byte),
        }

        i += 1;
    }

    decoded
}

/// Same as [`percent_decode`], but returns text (invalid UTF-8 is replaced).
///
/// ```
/// use crud_http::query::decode_str;
///
/// assert_eq!(decode_str(b"user%40example.com"), "user@example.com");
/// ```
#[inline]
pub fn decode_str(src: &[u8]) -> String {
    into_text(&percent_decode(src))
}

/// Parses `key=value` pairs separated by `&` into `result`, decoding both sides.
///
/// The pair is split on the first `=`. Pairs without any `=` are skipped, and
/// a later duplicate key overwrites the earlier one. A leading `?` is ignored.
///
/// # Examples
/// ```
/// use crud_http::query::parse_pairs_into;
/// use std::collections::HashMap;
///
/// let mut params = HashMap::new();
/// parse_pairs_into(&mut params, b"?name=John+Doe&flag&a=1&a=2");
///
/// assert_eq!(params["name"], "John Doe");
/// assert_eq!(params["a"], "2");
/// assert!(!params.contains_key("flag"));
/// ```
pub fn parse_pairs_into(result: &mut HashMap<String, String>, src: &[u8]) {
    let data = match src.first() {
        Some(b'?') => &src[1..],
        _ => src,
    };

    let mut start = 0;
    while start < data.len() {
        let end = memchr(b'&', &data[start..])
            .map(|pos| start + pos)
            .unwrap_or(data.len());

        let pair = &data[start..end];
        if let Some(eq) = memchr(b'=', pair) {
            result.insert(decode_str(&pair[..eq]), decode_str(&pair[eq + 1..]));
        }

        start = end + 1;
    }
}

/// Parses pairs into a fresh map. See [`parse_pairs_into`].
#[inline]
pub fn parse_pairs(src: &[u8]) -> HashMap<String, String> {
    let mut result = HashMap::new();
    parse_pairs_into(&mut result, src);
    result
}

#[inline(always)]
fn hex(byte: &u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
