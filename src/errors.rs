use crate::{Response, StatusCode};
use std::{error, fmt, io, net::SocketAddr};

/// Errors returned by the server itself.
///
/// Per-connection failures never surface here: a connection whose read or
/// write fails is dropped and the server keeps accepting.
#[derive(Debug)]
pub enum Error {
    /// Creating, binding or listening on the socket failed.
    Bind { addr: SocketAddr, source: io::Error },
    /// Any other I/O failure while setting the server up.
    Io(io::Error),
    /// [`ServerBuilder::build`](crate::ServerBuilder::build) was called without a handler.
    MissingHandler,
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Io(err) => Some(err),
            Error::MissingHandler => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::MissingHandler => f.write_str("the `handler` method must be called to build a server"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Failures of the built-in data and file API, each mapped to a status code
/// and a `{"error": …}` body.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// `400`: the request payload could not be used.
    BadRequest(String),
    /// `404`: the record or file does not exist.
    NotFound(&'static str),
    /// `500`: the upload directory could not be read or written.
    Storage(String),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BadRequest,
            ApiError::NotFound(_) => StatusCode::NotFound,
            ApiError::Storage(_) => StatusCode::InternalServerError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) | ApiError::Storage(msg) => msg.as_str(),
            ApiError::NotFound(msg) => *msg,
        }
    }

    /// Writes this error into `resp` as a JSON error response.
    #[inline]
    pub fn write_to(&self, resp: &mut Response) {
        resp.error(self.status(), self.message());
    }
}

impl error::Error for ApiError {}
impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status().as_u16(), self.message())
    }
}

impl From<io::Error> for ApiError {
    fn from(err: io::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Prebuilt reply for connections rejected because the queue is full.
pub(crate) const SERVICE_UNAVAILABLE: &[u8] = concat!(
    "HTTP/1.1 503 Service Unavailable\r\n",
    "Access-Control-Allow-Origin: *\r\n",
    "Content-Length: 31\r\n",
    "Content-Type: application/json\r\n",
    "\r\n",
    r#"{"error":"Service Unavailable"}"#
)
.as_bytes();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_unavailable_length() {
        let raw = std::str::from_utf8(SERVICE_UNAVAILABLE).unwrap();
        let (_, body) = raw.split_once("\r\n\r\n").unwrap();

        assert!(raw.contains(&format!("Content-Length: {}\r\n", body.len())));
    }

    #[test]
    fn api_error_mapping() {
        #[rustfmt::skip]
        let cases = [
            (ApiError::BadRequest("No files uploaded".into()), 400, "No files uploaded"),
            (ApiError::NotFound("Item not found"),             404, "Item not found"),
            (ApiError::Storage("disk full".into()),            500, "disk full"),
        ];

        for (err, status, message) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.message(), message);
        }
    }

    #[test]
    fn bind_error_display() {
        let err = Error::Bind {
            addr: ([127, 0, 0, 1], 80).into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };

        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: in use");
        assert!(error::Error::source(&err).is_some());
    }
}
