use crate::{
    http::{request::Parser, response::Response},
    limits::ConnLimits,
    server::server_impl::Handler,
};
use std::{io, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serves exactly one request per accepted stream.
///
/// A worker owns one `HttpConnection` for its whole life and reuses the
/// read buffer across streams.
pub(crate) struct HttpConnection<H: Handler> {
    handler: Arc<H>,
    pub(crate) parser: Parser,
    conn_limits: ConnLimits,
}

impl<H: Handler> HttpConnection<H> {
    #[inline]
    pub(crate) fn new(handler: Arc<H>, limits: ConnLimits) -> Self {
        Self {
            handler,
            parser: Parser::new(&limits),
            conn_limits: limits,
        }
    }
}

impl<H: Handler> HttpConnection<H> {
    /// Reads one request, runs the handler and writes the response.
    ///
    /// Nothing is written when the peer closes before sending any byte or
    /// when a read fails.
    pub(crate) async fn run<S>(&mut self, stream: &mut S) -> Result<(), io::Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.parser.reset();

        if !self.read_request(stream).await? {
            debug!("connection closed before sending a request");
            return Ok(());
        }

        let request = self.parser.parse();
        let mut response = Response::new();

        self.handler.handle(&request, &mut response).await;

        let timeout = self.conn_limits.socket_write_timeout;
        writer::write_bytes(stream, &response.head(), timeout).await?;
        if let Some(tail) = response.binary_tail() {
            writer::write_bytes(stream, tail, timeout).await?;
        }

        stream.shutdown().await
    }

    /// Fills the parser until the headers and the announced body have arrived,
    /// or the peer closes its side.
    ///
    /// Returns `false` if the very first read got no data.
    async fn read_request<S>(&mut self, stream: &mut S) -> Result<bool, io::Error>
    where
        S: AsyncRead + Unpin,
    {
        let timeout = self.conn_limits.socket_read_timeout;

        if self.parser.fill_buffer(stream, timeout).await? == 0 {
            return Ok(false);
        }

        while self.parser.missing_body() != Some(0) {
            if self.parser.fill_buffer(stream, timeout).await? == 0 {
                debug!(
                    received = self.parser.buffer().len(),
                    "peer closed before the request was complete"
                );
                break;
            }
        }

        Ok(true)
    }
}

pub(crate) mod writer {
    use std::io;
    use tokio::{
        io::{AsyncWrite, AsyncWriteExt},
        time::{timeout, Duration},
    };

    #[inline(always)]
    pub(crate) async fn write_bytes<S: AsyncWrite + Unpin>(
        stream: &mut S,
        bytes: &[u8],
        time: Option<Duration>,
    ) -> Result<(), io::Error> {
        match time {
            Some(time) => timeout(time, stream.write_all(bytes)).await?,
            None => stream.write_all(bytes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PathParams, Request, Router, StatusCode};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn echo_router() -> Router {
        Router::new()
            .route("POST", "/echo", |req: &Request, _: &PathParams, resp: &mut Response| {
                resp.status(StatusCode::Ok)
                    .header("X-Form", req.form_field("a").unwrap_or("-"))
                    .body(String::from_utf8_lossy(req.body()));
            })
            .route("GET", "/bin", |_: &Request, _: &PathParams, resp: &mut Response| {
                resp.file("blob.bin", vec![0, 159, 146, 150, b'\r', b'\n']);
            })
    }

    fn connection(limits: ConnLimits) -> HttpConnection<Router> {
        HttpConnection::new(Arc::new(echo_router()), limits)
    }

    /// Runs one connection against `client` writes and returns the raw reply.
    async fn exchange(limits: ConnLimits, chunks: Vec<Vec<u8>>, close: bool) -> Vec<u8> {
        let (mut client, mut server): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let mut conn = connection(limits);

        let task = tokio::spawn(async move {
            let result = conn.run(&mut server).await;
            drop(server);
            result
        });

        for chunk in chunks {
            client.write_all(&chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if close {
            client.shutdown().await.unwrap();
        }

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        task.await.unwrap().unwrap();
        reply
    }

    fn text(reply: &[u8]) -> String {
        String::from_utf8_lossy(reply).into_owned()
    }

    #[tokio::test]
    async fn body_split_across_reads() {
        let chunks = vec![
            b"POST /echo HTTP/1.1\r\nContent-Length: 11\r\n\r\nhel".to_vec(),
            b"lo ".to_vec(),
            b"world".to_vec(),
        ];

        let reply = text(&exchange(ConnLimits::default(), chunks, false).await);

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("Content-Length: 11\r\n"));
        assert!(reply.ends_with("\r\n\r\nhello world"));
    }

    #[tokio::test]
    async fn small_read_buffer() {
        let limits = ConnLimits {
            read_buffer_size: 3,
            ..ConnLimits::default()
        };
        let raw = b"POST /echo HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=1&b=2".to_vec();

        let reply = text(&exchange(limits, vec![raw], false).await);

        assert!(reply.contains("X-Form: 1\r\n"));
        assert!(reply.ends_with("a=1&b=2"));
    }

    #[tokio::test]
    async fn peer_closes_before_full_body() {
        let chunks = vec![b"POST /echo HTTP/1.1\r\nContent-Length: 100\r\n\r\npartial".to_vec()];

        let reply = text(&exchange(ConnLimits::default(), chunks, true).await);

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("\r\n\r\npartial"));
    }

    #[tokio::test]
    async fn invalid_content_length_reads_once() {
        let chunks = vec![b"POST /echo HTTP/1.1\r\nContent-Length: ten\r\n\r\nabc".to_vec()];

        let reply = text(&exchange(ConnLimits::default(), chunks, false).await);

        assert!(reply.ends_with("\r\n\r\nabc"));
    }

    #[tokio::test]
    async fn immediate_close_sends_nothing() {
        let reply = exchange(ConnLimits::default(), vec![], true).await;

        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let chunks = vec![b"GET /missing HTTP/1.1\r\n\r\n".to_vec()];

        let reply = text(&exchange(ConnLimits::default(), chunks, false).await);

        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(reply.ends_with(r#"{"error":"Not Found"}"#));
    }

    #[tokio::test]
    async fn binary_tail_follows_head() {
        let chunks = vec![b"GET /bin HTTP/1.1\r\n\r\n".to_vec()];

        let reply = exchange(ConnLimits::default(), chunks, false).await;
        let split = reply.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;

        let head = text(&reply[..split]);
        assert!(head.contains("Content-Length: 6\r\n"));
        assert!(head.contains("Content-Disposition: attachment; filename=\"blob.bin\"\r\n"));
        assert_eq!(&reply[split..], &[0, 159, 146, 150, b'\r', b'\n']);
    }

    #[tokio::test]
    async fn unterminated_head_is_served_on_close() {
        let chunks = vec![b"GET /missing HTTP/1.1\r\nHost: x\r\n".to_vec()];

        let reply = text(&exchange(ConnLimits::default(), chunks, true).await);

        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn unterminated_head_hits_read_timeout() {
        let limits = ConnLimits {
            socket_read_timeout: Some(Duration::from_millis(30)),
            ..ConnLimits::default()
        };
        let (mut client, mut server) = duplex(1024);
        let mut conn = connection(limits);

        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();

        let err = conn.run(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(conn.parser.buffer().starts_with(b"GET / HTTP/1.1"));
    }

    #[tokio::test]
    async fn read_timeout_abandons_connection() {
        let limits = ConnLimits {
            socket_read_timeout: Some(Duration::from_millis(30)),
            ..ConnLimits::default()
        };
        let (_client, mut server) = duplex(1024);
        let mut conn = connection(limits);

        let err = conn.run(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
