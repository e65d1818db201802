use crate::{
    errors::{Error, SERVICE_UNAVAILABLE},
    http::{request::Request, response::Response},
    limits::{ConnLimits, ServerLimits, WaitStrategy},
    server::connection::{writer, HttpConnection},
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::{yield_now, JoinHandle},
    time::sleep as tokio_sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A trait for handling HTTP requests and generating responses.
///
/// [`Router`](crate::Router) implements it; implement it yourself to take
/// over dispatching entirely.
///
/// # Examples
///
/// ```
/// use crud_http::{Handler, Request, Response, StatusCode};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     async fn handle(&self, req: &Request, resp: &mut Response) {
///         resp.status(StatusCode::Ok)
///             .body(String::from_utf8_lossy(req.body()));
///     }
/// }
/// ```
pub trait Handler
where
    Self: Sync + Send + 'static,
{
    /// Fills `response` for `request`.
    ///
    /// Errors are expected to be turned into a status code on the response.
    /// A panic drops the connection without an answer.
    fn handle(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> impl Future<Output = ()> + Send;
}

/// An HTTP server that serves one request per connection on a fixed pool
/// of worker tasks.
///
/// # Examples
///
/// ```no_run
/// use crud_http::{PathParams, Request, Response, Router, Server, StatusCode};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), crud_http::Error> {
///     let router = Router::new().route(
///         "GET",
///         "/hello/{name}",
///         |_: &Request, params: &PathParams, resp: &mut Response| {
///             resp.status(StatusCode::Ok).body(format!("Hello, {}!", &params["name"]));
///         },
///     );
///
///     let token = CancellationToken::new();
///     Server::builder()
///         .address(([127, 0, 0, 1], 8080))
///         .handler(router)
///         .build()?
///         .launch(token)
///         .await;
///
///     Ok(())
/// }
/// ```
pub struct Server<H: Handler> {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<H>,
    server_limits: ServerLimits,
    conn_limits: ConnLimits,
}

impl<H: Handler> Server<H> {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            handler: None,

            server_limits: None,
            connection_limits: None,
        }
    }

    /// Address the listener is bound to, with the real port if `0` was requested.
    #[inline(always)]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `token` is cancelled.
    ///
    /// On cancellation the listener is closed first, then workers finish the
    /// connections already queued, and this future resolves once every worker
    /// has exited. A connection stuck in a read without a timeout delays that.
    pub async fn launch(self, token: CancellationToken) {
        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());
        let stopped = CancellationToken::new();

        let worker_count = self.server_limits.max_connections.max(1);
        let mut workers = Vec::with_capacity(worker_count + 1);
        for _ in 0..worker_count {
            workers.push(self.spawn_worker(&stream_queue, &stopped));
        }
        workers.push(self.spawn_alarmist(&error_queue, &stopped));

        info!(addr = %self.local_addr, workers = worker_count, "server started");

        loop {
            let accepted = tokio::select! {
                biased;

                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) if stream_queue.len() < self.server_limits.max_pending_connections => {
                    stream_queue.push(stream)
                }
                Ok((stream, addr)) => {
                    warn!(%addr, "connection queue is full, answering 503");
                    error_queue.push(stream)
                }
                Err(err) => warn!(%err, "failed to accept connection"),
            }
        }

        drop(self.listener);
        stopped.cancel();
        info!(pending = stream_queue.len(), "listener closed, draining workers");

        for worker in workers {
            let _ = worker.await;
        }

        info!("server stopped");
    }

    /// Binds a fresh token to the server and runs it in the background.
    pub fn spawn(self) -> ServerHandle {
        let token = CancellationToken::new();
        let local_addr = self.local_addr;

        ServerHandle {
            local_addr,
            task: Some(tokio::spawn(self.launch(token.clone()))),
            token,
        }
    }

    #[inline]
    fn spawn_worker(&self, queue: &TcpQueue, stopped: &CancellationToken) -> JoinHandle<()> {
        let queue = queue.clone();
        let stopped = stopped.clone();
        let wait = self.server_limits.wait_strategy.clone();
        let mut conn = HttpConnection::new(self.handler.clone(), self.conn_limits.clone());

        tokio::spawn(async move {
            while let Some(mut stream) = next_stream(&queue, &wait, &stopped).await {
                if let Err(err) = conn.run(&mut stream).await {
                    debug!(%err, "connection abandoned");
                }
            }
        })
    }

    #[inline]
    fn spawn_alarmist(&self, queue: &TcpQueue, stopped: &CancellationToken) -> JoinHandle<()> {
        let queue = queue.clone();
        let stopped = stopped.clone();
        let wait = self.server_limits.wait_strategy.clone();
        let timeout = self.conn_limits.socket_write_timeout;

        tokio::spawn(async move {
            while let Some(mut stream) = next_stream(&queue, &wait, &stopped).await {
                let _ = writer::write_bytes(&mut stream, SERVICE_UNAVAILABLE, timeout).await;
                let _ = stream.shutdown().await;
            }
        })
    }
}

/// Pops the next stream, waiting while the queue is empty.
///
/// Returns `None` once `stopped` is cancelled and the queue is drained.
#[inline]
async fn next_stream(
    queue: &TcpQueue,
    wait: &WaitStrategy,
    stopped: &CancellationToken,
) -> Option<TcpStream> {
    loop {
        if let Some(stream) = queue.pop() {
            return Some(stream);
        }

        if stopped.is_cancelled() {
            return None;
        }

        match wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
        }
    }
}

/// Creates the listening socket: `SO_REUSEADDR`, non-blocking, custom backlog.
fn bind(addr: SocketAddr, backlog: i32) -> Result<TcpListener, Error> {
    let bind_err = |source| Error::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;

    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(backlog).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

//

/// Controls a server started with [`Server::spawn`].
///
/// Dropping the handle cancels the server without waiting for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    #[inline(always)]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The token driving the server; cancelling it is the same as [`shutdown`](Self::shutdown)
    /// without the wait.
    #[inline]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops accepting and waits until every worker has finished.
    pub async fn shutdown(mut self) {
        self.token.cancel();

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
pub struct ServerBuilder<H: Handler> {
    address: SocketAddr,
    handler: Option<Arc<H>>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
}

impl<H: Handler> ServerBuilder<H> {
    /// Address to listen on (default: `0.0.0.0:8080`). Port `0` picks a free port.
    #[inline(always)]
    pub fn address(mut self, address: impl Into<SocketAddr>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the request handler that will process incoming requests.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Configures worker pool, queue and listener limits.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection read sizing and timeouts.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Binds the listener and constructs a [`Server`].
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - [`Error::MissingHandler`] if [`handler`](Self::handler) was not called
    /// - [`Error::Bind`] if the socket cannot be created, bound or put into listening mode
    pub fn build(self) -> Result<Server<H>, Error> {
        let handler = self.handler.ok_or(Error::MissingHandler)?;
        let server_limits = self.server_limits.unwrap_or_default();
        let conn_limits = self.connection_limits.unwrap_or_default();

        let listener = bind(self.address, server_limits.backlog)?;
        let local_addr = listener.local_addr()?;

        Ok(Server {
            listener,
            local_addr,
            handler,
            server_limits,
            conn_limits,
        })
    }
}

type TcpQueue = Arc<SegQueue<TcpStream>>;
