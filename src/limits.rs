//! Server configuration limits and timeouts
//!
//! All structs implement [`Default`]; override only the fields you need.
//!
//! # Examples
//!
//! ```no_run
//! use crud_http::{
//!     limits::{ConnLimits, ServerLimits},
//!     Router, Server,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crud_http::Error> {
//!     let server = Server::builder()
//!         .address(([127, 0, 0, 1], 8080))
//!         .handler(Router::new())
//!         .server_limits(ServerLimits {
//!             max_connections: 16,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Some(Duration::from_secs(5)),
//!             ..ConnLimits::default()
//!         })
//!         .build()?;
//!
//!     server.launch(Default::default()).await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

/// Controls listener setup, worker pool size and overload behavior.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   No    /----------------\   Yes  [-------------]
/// [ Add to queue ] <====== | Queue is full? | =====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [--------]   Yes   /-------------------------\   No   [------]
/// [ Worker ] <====== | Is there a free worker? | =====> [ Wait ]
/// [--------]         \-------------------------/        [------]
/// ```
///
/// Every worker is a long-lived task spawned once at launch. It takes one
/// stream from the queue, serves exactly one request on it and closes it.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. connections served at the same time (default: `100`).
    pub max_connections: usize,

    /// Accepted connections allowed to wait for a worker (default: `250`).
    ///
    /// Connections accepted while the queue is full receive an immediate
    /// `503 Service Unavailable` and are closed.
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue to fill (default: `Sleep(50μs)`).
    pub wait_strategy: WaitStrategy,

    /// Listen backlog passed to `listen(2)` (default: `10`).
    pub backlog: i32,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            backlog: 10,

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are available
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// Keeps latency lowest at the cost of a fully busy CPU core.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    Sleep(Duration),
}

/// Per-connection read sizing and timeouts
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Bytes requested from the socket per read call (default: `8192`).
    ///
    /// The request buffer grows by this amount until the whole request,
    /// including a body announced by `Content-Length`, has arrived.
    pub read_buffer_size: usize,

    /// Maximum wait for each socket read (default: `None`).
    ///
    /// `None` waits for the peer indefinitely. When the timeout fires the
    /// connection is abandoned without a response.
    ///
    /// A request is read until its blank line and announced body arrive or
    /// the peer closes. With `None`, a client that never finishes its header
    /// block keeps one worker busy for as long as it holds the socket open.
    pub socket_read_timeout: Option<Duration>,

    /// Maximum duration of each response write (default: `None`).
    pub socket_write_timeout: Option<Duration>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            read_buffer_size: 8192,
            socket_read_timeout: None,
            socket_write_timeout: None,

            _priv: (),
        }
    }
}
