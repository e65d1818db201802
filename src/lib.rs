//! crud_http - small hand-rolled HTTP/1.1 server with path-template routing
//!
//! One request per connection, read until the announced `Content-Length`
//! has arrived, dispatched through an ordered route table and answered with
//! a response whose `Content-Length` is always computed by the server.
//!
//! # Protocol Support
//!
//! - **HTTP/1.x request line + headers**, CRLF or bare LF line endings
//! - **Bodies** framed by `Content-Length` only (no chunked encoding)
//! - **Forms**: `application/x-www-form-urlencoded` and `multipart/form-data`
//! - **No keep-alive**: the connection is closed after every response
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use crud_http::{PathParams, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crud_http::Error> {
//!     let router = Router::new()
//!         .route("GET", "/api/users/{id}", |_: &Request, params: &PathParams, resp: &mut Response| {
//!             resp.status(StatusCode::Ok).body(format!("user {}", &params["id"]));
//!         });
//!
//!     Server::builder()
//!         .address(([127, 0, 0, 1], 8080))
//!         .handler(router)
//!         .build()?
//!         .launch(Default::default())
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//! Built-in record and file API, stopped on Ctrl-C:
//! ```no_run
//! use crud_http::{api::{self, ApiConfig}, limits::ServerLimits, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crud_http::Error> {
//!     let handle = Server::builder()
//!         .address(([0, 0, 0, 0], 8080))
//!         .handler(api::router(ApiConfig::default()))
//!         .server_limits(ServerLimits {
//!             max_connections: 32,
//!             ..ServerLimits::default()
//!         })
//!         .build()?
//!         .spawn();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Custom handlers that do their own dispatching implement [`Handler`]
//! directly instead of going through [`Router`].

pub(crate) mod http {
    pub mod multipart;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub mod api;
pub(crate) mod errors;
pub mod limits;
pub(crate) mod router;

pub use crate::{
    errors::{ApiError, Error},
    http::{
        multipart::{self, FilePart},
        query,
        request::Request,
        response::{Body, Response},
        types::{content_type_for, StatusCode},
    },
    router::{PathParams, PathTemplate, Route, RouteHandler, RouteMatch, Router},
    server::server_impl::{Handler, Server, ServerBuilder, ServerHandle},
};
