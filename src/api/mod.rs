//! Built-in record and file API.
//!
//! [`router`] wires an in-memory [`DataStore`] and a directory-backed
//! [`FileStore`] to a [`Router`](crate::Router). Every answer is JSON with
//! `Access-Control-Allow-Origin: *`, except file downloads and the client page.
//!
//! ```no_run
//! use crud_http::{api::{self, ApiConfig}, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crud_http::Error> {
//!     let handle = Server::builder()
//!         .address(([127, 0, 0, 1], 8080))
//!         .handler(api::router(ApiConfig::default()))
//!         .build()?
//!         .spawn();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

mod files;
mod handlers;
mod store;

pub use files::FileStore;
pub use handlers::router;
pub use store::{DataStore, Record};

use std::path::PathBuf;

/// Where the built-in routes keep and find files.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Upload directory, created on demand (default: `uploads`).
    pub upload_dir: PathBuf,
    /// Page served on `GET /` (default: `client.html`).
    pub client_page: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            client_page: PathBuf::from("client.html"),
        }
    }
}
