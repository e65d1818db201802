use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crud_http::{
    api::{self, ApiConfig},
    limits::ServerLimits,
    Server,
};
use std::{net::Ipv4Addr, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Record store and file exchange over plain HTTP/1.1
#[derive(Parser, Debug)]
#[command(name = "crud-http", version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// IPv4 address to bind
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    host: Ipv4Addr,

    /// Number of connections served concurrently
    #[arg(long, default_value_t = 100)]
    workers: usize,

    /// Directory for uploaded files
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,

    /// Page served on `GET /`
    #[arg(long, default_value = "client.html")]
    client_page: PathBuf,

    /// Log level, overridden by `RUST_LOG`
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ApiConfig {
        upload_dir: cli.upload_dir,
        client_page: cli.client_page,
    };
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("cannot create upload directory {}", config.upload_dir.display()))?;

    let server = Server::builder()
        .address((cli.host, cli.port))
        .handler(api::router(config))
        .server_limits(ServerLimits {
            max_connections: cli.workers,
            ..ServerLimits::default()
        })
        .build()
        .context("failed to start server")?;

    let token = CancellationToken::new();
    tokio::spawn(stop_on_signal(token.clone()));

    info!("listening on http://{}", server.local_addr());
    server.launch(token).await;

    Ok(())
}

/// Cancels `token` on the first SIGINT or SIGTERM.
async fn stop_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(%err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                token.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("shutdown signal received");
    token.cancel();
}
