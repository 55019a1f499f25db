//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

mod routes;

use std::env;
use std::net::SocketAddr;

use platform::logging::LogConfig;
use platform::request_logger::RequestLoggerLayer;
use tokio::net::TcpListener;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // LOG_FILE / RUST_LOG / LOG_FORMAT
    let log_config = LogConfig::from_env();
    let request_logger = RequestLoggerLayer::from_config(&log_config);
    let logger = request_logger.logger().clone();

    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;

    let app = routes::router(request_logger);

    let listener = TcpListener::bind(addr).await?;
    logger.in_scope(|| {
        tracing::info!(
            addr = %addr,
            log_file = ?log_config.file_path,
            "Listening"
        );
    });

    axum::serve(listener, app).await?;

    Ok(())
}
