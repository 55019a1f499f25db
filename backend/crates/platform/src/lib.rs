//! Platform Crate - Technical Infrastructure
//!
//! This crate provides the cross-cutting HTTP plumbing shared by every app:
//! - Structured logging sink (JSON lines to stdout, optional file copy)
//! - Request correlation ids
//! - Request logger middleware (one completion record per request)

pub mod logging;
pub mod request_id;
pub mod request_logger;

pub use logging::{LogConfig, LogFormat, Logger};
pub use request_id::{RequestId, RequestIdLayer};
pub use request_logger::RequestLoggerLayer;
