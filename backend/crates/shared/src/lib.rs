//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the error vocabulary every HTTP-facing crate speaks:
//! - [`error::app_error::AppError`], the failure value that crosses the service boundary
//! - [`error::kind::ErrorKind`], the status-class taxonomy behind it
//! - `From` conversions for common library errors
//!
//! With the `axum` feature, `AppError` becomes a response and is the single
//! place where a failure is both logged in full and sanitized for the client.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;

    pub use app_error::{AppError, AppResult, BoxError, OptionExt, ResultExt};
    pub use kind::ErrorKind;
}
