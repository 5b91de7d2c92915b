//! # korgym-error
//!
//! One error type for every crate in the harness.
//!
//! - **ErrorKind**: what went wrong (e.g. `GameUnavailable`, `InferenceFailed`)
//! - **ErrorStatus**: whether a caller may retry it
//! - **Context**: the operation plus key/value pairs (`game`, `seed`, ...)
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ```rust
//! use korgym_error::{Error, ErrorKind};
//!
//! fn generate() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::GameUnavailable, "connection refused")
//!         .with_operation("client::generate")
//!         .with_context("seed", "7"))
//! }
//!
//! assert_eq!(generate().unwrap_err().kind(), ErrorKind::GameUnavailable);
//! ```
//!
//! Wrap foreign errors with `set_source(err)`. Once an error has been
//! handled, later layers only append context with `with_operation` or
//! `with_context`.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the harness [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
