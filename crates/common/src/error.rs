//! Error types shared across the countersign crates.

use derive_more::{Display, Error};

/// Top-level error type carried in [`error_stack::Report`]s.
///
/// The variants separate the caller-facing failure classes: a broken local
/// setup (`Configuration`), a malformed call (`Validation`), a failed send
/// (`Transport`), an untrustworthy response (`Verification`) and a logical
/// rejection decoded from the service (`Service`).
#[derive(Debug, Display, Error)]
pub enum CountersignError {
    /// Malformed or unsupported credentials / client configuration.
    #[display("configuration error: {message}")]
    Configuration { message: String },

    /// Caller supplied malformed signing options or an unsupported body.
    #[display("validation error: {message}")]
    Validation { message: String },

    /// The underlying transport failed to complete the exchange.
    #[display("transport error: {message}")]
    Transport { message: String },

    /// The response failed signature verification.
    #[display("response verification failed: {message}")]
    Verification { message: String },

    /// Structured error decoded from a non-2xx service response.
    #[display("service error [{code}]: {message}")]
    Service { code: String, message: String },
}
