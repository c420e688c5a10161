//! Service-facing client for the countersign identity service.
//!
//! Builds on `countersign-common` for the protocol core and adds the
//! transport seam, the authenticated exchange coordinator, service error
//! decoding, configuration, and the identity RPC surface.
//!
//! # Modules
//!
//! - [`api_client`]: The authenticated exchange coordinator
//! - [`exception`]: Service error decoding for non-2xx responses
//! - [`identity`]: The identity service client
//! - [`settings`]: Configuration management and validation
//! - [`transport`]: The transport trait and request/response types

pub mod api_client;
pub mod exception;
pub mod identity;
pub mod settings;
pub mod transport;
