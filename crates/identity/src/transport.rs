//! Transport collaborator consumed by the exchange coordinator.
//!
//! The coordinator is transport-agnostic: anything that can deliver a header
//! map plus body to an authority and hand back `{status, headers, body}`
//! satisfies [`Transport`]. Connection management, timeouts and retry policy
//! below this seam belong to the implementation, not to the protocol core.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use error_stack::Report;

use countersign_common::error::CountersignError;

const DEFAULT_AUTHORITY: &str = "identity.api.countersign.dev";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Https => f.write_str("https"),
        }
    }
}

/// Static endpoint configuration, never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub authority: String,
    pub scheme: Scheme,
}

impl Default for Endpoint {
    /// The production identity service endpoint.
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            scheme: Scheme::Https,
        }
    }
}

/// One outbound request as handed to the transport.
///
/// The header map includes the `:method` / `:path` pseudo-headers; the
/// transport maps them onto its own request representation.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// One inbound response as produced by the transport.
#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl InboundResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The single external suspension point of an authenticated exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `request` to `endpoint` and return the response.
    ///
    /// # Errors
    ///
    /// A transport error is fatal for the exchange: the coordinator logs it
    /// and propagates it unchanged, never retrying at this layer.
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
    ) -> Result<InboundResponse, Report<CountersignError>>;
}
