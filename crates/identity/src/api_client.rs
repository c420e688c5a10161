//! The authenticated exchange coordinator.
//!
//! One logical call runs sign, send, verify. An unauthorized response
//! whose `date` header reveals material clock drift triggers a single
//! re-sign-and-resend with the corrected clock; every other non-2xx status
//! passes through to the caller untouched, and only 2xx payloads are
//! signature-verified.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::Report;

use countersign_common::constants::{
    HEADER_DATE, HEADER_PROTOCOL_VERSION, HEADER_SIGNATURE, PROTOCOL_VERSION,
};
use countersign_common::credentials::Credentials;
use countersign_common::drift::ClockDrift;
use countersign_common::error::CountersignError;
use countersign_common::signing::{sign_request, verify_response, Body, SignOptions};

use crate::transport::{Endpoint, InboundResponse, OutboundRequest, Transport};

const STATUS_UNAUTHORIZED: u16 = 401;

/// Per-call behavior switches.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub sign_request: bool,
    pub verify_response: bool,
    pub sign: SignOptions,
}

/// One logical call: the signable header map, the body, and options.
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub options: CallOptions,
}

/// Coordinates authenticated exchanges over a pluggable transport.
///
/// Calls may run concurrently; the only state they share is the clock-drift
/// estimator, whose updates are internally synchronized.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<Credentials>,
    endpoint: Endpoint,
    drift: ClockDrift,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<Credentials>,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            transport,
            credentials,
            endpoint,
            drift: ClockDrift::new(),
        }
    }

    /// Execute one logical call.
    ///
    /// Non-2xx responses are returned as-is for the caller to interpret;
    /// verification, when requested, applies to 2xx responses only, and a
    /// failed verification is a hard error.
    ///
    /// # Errors
    ///
    /// Propagates signing validation errors, transport failures, and
    /// verification failures.
    pub async fn request(&self, call: Call) -> Result<InboundResponse, Report<CountersignError>> {
        let body_bytes = call.body.as_bytes().to_vec();
        let mut retried = false;

        loop {
            let mut headers = call.headers.clone();
            headers.insert(
                HEADER_PROTOCOL_VERSION.to_string(),
                PROTOCOL_VERSION.to_string(),
            );

            if call.options.sign_request {
                // The signature covers the caller's headers; the version and
                // signature headers themselves travel unauthenticated.
                let envelope = sign_request(
                    &call.headers,
                    &call.body,
                    &self.credentials,
                    &call.options.sign,
                    &self.drift,
                )?;
                headers.insert(HEADER_SIGNATURE.to_string(), envelope.to_base64());
            }

            let request = OutboundRequest {
                headers,
                body: body_bytes.clone(),
            };
            let response = match self.transport.send(&self.endpoint, request).await {
                Ok(response) => response,
                Err(report) => {
                    log::error!("transport send failed: {report:?}");
                    return Err(report);
                }
            };

            if call.options.sign_request && !retried && response.status == STATUS_UNAUTHORIZED {
                if let Some(remote) = response_date(&response) {
                    if self.drift.observe(remote) {
                        log::info!(
                            "unauthorized response revealed clock drift, retrying with corrected clock"
                        );
                        retried = true;
                        continue;
                    }
                }
            }

            if !response.is_success() {
                // Error responses carry their own schema and are expected to
                // be interpreted by the caller; they are not verified here.
                return Ok(response);
            }

            if call.options.verify_response
                && !verify_response(
                    &response.headers,
                    &response.body,
                    &self.credentials,
                    self.drift.unix_seconds(),
                )
            {
                return Err(Report::new(CountersignError::Verification {
                    message: "response signature could not be verified".into(),
                }));
            }

            return Ok(response);
        }
    }
}

fn response_date(response: &InboundResponse) -> Option<DateTime<Utc>> {
    let raw = response.headers.get(HEADER_DATE)?;
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
