//! Outbound request signing.

use std::collections::BTreeMap;

use error_stack::Report;

use crate::constants::SIG_ALG_ED25519;
use crate::credentials::Credentials;
use crate::drift::ClockDrift;
use crate::envelope::SignatureEnvelope;
use crate::error::CountersignError;

/// Request body as accepted at the API boundary.
///
/// Text and byte bodies are normalized to one byte-sequence representation
/// before signing; an absent body signs as a zero-length sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

/// Options for one signing operation.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Override for the envelope's `created` field, seconds since epoch.
    /// Defaults to the drift-adjusted current time.
    pub created: Option<i64>,
    /// Envelope lifetime in seconds from `created`; no expiry when absent.
    pub expires_in: Option<i64>,
}

/// Sign an outbound request.
///
/// Every header in `headers` is covered by the signature; the sorted header
/// names become the envelope's `signedHeaders`. Header names are taken
/// verbatim: this layer does not normalize case, so callers own that
/// contract with their transport.
///
/// # Errors
///
/// Fails with a validation error for out-of-range options, or a
/// configuration error when the subject key's algorithm is unsupported.
pub fn sign_request(
    headers: &BTreeMap<String, String>,
    body: &Body,
    credentials: &Credentials,
    options: &SignOptions,
    drift: &ClockDrift,
) -> Result<SignatureEnvelope, Report<CountersignError>> {
    if credentials.subject_sig_alg() != SIG_ALG_ED25519 {
        return Err(Report::new(CountersignError::Configuration {
            message: format!(
                "signature algorithm not supported: {}",
                credentials.subject_sig_alg()
            ),
        }));
    }

    if let Some(created) = options.created {
        if created < 0 {
            return Err(Report::new(CountersignError::Validation {
                message: format!("'created' must be non-negative, got {created}"),
            }));
        }
    }

    if let Some(expires_in) = options.expires_in {
        if expires_in <= 0 {
            return Err(Report::new(CountersignError::Validation {
                message: format!("'expires_in' must be positive, got {expires_in}"),
            }));
        }
    }

    let created = options.created.unwrap_or_else(|| drift.unix_seconds());
    let expires = options.expires_in.map(|lifetime| created + lifetime);

    // BTreeMap keys iterate in lexicographic order, which is the canonical
    // order for the signed header set.
    let signed_headers: Vec<String> = headers.keys().cloned().collect();

    let mut envelope = SignatureEnvelope {
        alg: credentials.subject_sig_alg().to_owned(),
        key_id: credentials.subject_key_id().to_owned(),
        created,
        expires,
        signed_headers,
        sig: Vec::new(),
    };

    let data = super::signable_bytes(&envelope, headers, body.as_bytes());
    envelope.sig = credentials.sign(&data).to_bytes().to_vec();

    Ok(envelope)
}
