//! Inbound response verification.

use std::collections::BTreeMap;

use crate::constants::{HEADER_SIGNATURE, SIG_ALG_ED25519};
use crate::credentials::Credentials;
use crate::envelope::SignatureEnvelope;

/// Verify the signature envelope carried on a response.
///
/// Failures are reported as `false`, with the specific reason logged where
/// it is detected; errors are reserved for programming mistakes, of which
/// this path has none. Headers outside the envelope's `signedHeaders` set
/// are unauthenticated by design; tampering with them does not affect the
/// result.
#[must_use]
pub fn verify_response(
    headers: &BTreeMap<String, String>,
    body: &[u8],
    credentials: &Credentials,
    now: i64,
) -> bool {
    let Some(encoded) = headers.get(HEADER_SIGNATURE) else {
        log::warn!("response carries no signature envelope");
        return false;
    };

    let envelope = match SignatureEnvelope::from_base64(encoded) {
        Ok(envelope) => envelope,
        Err(report) => {
            log::warn!("signature envelope rejected: {report:?}");
            return false;
        }
    };

    if envelope.alg != SIG_ALG_ED25519 {
        log::warn!("unsupported signature algorithm: {}", envelope.alg);
        return false;
    }

    if let Some(expires) = envelope.expires {
        if now >= expires {
            log::warn!("signature envelope expired at {expires}, now {now}");
            return false;
        }
    }

    let mut covered = BTreeMap::new();
    for name in &envelope.signed_headers {
        match headers.get(name) {
            Some(value) => {
                covered.insert(name.clone(), value.clone());
            }
            None => {
                log::warn!("response is missing signed header '{name}'");
                return false;
            }
        }
    }

    // TODO: resolve envelope.key_id through a key directory; until one
    // exists every envelope verifies against the single configured issuer key.
    let data = super::signable_bytes(&envelope, &covered, body);
    if credentials.issuer_verify(&data, &envelope.sig) {
        true
    } else {
        log::warn!("signature mismatch for key '{}'", envelope.key_id);
        false
    }
}
