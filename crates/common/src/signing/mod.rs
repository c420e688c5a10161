//! Signing and verification of the authenticated exchange.
//!
//! Both directions hash the same byte sequence: the envelope's canonical
//! metadata, then the canonical map of covered header values, then the raw
//! body. [`sign`] produces that sequence for outbound requests; [`verify`]
//! reproduces it from an inbound response and checks the issuer's signature.

pub mod sign;
pub mod verify;

pub use sign::*;
pub use verify::*;

use std::collections::BTreeMap;

use crate::canonical::{CanonicalMap, Value};
use crate::envelope::SignatureEnvelope;

/// The exact signed byte sequence: meta, then covered headers, then body.
///
/// Only headers named in the envelope's `signedHeaders` contribute; callers
/// on the verify path must have established that each of those names is
/// present in `headers`.
pub(crate) fn signable_bytes(
    envelope: &SignatureEnvelope,
    headers: &BTreeMap<String, String>,
    body: &[u8],
) -> Vec<u8> {
    let mut covered = CanonicalMap::new();
    for name in &envelope.signed_headers {
        if let Some(value) = headers.get(name) {
            covered.insert(name.clone(), Value::Text(value.clone()));
        }
    }

    let mut data = envelope.meta_bytes();
    data.extend_from_slice(&covered.encode());
    data.extend_from_slice(body);
    data
}
