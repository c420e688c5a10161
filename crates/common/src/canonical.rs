//! Deterministic CBOR encoding of string-keyed maps.
//!
//! The signer and the verifier never share state; they agree on the signed
//! bytes only because both run their inputs through this encoder. Two maps
//! with equal logical content therefore encode byte-identically regardless of
//! insertion order, and any change to a key, a value, or the presence of an
//! optional field changes the output.

use std::collections::BTreeMap;
use std::convert::Infallible;

use minicbor::Encoder;

/// A value that can appear in a canonically encoded map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bytes(Vec<u8>),
    TextArray(Vec<String>),
}

/// Builder for a deterministic CBOR map.
///
/// Keys encode in lexicographic byte order regardless of insertion order.
/// Absent keys are not encoded at all, so an omitted field yields a different
/// byte sequence from a field that is present with a zero value.
#[derive(Debug, Clone, Default)]
pub struct CanonicalMap {
    // BTreeMap iteration order is the canonical key order.
    entries: BTreeMap<String, Value>,
}

impl CanonicalMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Re-inserting a key replaces the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Encode the map to its canonical byte sequence.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.try_encode()
            .expect("CBOR encoding into an in-memory buffer cannot fail")
    }

    fn try_encode(&self) -> Result<Vec<u8>, minicbor::encode::Error<Infallible>> {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);

        e.map(self.entries.len() as u64)?;
        for (key, value) in &self.entries {
            e.str(key)?;
            match value {
                Value::Text(v) => {
                    e.str(v)?;
                }
                Value::Int(v) => {
                    e.i64(*v)?;
                }
                Value::Bytes(v) => {
                    e.bytes(v)?;
                }
                Value::TextArray(items) => {
                    e.array(items.len() as u64)?;
                    for item in items {
                        e.str(item)?;
                    }
                }
            }
        }

        Ok(buf)
    }
}
