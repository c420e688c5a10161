//! The signature envelope attached to a signed request or response.
//!
//! On the wire the envelope travels as base64 of its canonical CBOR record in
//! a single metadata header. The signable prefix ([`meta_bytes`]) is the same
//! record without the signature itself, so both sides derive it from the same
//! canonical encoder.
//!
//! [`meta_bytes`]: SignatureEnvelope::meta_bytes

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use error_stack::Report;
use minicbor::Decoder;

use crate::canonical::{CanonicalMap, Value};
use crate::error::CountersignError;

/// Signature metadata for one request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEnvelope {
    /// Signing algorithm identifier.
    pub alg: String,
    /// Opaque identifier of the signing key, for out-of-band key lookup.
    pub key_id: String,
    /// Seconds since epoch at which the envelope was produced.
    pub created: i64,
    /// Optional expiry, seconds since epoch. Absent means no expiry.
    pub expires: Option<i64>,
    /// Exact sorted set of header names covered by the signature.
    pub signed_headers: Vec<String>,
    /// Raw signature bytes. Empty until computed.
    pub sig: Vec<u8>,
}

impl SignatureEnvelope {
    /// Canonical encoding of the signable metadata, every field except `sig`.
    #[must_use]
    pub fn meta_bytes(&self) -> Vec<u8> {
        let mut map = CanonicalMap::new();
        map.insert("alg", Value::Text(self.alg.clone()));
        map.insert("keyId", Value::Text(self.key_id.clone()));
        map.insert("created", Value::Int(self.created));
        if let Some(expires) = self.expires {
            map.insert("expires", Value::Int(expires));
        }
        map.insert(
            "signedHeaders",
            Value::TextArray(self.signed_headers.clone()),
        );
        map.encode()
    }

    /// Transport form: base64 of the full canonical record, `sig` included.
    #[must_use]
    pub fn to_base64(&self) -> String {
        let mut map = CanonicalMap::new();
        map.insert("alg", Value::Text(self.alg.clone()));
        map.insert("keyId", Value::Text(self.key_id.clone()));
        map.insert("created", Value::Int(self.created));
        if let Some(expires) = self.expires {
            map.insert("expires", Value::Int(expires));
        }
        map.insert(
            "signedHeaders",
            Value::TextArray(self.signed_headers.clone()),
        );
        map.insert("sig", Value::Bytes(self.sig.clone()));
        STANDARD.encode(map.encode())
    }

    /// Decode the transport form, validating each field's CBOR type.
    ///
    /// # Errors
    ///
    /// Returns a verification error naming the offending field when the
    /// value is not valid base64, not a canonical record, or carries a
    /// missing or mistyped field.
    pub fn from_base64(value: &str) -> Result<Self, Report<CountersignError>> {
        let raw = STANDARD.decode(value).map_err(|_| {
            Report::new(CountersignError::Verification {
                message: "envelope is not valid base64".into(),
            })
        })?;

        let mut d = Decoder::new(&raw);
        let Ok(Some(len)) = d.map() else {
            return Err(Report::new(CountersignError::Verification {
                message: "envelope is not a canonical record".into(),
            }));
        };

        let mut alg: Option<String> = None;
        let mut key_id: Option<String> = None;
        let mut created: Option<i64> = None;
        let mut expires: Option<i64> = None;
        let mut signed_headers: Option<Vec<String>> = None;
        let mut sig: Option<Vec<u8>> = None;

        for _ in 0..len {
            let key = d
                .str()
                .map_err(|_| malformed_field("key"))?;
            match key {
                "alg" => alg = Some(d.str().map_err(|_| malformed_field("alg"))?.to_owned()),
                "keyId" => {
                    key_id = Some(d.str().map_err(|_| malformed_field("keyId"))?.to_owned());
                }
                "created" => created = Some(d.i64().map_err(|_| malformed_field("created"))?),
                "expires" => expires = Some(d.i64().map_err(|_| malformed_field("expires"))?),
                "signedHeaders" => {
                    signed_headers = Some(decode_text_array(&mut d)?);
                }
                "sig" => sig = Some(d.bytes().map_err(|_| malformed_field("sig"))?.to_vec()),
                _ => d.skip().map_err(|_| malformed_field(key))?,
            }
        }

        Ok(Self {
            alg: alg.ok_or_else(|| missing_field("alg"))?,
            key_id: key_id.ok_or_else(|| missing_field("keyId"))?,
            created: created.ok_or_else(|| missing_field("created"))?,
            expires,
            signed_headers: signed_headers.ok_or_else(|| missing_field("signedHeaders"))?,
            sig: sig.ok_or_else(|| missing_field("sig"))?,
        })
    }
}

fn decode_text_array(d: &mut Decoder<'_>) -> Result<Vec<String>, Report<CountersignError>> {
    let Ok(Some(len)) = d.array() else {
        return Err(malformed_field("signedHeaders"));
    };

    // Length comes from untrusted input; let the Vec grow as entries decode.
    let mut items = Vec::new();
    for _ in 0..len {
        items.push(
            d.str()
                .map_err(|_| malformed_field("signedHeaders"))?
                .to_owned(),
        );
    }
    Ok(items)
}

fn malformed_field(field: &str) -> Report<CountersignError> {
    Report::new(CountersignError::Verification {
        message: format!("envelope field '{field}' is malformed"),
    })
}

fn missing_field(field: &str) -> Report<CountersignError> {
    Report::new(CountersignError::Verification {
        message: format!("envelope is missing field '{field}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> SignatureEnvelope {
        SignatureEnvelope {
            alg: "Ed25519".into(),
            key_id: "iss-key-1".into(),
            created: 1_000,
            expires: Some(1_600),
            signed_headers: vec![":method".into(), ":path".into(), "content-type".into()],
            sig: vec![7u8; 64],
        }
    }

    #[test]
    fn transport_round_trip() {
        let original = envelope();
        let decoded = SignatureEnvelope::from_base64(&original.to_base64())
            .expect("round trip should decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn round_trip_without_expiry() {
        let mut original = envelope();
        original.expires = None;

        let decoded = SignatureEnvelope::from_base64(&original.to_base64())
            .expect("round trip should decode");
        assert_eq!(decoded.expires, None);
        assert_eq!(decoded, original);
    }

    #[test]
    fn meta_bytes_exclude_signature() {
        let mut a = envelope();
        let mut b = envelope();
        a.sig = vec![1u8; 64];
        b.sig = vec![2u8; 64];

        assert_eq!(a.meta_bytes(), b.meta_bytes());
        assert_ne!(a.to_base64(), b.to_base64());
    }

    #[test]
    fn meta_bytes_distinguish_absent_expiry() {
        let with_expiry = envelope();
        let mut without = envelope();
        without.expires = None;

        assert_ne!(with_expiry.meta_bytes(), without.meta_bytes());
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = SignatureEnvelope::from_base64("@@@not-base64@@@").expect_err("must fail");
        assert!(err.to_string().contains("verification failed"));
    }

    #[test]
    fn rejects_non_record_payload() {
        let b64 = STANDARD.encode([0x01u8]); // CBOR unsigned int, not a map
        let err = SignatureEnvelope::from_base64(&b64).expect_err("must fail");
        assert!(format!("{err:?}").contains("not a canonical record"));
    }

    #[test]
    fn rejects_non_numeric_created() {
        let mut map = CanonicalMap::new();
        map.insert("alg", Value::Text("Ed25519".into()));
        map.insert("keyId", Value::Text("iss-key-1".into()));
        map.insert("created", Value::Text("soon".into()));
        map.insert("signedHeaders", Value::TextArray(vec![]));
        map.insert("sig", Value::Bytes(vec![0u8; 64]));
        let b64 = STANDARD.encode(map.encode());

        let err = SignatureEnvelope::from_base64(&b64).expect_err("must fail");
        assert!(format!("{err:?}").contains("created"));
    }

    #[test]
    fn rejects_text_signature() {
        let mut map = CanonicalMap::new();
        map.insert("alg", Value::Text("Ed25519".into()));
        map.insert("keyId", Value::Text("iss-key-1".into()));
        map.insert("created", Value::Int(1_000));
        map.insert("signedHeaders", Value::TextArray(vec![]));
        map.insert("sig", Value::Text("not bytes".into()));
        let b64 = STANDARD.encode(map.encode());

        let err = SignatureEnvelope::from_base64(&b64).expect_err("must fail");
        assert!(format!("{err:?}").contains("sig"));
    }

    #[test]
    fn rejects_missing_signature() {
        let mut map = CanonicalMap::new();
        map.insert("alg", Value::Text("Ed25519".into()));
        map.insert("keyId", Value::Text("iss-key-1".into()));
        map.insert("created", Value::Int(1_000));
        map.insert("signedHeaders", Value::TextArray(vec![]));
        let b64 = STANDARD.encode(map.encode());

        let err = SignatureEnvelope::from_base64(&b64).expect_err("must fail");
        assert!(format!("{err:?}").contains("missing field 'sig'"));
    }

    /// Hand-encode a record whose `signedHeaders` holds `[42]`.
    fn bad_signed_headers_record(
    ) -> Result<Vec<u8>, minicbor::encode::Error<std::convert::Infallible>> {
        let mut buf = Vec::new();
        let mut e = minicbor::Encoder::new(&mut buf);
        e.map(5)?
            .str("alg")?
            .str("Ed25519")?
            .str("created")?
            .i64(1_000)?
            .str("keyId")?
            .str("iss-key-1")?
            .str("sig")?
            .bytes(&[0u8; 64])?
            .str("signedHeaders")?
            .array(1)?
            .i64(42)?;
        Ok(buf)
    }

    #[test]
    fn rejects_non_string_signed_header_entry() {
        let raw = bad_signed_headers_record().expect("test encoding should succeed");
        let b64 = STANDARD.encode(&raw);

        let err = SignatureEnvelope::from_base64(&b64).expect_err("must fail");
        assert!(format!("{err:?}").contains("signedHeaders"));
    }
}
