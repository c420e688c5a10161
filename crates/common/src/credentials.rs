//! Credential store for one client identity.
//!
//! A credential bundle is an opaque base64 string wrapping a canonical CBOR
//! map. Decoding it yields the subject's Ed25519 signing key (used for
//! outbound signatures) and the issuer's public key (used to verify inbound
//! signatures). The private key never leaves this module except as input to
//! the sign primitive: it is not exposed, not serialized, and not printed by
//! the `Debug` impl.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use error_stack::Report;
use minicbor::Decoder;

use crate::constants::CREDENTIALS_VERSION;
use crate::error::CountersignError;

fn invalid_credentials() -> Report<CountersignError> {
    Report::new(CountersignError::Configuration {
        message: "invalid credentials".into(),
    })
}

/// Immutable key material for one client, loaded once at construction.
pub struct Credentials {
    version: String,
    iss_sig_alg: String,
    iss_sig_key_id: String,
    iss_sig_pub_key: VerifyingKey,
    sub_id: String,
    sub_sig_alg: String,
    sub_sig_key_id: String,
    sub_sig_priv_key: SigningKey,
}

impl Credentials {
    /// Decode a credential bundle.
    ///
    /// Either a complete `Credentials` value is produced or an error is
    /// returned; there is no partially initialized state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the bundle is not valid base64, is
    /// not a well-formed credential record, or carries an unsupported
    /// version tag.
    pub fn from_base64(bundle: &str) -> Result<Self, Report<CountersignError>> {
        let raw = STANDARD
            .decode(bundle.trim())
            .map_err(|_| invalid_credentials())?;
        Self::from_record_bytes(&raw)
    }

    fn from_record_bytes(raw: &[u8]) -> Result<Self, Report<CountersignError>> {
        let mut d = Decoder::new(raw);

        let Ok(Some(len)) = d.map() else {
            return Err(invalid_credentials());
        };

        let mut version: Option<String> = None;
        let mut iss_sig_alg: Option<String> = None;
        let mut iss_sig_key_id: Option<String> = None;
        let mut iss_sig_pub_key: Option<Vec<u8>> = None;
        let mut sub_id: Option<String> = None;
        let mut sub_sig_alg: Option<String> = None;
        let mut sub_sig_key_id: Option<String> = None;
        let mut sub_sig_priv_key: Option<Vec<u8>> = None;

        for _ in 0..len {
            let key = d.str().map_err(|_| invalid_credentials())?;
            match key {
                "_v" => version = Some(read_text(&mut d)?),
                "issSigAlg" => iss_sig_alg = Some(read_text(&mut d)?),
                "issSigKeyId" => iss_sig_key_id = Some(read_text(&mut d)?),
                "issSigPubKey" => iss_sig_pub_key = Some(read_bytes(&mut d)?),
                "subId" => sub_id = Some(read_text(&mut d)?),
                "subSigAlg" => sub_sig_alg = Some(read_text(&mut d)?),
                "subSigKeyId" => sub_sig_key_id = Some(read_text(&mut d)?),
                "subSigPrivKey" => sub_sig_priv_key = Some(read_bytes(&mut d)?),
                _ => d.skip().map_err(|_| invalid_credentials())?,
            }
        }

        let version = version.ok_or_else(invalid_credentials)?;
        if version != CREDENTIALS_VERSION {
            return Err(Report::new(CountersignError::Configuration {
                message: format!("unsupported credentials version: {version}"),
            }));
        }

        let iss_sig_pub_key = parse_verifying_key(iss_sig_pub_key.ok_or_else(invalid_credentials)?)?;
        let sub_sig_priv_key = parse_signing_key(sub_sig_priv_key.ok_or_else(invalid_credentials)?)?;

        Ok(Self {
            version,
            iss_sig_alg: iss_sig_alg.ok_or_else(invalid_credentials)?,
            iss_sig_key_id: iss_sig_key_id.ok_or_else(invalid_credentials)?,
            iss_sig_pub_key,
            sub_id: sub_id.ok_or_else(invalid_credentials)?,
            sub_sig_alg: sub_sig_alg.ok_or_else(invalid_credentials)?,
            sub_sig_key_id: sub_sig_key_id.ok_or_else(invalid_credentials)?,
            sub_sig_priv_key,
        })
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn issuer_sig_alg(&self) -> &str {
        &self.iss_sig_alg
    }

    #[must_use]
    pub fn issuer_key_id(&self) -> &str {
        &self.iss_sig_key_id
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.sub_id
    }

    #[must_use]
    pub fn subject_sig_alg(&self) -> &str {
        &self.sub_sig_alg
    }

    #[must_use]
    pub fn subject_key_id(&self) -> &str {
        &self.sub_sig_key_id
    }

    /// Sign `data` with the subject's private key.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Signature {
        self.sub_sig_priv_key.sign(data)
    }

    /// Verify `sig` over `data` against the issuer's public key.
    ///
    /// Malformed signature bytes verify as `false`, never as an error.
    #[must_use]
    pub fn issuer_verify(&self, data: &[u8], sig: &[u8]) -> bool {
        let Ok(sig_array) = <[u8; 64]>::try_from(sig) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_array);
        self.iss_sig_pub_key.verify(data, &signature).is_ok()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material is deliberately absent.
        f.debug_struct("Credentials")
            .field("version", &self.version)
            .field("iss_sig_alg", &self.iss_sig_alg)
            .field("iss_sig_key_id", &self.iss_sig_key_id)
            .field("sub_id", &self.sub_id)
            .field("sub_sig_alg", &self.sub_sig_alg)
            .field("sub_sig_key_id", &self.sub_sig_key_id)
            .finish_non_exhaustive()
    }
}

fn read_text(d: &mut Decoder<'_>) -> Result<String, Report<CountersignError>> {
    Ok(d.str().map_err(|_| invalid_credentials())?.to_owned())
}

fn read_bytes(d: &mut Decoder<'_>) -> Result<Vec<u8>, Report<CountersignError>> {
    Ok(d.bytes().map_err(|_| invalid_credentials())?.to_vec())
}

fn parse_verifying_key(bytes: Vec<u8>) -> Result<VerifyingKey, Report<CountersignError>> {
    let key_array: [u8; 32] = bytes.try_into().map_err(|_| {
        Report::new(CountersignError::Configuration {
            message: "invalid credentials".into(),
        })
        .attach("issuer public key must be 32 bytes for Ed25519")
    })?;

    VerifyingKey::from_bytes(&key_array).map_err(|_| {
        Report::new(CountersignError::Configuration {
            message: "invalid credentials".into(),
        })
        .attach("issuer public key is not a valid Ed25519 point")
    })
}

fn parse_signing_key(bytes: Vec<u8>) -> Result<SigningKey, Report<CountersignError>> {
    let key_array: [u8; 32] = bytes.try_into().map_err(|_| {
        Report::new(CountersignError::Configuration {
            message: "invalid credentials".into(),
        })
        .attach("subject private key must be 32 bytes for Ed25519")
    })?;

    Ok(SigningKey::from_bytes(&key_array))
}
