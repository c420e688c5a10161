//! Client for the countersign identity service.

use std::collections::BTreeMap;
use std::sync::Arc;

use error_stack::Report;
use minicbor::Decoder;

use countersign_common::canonical::{CanonicalMap, Value};
use countersign_common::constants::{
    CONTENT_TYPE_CBOR, HEADER_CONTENT_TYPE, HEADER_METHOD, HEADER_PATH,
};
use countersign_common::credentials::Credentials;
use countersign_common::error::CountersignError;
use countersign_common::signing::{Body, SignOptions};

use crate::api_client::{ApiClient, Call, CallOptions};
use crate::exception::service_exception;
use crate::transport::{Endpoint, Transport};

/// Configuration for [`IdentityClient::new`].
#[derive(Debug, Clone)]
pub struct IdentityClientConfig {
    pub project_id: String,
    /// Opaque base64 credential bundle.
    pub credentials: String,
    /// Defaults to the production endpoint when absent.
    pub endpoint: Option<Endpoint>,
}

/// A public key record returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    pub id: String,
    pub alg: String,
    pub key: Vec<u8>,
    pub subject_id: String,
}

/// A client for the countersign identity service.
///
/// Every call is signed and every success response is signature-verified.
pub struct IdentityClient {
    project_id: String,
    api: ApiClient,
}

impl IdentityClient {
    /// Create a client from its configuration and a transport.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when `project_id` or the credential
    /// bundle is missing or invalid.
    pub fn new(
        config: IdentityClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Report<CountersignError>> {
        if config.project_id.is_empty() {
            return Err(Report::new(CountersignError::Configuration {
                message: "'project_id' must be provided".into(),
            }));
        }
        if config.credentials.is_empty() {
            return Err(Report::new(CountersignError::Configuration {
                message: "'credentials' must be provided".into(),
            }));
        }

        let credentials = Credentials::from_base64(&config.credentials)?;
        let endpoint = config.endpoint.unwrap_or_default();

        Ok(Self {
            project_id: config.project_id,
            api: ApiClient::new(transport, Arc::new(credentials), endpoint),
        })
    }

    /// Fetch a public key record by its identifier.
    ///
    /// # Errors
    ///
    /// Returns the decoded service error for non-2xx responses, a
    /// verification error when the success response cannot be trusted, or a
    /// transport error when the exchange itself failed.
    pub async fn get_public_key(
        &self,
        key_id: &str,
    ) -> Result<PublicKeyRecord, Report<CountersignError>> {
        let mut body = CanonicalMap::new();
        body.insert("keyId", Value::Text(key_id.to_owned()));
        body.insert("projectId", Value::Text(self.project_id.clone()));

        let headers = BTreeMap::from([
            (HEADER_PATH.to_string(), "/v1/pks:get".to_string()),
            (HEADER_METHOD.to_string(), "POST".to_string()),
            (
                HEADER_CONTENT_TYPE.to_string(),
                CONTENT_TYPE_CBOR.to_string(),
            ),
        ]);

        let response = self
            .api
            .request(Call {
                headers,
                body: Body::Bytes(body.encode()),
                options: CallOptions {
                    sign_request: true,
                    verify_response: true,
                    sign: SignOptions::default(),
                },
            })
            .await?;

        if !response.is_success() {
            return Err(service_exception(&response.body));
        }

        decode_public_key(&response.body)
    }
}

fn decode_public_key(body: &[u8]) -> Result<PublicKeyRecord, Report<CountersignError>> {
    let malformed = || {
        Report::new(CountersignError::Transport {
            message: "malformed public key record in service response".into(),
        })
    };

    let mut d = Decoder::new(body);
    let Ok(Some(len)) = d.map() else {
        return Err(malformed());
    };

    let mut id = None;
    let mut alg = None;
    let mut key = None;
    let mut subject_id = None;

    for _ in 0..len {
        let field = d.str().map_err(|_| malformed())?;
        match field {
            "id" => id = Some(d.str().map_err(|_| malformed())?.to_owned()),
            "alg" => alg = Some(d.str().map_err(|_| malformed())?.to_owned()),
            "key" => key = Some(d.bytes().map_err(|_| malformed())?.to_vec()),
            "subId" => subject_id = Some(d.str().map_err(|_| malformed())?.to_owned()),
            _ => d.skip().map_err(|_| malformed())?,
        }
    }

    Ok(PublicKeyRecord {
        id: id.ok_or_else(malformed)?,
        alg: alg.ok_or_else(malformed)?,
        key: key.ok_or_else(malformed)?,
        subject_id: subject_id.ok_or_else(malformed)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use countersign_common::constants::HEADER_SIGNATURE;
    use countersign_common::drift::ClockDrift;
    use countersign_common::signing::sign_request;

    use crate::transport::{InboundResponse, OutboundRequest};

    use super::*;

    fn credentials_bundle(issuer_pub: &ed25519_dalek::VerifyingKey, subject: &SigningKey) -> String {
        let mut map = CanonicalMap::new();
        map.insert("_v", Value::Text("v1".into()));
        map.insert("issSigAlg", Value::Text("Ed25519".into()));
        map.insert("issSigKeyId", Value::Text("iss-key-1".into()));
        map.insert("issSigPubKey", Value::Bytes(issuer_pub.as_bytes().to_vec()));
        map.insert("subId", Value::Text("sub-test".into()));
        map.insert("subSigAlg", Value::Text("Ed25519".into()));
        map.insert("subSigKeyId", Value::Text("sub-key-1".into()));
        map.insert("subSigPrivKey", Value::Bytes(subject.to_bytes().to_vec()));
        STANDARD.encode(map.encode())
    }

    struct StaticTransport {
        response: Mutex<Option<InboundResponse>>,
    }

    impl StaticTransport {
        fn new(response: InboundResponse) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
            })
        }
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn send(
            &self,
            _endpoint: &Endpoint,
            _request: OutboundRequest,
        ) -> Result<InboundResponse, Report<CountersignError>> {
            self.response
                .lock()
                .expect("response lock")
                .take()
                .ok_or_else(|| {
                    Report::new(CountersignError::Transport {
                        message: "transport exhausted".into(),
                    })
                })
        }
    }

    /// Client config plus the server credentials that sign its responses.
    fn client_and_server() -> (IdentityClientConfig, Credentials) {
        let client_key = SigningKey::generate(&mut OsRng);
        let server_key = SigningKey::generate(&mut OsRng);

        let config = IdentityClientConfig {
            project_id: "proj-1".into(),
            credentials: credentials_bundle(&server_key.verifying_key(), &client_key),
            endpoint: None,
        };
        let server =
            Credentials::from_base64(&credentials_bundle(&client_key.verifying_key(), &server_key))
                .expect("server bundle should decode");
        (config, server)
    }

    fn signed_response(server: &Credentials, status: u16, body: Vec<u8>) -> InboundResponse {
        let headers = BTreeMap::from([(
            HEADER_CONTENT_TYPE.to_string(),
            CONTENT_TYPE_CBOR.to_string(),
        )]);
        let envelope = sign_request(
            &headers,
            &Body::Bytes(body.clone()),
            server,
            &SignOptions::default(),
            &ClockDrift::new(),
        )
        .expect("server signing should succeed");

        let mut response_headers = headers;
        response_headers.insert(HEADER_SIGNATURE.to_string(), envelope.to_base64());
        InboundResponse {
            status,
            headers: response_headers,
            body,
        }
    }

    fn public_key_record_body() -> Vec<u8> {
        let mut map = CanonicalMap::new();
        map.insert("id", Value::Text("iss-key-1".into()));
        map.insert("alg", Value::Text("Ed25519".into()));
        map.insert("key", Value::Bytes(vec![9u8; 32]));
        map.insert("subId", Value::Text("sub-remote".into()));
        map.encode()
    }

    #[tokio::test]
    async fn fetches_and_decodes_public_key() {
        let (config, server) = client_and_server();
        let transport = StaticTransport::new(signed_response(&server, 200, public_key_record_body()));
        let client = IdentityClient::new(config, transport).expect("client should build");

        let record = client
            .get_public_key("iss-key-1")
            .await
            .expect("lookup should succeed");

        assert_eq!(record.id, "iss-key-1");
        assert_eq!(record.alg, "Ed25519");
        assert_eq!(record.key, vec![9u8; 32]);
        assert_eq!(record.subject_id, "sub-remote");
    }

    #[tokio::test]
    async fn non_2xx_becomes_service_exception() {
        let (config, _) = client_and_server();
        let mut body = CanonicalMap::new();
        body.insert("code", Value::Text("key_not_found".into()));
        body.insert("message", Value::Text("No such key".into()));

        let transport = StaticTransport::new(InboundResponse {
            status: 404,
            headers: BTreeMap::new(),
            body: body.encode(),
        });
        let client = IdentityClient::new(config, transport).expect("client should build");

        let err = client
            .get_public_key("missing")
            .await
            .expect_err("404 becomes a service error");
        assert_eq!(err.to_string(), "service error [key_not_found]: No such key");
    }

    #[tokio::test]
    async fn malformed_success_body_is_an_error() {
        let (config, server) = client_and_server();
        let transport =
            StaticTransport::new(signed_response(&server, 200, b"not a record".to_vec()));
        let client = IdentityClient::new(config, transport).expect("client should build");

        let err = client
            .get_public_key("iss-key-1")
            .await
            .expect_err("malformed body must fail");
        assert!(err.to_string().contains("malformed public key record"));
    }

    #[tokio::test]
    async fn unsigned_success_response_is_rejected() {
        let (config, _) = client_and_server();
        let transport = StaticTransport::new(InboundResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: public_key_record_body(),
        });
        let client = IdentityClient::new(config, transport).expect("client should build");

        let err = client
            .get_public_key("iss-key-1")
            .await
            .expect_err("unsigned success must fail verification");
        assert!(err.to_string().contains("verification failed"));
    }

    #[test]
    fn rejects_empty_project_id() {
        let (mut config, _) = client_and_server();
        config.project_id = String::new();

        let err = IdentityClient::new(
            config,
            StaticTransport::new(InboundResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: Vec::new(),
            }),
        )
        .err()
        .expect("empty project id must fail");
        assert!(err.to_string().contains("'project_id' must be provided"));
    }

    #[test]
    fn rejects_empty_credentials() {
        let (mut config, _) = client_and_server();
        config.credentials = String::new();

        let err = IdentityClient::new(
            config,
            StaticTransport::new(InboundResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: Vec::new(),
            }),
        )
        .err()
        .expect("empty credentials must fail");
        assert!(err.to_string().contains("'credentials' must be provided"));
    }
}
