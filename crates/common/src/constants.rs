// Header names are plain strings rather than `http::HeaderName`: the signable
// map carries HTTP/2 pseudo-headers (":method", ":path") that HeaderName rejects.

pub const HEADER_SIGNATURE: &str = "x-countersign-signature";
pub const HEADER_PROTOCOL_VERSION: &str = "x-countersign-version";
pub const HEADER_METHOD: &str = ":method";
pub const HEADER_PATH: &str = ":path";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_DATE: &str = "date";

pub const PROTOCOL_VERSION: &str = "2024-11-01";
pub const CONTENT_TYPE_CBOR: &str = "application/cbor";

/// The only signature algorithm currently supported.
pub const SIG_ALG_ED25519: &str = "Ed25519";

/// The only credential bundle format currently accepted.
pub const CREDENTIALS_VERSION: &str = "v1";
