//! Structured service errors decoded from non-2xx response bodies.

use error_stack::Report;
use minicbor::Decoder;

use countersign_common::error::CountersignError;

const UNKNOWN_ERROR_CODE: &str = "unknown_error";
const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Build the service error carried by a non-2xx response.
///
/// The body is expected to be a CBOR `{code, message}` record; either field
/// falls back independently when missing or undecodable. A service rejection
/// is an expected outcome, distinct from transport or verification failures.
#[must_use]
pub fn service_exception(body: &[u8]) -> Report<CountersignError> {
    let (code, message) = decode_error_record(body);
    Report::new(CountersignError::Service {
        code: code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
        message: message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
    })
}

fn decode_error_record(body: &[u8]) -> (Option<String>, Option<String>) {
    let mut d = Decoder::new(body);
    let Ok(Some(len)) = d.map() else {
        return (None, None);
    };

    let mut code = None;
    let mut message = None;
    for _ in 0..len {
        let Ok(key) = d.str() else {
            break;
        };
        let result = match key {
            "code" => d.str().map(|v| code = Some(v.to_owned())),
            "message" => d.str().map(|v| message = Some(v.to_owned())),
            _ => d.skip(),
        };
        if result.is_err() {
            break;
        }
    }

    (code, message)
}
