//! Error classification
//!
//! Maps raw outcomes onto [`RemoteError`]. Rules apply in this order:
//!
//! 1. the transport failed: `Network` (`NoMachineConnected` if no call
//!    could be addressed at all)
//! 2. non-2xx with a standardized `{error:{code,message,status}}` body:
//!    `RemoteExecution`, carried verbatim
//! 3. non-2xx with any other body: `Unexpected`, built from the status
//! 4. 2xx whose body does not have the expected shape: `Unexpected`

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tsm_common::ApiErrorEnvelope;

use crate::error::{RemoteError, TransportError};
use crate::transport::RawResponse;

/// Code used when a non-2xx response has no standardized body
pub const HTTP_ERROR: &str = "HTTP_ERROR";

/// Code used when a 2xx response has the wrong shape
pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";

/// Rule 1
pub fn classify_transport(error: &TransportError, operation: &str) -> RemoteError {
    match error {
        TransportError::NotConnected => RemoteError::no_machine(),
        other => {
            debug!("Transport failure while trying to {}: {}", operation, other);
            RemoteError::network(other.to_string())
        }
    }
}

/// Rules 2 and 3; `None` for a 2xx response
pub fn classify_status(response: &RawResponse, operation: &str) -> Option<RemoteError> {
    if response.is_success() {
        return None;
    }

    if let Some(envelope) = standard_error(response) {
        return Some(RemoteError::remote_execution(envelope.error, response.status));
    }

    let message = loose_error_message(response.json.as_ref()).unwrap_or_else(|| {
        format!(
            "Failed to {}: {} {}",
            operation, response.status, response.status_text
        )
        .trim_end()
        .to_string()
    });

    Some(RemoteError::unexpected(HTTP_ERROR, message, response.status))
}

/// Rule 4: decode a 2xx body into `T`
///
/// `shape` names what was expected, for the error details.
pub fn expect_shape<T: DeserializeOwned>(response: &RawResponse, shape: &str) -> Result<T, RemoteError> {
    let mismatch = || {
        RemoteError::unexpected(INVALID_RESPONSE, "Invalid response format from API", response.status)
            .with_details(format!("Expected {} in response", shape))
    };

    let body = response.json.clone().ok_or_else(mismatch)?;
    serde_json::from_value(body).map_err(|e| {
        debug!("Response shape mismatch ({}): {}", shape, e);
        mismatch()
    })
}

/// Rules 1 to 3 over a whole outcome, yielding the raw 2xx response
pub fn check(outcome: Result<RawResponse, TransportError>, operation: &str) -> Result<RawResponse, RemoteError> {
    let response = outcome.map_err(|e| classify_transport(&e, operation))?;
    match classify_status(&response, operation) {
        Some(error) => Err(error),
        None => Ok(response),
    }
}

/// Rules 1 to 4 over a whole outcome
pub fn interpret<T: DeserializeOwned>(
    outcome: Result<RawResponse, TransportError>,
    operation: &str,
    shape: &str,
) -> Result<T, RemoteError> {
    let response = check(outcome, operation)?;
    expect_shape(&response, shape)
}

fn standard_error(response: &RawResponse) -> Option<ApiErrorEnvelope> {
    let body = response.json.as_ref()?;
    let envelope: ApiErrorEnvelope = serde_json::from_value(body.clone()).ok()?;

    let complete = !envelope.error.code.is_empty()
        && !envelope.error.message.is_empty()
        && envelope.error.status != 0;
    complete.then_some(envelope)
}

/// `{"error": "text"}` or `{"error": {"message": "text"}}`
fn loose_error_message(body: Option<&Value>) -> Option<String> {
    match body?.get("error")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}
