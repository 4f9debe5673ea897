use crate::core::errors::CallError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound call envelope: `{"command": ..., "arguments": {...}}`
#[derive(Serialize)]
struct ApiRequest<'a, A: ?Sized> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<&'a A>,
}

/// Inbound call envelope
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: bool,
    #[serde(default)]
    return_data: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_descr: Option<String>,
    /// Top-level extras such as `streamSessionId` on login
    #[serde(flatten)]
    rest: Map<String, Value>,
}

pub fn encode_request<A>(command: &str, arguments: Option<&A>) -> Result<String, serde_json::Error>
where
    A: Serialize + ?Sized,
{
    serde_json::to_string(&ApiRequest { command, arguments })
}

/// Unwrap a response envelope into its payload
///
/// The payload is `returnData` when present, otherwise whatever other
/// top-level fields the venue sent (as an object), otherwise `null`.
pub fn decode_response(data: &[u8]) -> Result<Value, CallError> {
    let response: ApiResponse = serde_json::from_slice(data)
        .map_err(|e| CallError::Decode(format!("invalid response envelope: {}", e)))?;

    if !response.status {
        return Err(CallError::Remote {
            code: response.error_code.unwrap_or_default(),
            description: response.error_descr.unwrap_or_default(),
        });
    }

    Ok(match response.return_data {
        Some(return_data) => return_data,
        None if !response.rest.is_empty() => Value::Object(response.rest),
        None => Value::Null,
    })
}

pub fn decode_payload<T: DeserializeOwned>(command: &str, payload: Value) -> Result<T, CallError> {
    serde_json::from_value(payload)
        .map_err(|e| CallError::Decode(format!("invalid {} payload: {}", command, e)))
}
