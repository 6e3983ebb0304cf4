//! Backend response decoding
//!
//! Non-success statuses become [`Error::Api`] carrying the most specific
//! message the body offers. Success bodies that are empty or not JSON decode
//! as an empty object.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::ErrorBody;

/// Used when an error response carries no usable text
pub const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Read a response and decode it into `T`
pub async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let value = read_value(response).await?;
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("Unexpected body: {}", e)))
}

/// Read a response as loosely typed JSON
pub async fn read_value(response: reqwest::Response) -> Result<Value> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await?;

    interpret(status, content_type.as_deref(), &body)
}

/// Map a status, content type and raw body to a JSON value or an error
pub(crate) fn interpret(status: u16, content_type: Option<&str>, body: &[u8]) -> Result<Value> {
    if !(200..300).contains(&status) {
        let message = error_message(body);
        warn!(status, message = %message, "Backend returned an error");
        return Err(Error::Api { status, message });
    }

    let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
    if !is_json || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_slice(body).map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))
}

fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(message) = parsed.into_message() {
            return message;
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    // A JSON object without either field is not useful to show
    if text.is_empty() || text.starts_with('{') {
        FALLBACK_ERROR_MESSAGE.to_string()
    } else {
        text.to_string()
    }
}
