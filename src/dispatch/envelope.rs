//! Uniform JSON response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use serde::Serialize;
use serde_json::value::RawValue;

pub const MSG_OK: &str = "ok";
pub const MSG_INVALID_PARAMETERS: &str = "invalid parameters";
pub const MSG_UNKNOWN_METHOD: &str = "unknown method";
pub const MSG_PATH_NOT_FOUND: &str = "path not found";
pub const MSG_PAYLOAD_TOO_LARGE: &str = "request body too large";
pub const MSG_SYSTEM_ERROR: &str = "system error";

/// `{"code": .., "msg": .., "data": ..}` with `data` present only on success.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    /// Envelope without payload.
    pub fn message(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            msg: msg.into(),
            data: None,
        }
    }

    /// `200 ok` with the handler payload as `data`.
    pub fn ok(payload: &[u8]) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            msg: MSG_OK.to_string(),
            data: embed_payload(payload),
        }
    }

    pub fn system_error() -> Self {
        Self::message(StatusCode::INTERNAL_SERVER_ERROR, MSG_SYSTEM_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// JSON payloads are embedded verbatim. Other text becomes a JSON string and
/// binary data (e.g. generated images) a base64 string.
fn embed_payload(payload: &[u8]) -> Option<Box<RawValue>> {
    if payload.is_empty() {
        return None;
    }
    match std::str::from_utf8(payload) {
        Ok(text) => match serde_json::from_str::<Box<RawValue>>(text) {
            Ok(raw) => Some(raw),
            Err(_) => serde_json::value::to_raw_value(text).ok(),
        },
        Err(_) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
            serde_json::value::to_raw_value(&encoded).ok()
        }
    }
}
