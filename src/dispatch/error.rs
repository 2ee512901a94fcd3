//! Error taxonomy of the dispatch path.

use std::any::Any;
use std::borrow::Cow;

use axum::http::StatusCode;
use thiserror::Error;

use crate::dispatch::envelope::{
    MSG_INVALID_PARAMETERS, MSG_PATH_NOT_FOUND, MSG_PAYLOAD_TOO_LARGE, MSG_SYSTEM_ERROR,
    MSG_UNKNOWN_METHOD,
};
use crate::dispatch::registry::HandlerError;

/// Why a request did not produce a `200 ok` envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or malformed `accountId`, or empty `method`.
    #[error("invalid parameters")]
    InvalidParameters,

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The form body exceeds `server.max_body_bytes`.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The handler reported a failed upstream call.
    #[error("upstream call failed: {0}")]
    Upstream(#[source] HandlerError),

    /// Unexpected fault raised while handling the call.
    #[error("fault: {0}")]
    Fault(Fault),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::InvalidParameters | DispatchError::UnknownMethod(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::PathNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::Upstream(_) | DispatchError::Fault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the client. Upstream detail never leaves the server.
    pub fn client_message(&self, expose_store_errors: bool) -> Cow<'_, str> {
        match self {
            DispatchError::InvalidParameters => Cow::Borrowed(MSG_INVALID_PARAMETERS),
            DispatchError::UnknownMethod(_) => Cow::Borrowed(MSG_UNKNOWN_METHOD),
            DispatchError::PathNotFound(_) => Cow::Borrowed(MSG_PATH_NOT_FOUND),
            DispatchError::PayloadTooLarge { .. } => Cow::Borrowed(MSG_PAYLOAD_TOO_LARGE),
            DispatchError::Upstream(_) => Cow::Borrowed(MSG_SYSTEM_ERROR),
            DispatchError::Fault(fault) => fault.client_message(expose_store_errors),
        }
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Fault(fault) => DispatchError::Fault(fault),
            other => DispatchError::Upstream(other),
        }
    }
}

/// Error reported by a backing store driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error {code}: {message}")]
pub struct StoreError {
    pub code: u16,
    pub message: String,
}

impl StoreError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A fault recovered by the recovery boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Plain textual fault; the text is shown to the client.
    #[error("{0}")]
    Message(String),

    /// Store driver error; shown only when exposing store errors is enabled.
    #[error("{0}")]
    Store(StoreError),

    /// Anything else. The description is for logs only.
    #[error("{0}")]
    Opaque(String),
}

impl Fault {
    /// Classify a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<String>() {
            Ok(text) => return Fault::Message(*text),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(text) => return Fault::Message((*text).to_string()),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<StoreError>() {
            Ok(err) => return Fault::Store(*err),
            Err(payload) => payload,
        };
        match payload.downcast::<Fault>() {
            Ok(fault) => *fault,
            Err(_) => Fault::Opaque("panic with non-text payload".to_string()),
        }
    }

    pub fn client_message(&self, expose_store_errors: bool) -> Cow<'_, str> {
        match self {
            Fault::Message(text) => Cow::Borrowed(text),
            Fault::Store(err) if expose_store_errors => Cow::Owned(err.to_string()),
            Fault::Store(_) | Fault::Opaque(_) => Cow::Borrowed(MSG_SYSTEM_ERROR),
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Message(_) => "message",
            Fault::Store(_) => "store",
            Fault::Opaque(_) => "opaque",
        }
    }
}
