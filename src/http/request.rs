//! Request decoding.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Collect form fields from the query string and the request body
//!
//! # Design Decisions
//! - Body fields override query fields with the same name
//! - Multipart file parts are skipped; only text fields are kept
//! - The body is read at most once, bounded by the configured limit
//! - A declared `Content-Length` above the limit is rejected before reading

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request, StatusCode};
use thiserror::Error;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM: &str = "multipart/form-data";

/// Failure to decode the form of a `/call` request.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error("invalid multipart body: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl FormError {
    fn multipart(limit: usize, status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return FormError::TooLarge { limit };
        }
        FormError::Multipart { status, message }
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, FormError::TooLarge { .. })
    }
}

/// Request ID set by the request-id layer, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Decode query and body form fields into `fields`.
pub async fn read_form_fields(
    request: Request<Body>,
    limit: usize,
    fields: &mut HashMap<String, String>,
) -> Result<(), FormError> {
    if let Some(query) = request.uri().query() {
        extend_urlencoded(fields, query.as_bytes());
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();

    let is_form =
        content_type.starts_with(MULTIPART_FORM) || content_type.starts_with(FORM_URLENCODED);
    if is_form && declared_length(&request).is_some_and(|len| len > limit) {
        return Err(FormError::TooLarge { limit });
    }

    if content_type.starts_with(MULTIPART_FORM) {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| FormError::multipart(limit, e.status(), e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FormError::multipart(limit, e.status(), e.body_text()))?
        {
            if field.file_name().is_some() {
                continue;
            }
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| FormError::multipart(limit, e.status(), e.body_text()))?;
            fields.insert(name, value);
        }
    } else if content_type.starts_with(FORM_URLENCODED) {
        let body = axum::body::to_bytes(request.into_body(), limit)
            .await
            .map_err(FormError::Body)?;
        extend_urlencoded(fields, &body);
    }

    Ok(())
}

fn declared_length<B>(request: &Request<B>) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn extend_urlencoded(fields: &mut HashMap<String, String>, input: &[u8]) {
    fields.extend(
        url::form_urlencoded::parse(input).map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
}
