//! Route handlers.
//!
//! Both handlers acquire a pooled context and leave through
//! [`recovery::finish`], so every request is logged and releases its context.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use bytes::Bytes;

use crate::dispatch::{DispatchError, RequestContext};
use crate::http::recovery;
use crate::http::request::{read_form_fields, request_id};
use crate::http::server::AppState;

pub const ROUTE_CALL: &str = "/call";
pub const ROUTE_FALLBACK: &str = "fallback";

const PARAM_ACCOUNT_ID: &str = "accountId";
const PARAM_METHOD: &str = "method";

/// `/call`: dispatch to the registered method named by the `method` field.
pub async fn call_method(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let mut ctx = state.pool.acquire();
    ctx.begin(request.method(), request.uri().path(), request_id(&request));

    let completion = recovery::guard(dispatch(&state, &mut ctx, request)).await;
    recovery::finish(&state, ctx, completion, ROUTE_CALL, start)
}

/// Any other path.
pub async fn path_not_found(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let mut ctx = state.pool.acquire();
    ctx.begin(request.method(), request.uri().path(), request_id(&request));

    let err = DispatchError::PathNotFound(ctx.path().to_string());
    recovery::finish(&state, ctx, Err::<Bytes, _>(err).into(), ROUTE_FALLBACK, start)
}

async fn dispatch(
    state: &AppState,
    ctx: &mut RequestContext,
    request: Request<Body>,
) -> Result<Bytes, DispatchError> {
    if let Err(e) = read_form_fields(request, state.settings.max_body_bytes, ctx.params_mut()).await
    {
        tracing::debug!(request_id = %ctx.request_id(), error = %e, "Unreadable form");
        if e.is_too_large() {
            return Err(DispatchError::PayloadTooLarge {
                limit: state.settings.max_body_bytes,
            });
        }
        return Err(DispatchError::InvalidParameters);
    }

    let account_id: i64 = ctx
        .param(PARAM_ACCOUNT_ID)
        .and_then(|v| v.parse().ok())
        .ok_or(DispatchError::InvalidParameters)?;

    if ctx.param(PARAM_METHOD).map_or(true, str::is_empty) {
        return Err(DispatchError::InvalidParameters);
    }

    ctx.set_account_id(account_id);
    state.accounts.lookup_into(account_id, ctx.account_mut());

    let method = ctx.param(PARAM_METHOD).unwrap_or_default();
    let handler = state
        .registry
        .get(method)
        .ok_or_else(|| DispatchError::UnknownMethod(method.to_string()))?;

    tracing::debug!(
        request_id = %ctx.request_id(),
        account_id,
        method,
        known_account = !ctx.account().is_empty(),
        "Dispatching call"
    );

    Ok(handler.call(ctx).await?)
}
