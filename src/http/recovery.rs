//! Recovery boundary.
//!
//! # Responsibilities
//! - Catch panics raised while a request is handled
//! - Turn every outcome into exactly one envelope
//! - Write the debug trace, the access log and the error log
//! - Return the request context to the pool
//!
//! # Design Decisions
//! - Panics are converted into a typed [`Fault`] before classification
//! - A process panic hook records the panic site so the error log can show it
//! - The context guard is dropped here, after the response has been taken

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::FutureExt;

use crate::dispatch::{DispatchError, Envelope, Fault, PooledContext};
use crate::http::server::AppState;
use crate::observability::metrics;

/// Where a panic happened.
#[derive(Debug, Clone)]
pub struct PanicTrace {
    pub location: Option<String>,
    pub backtrace: String,
}

impl PanicTrace {
    /// Location line followed by the backtrace.
    pub fn render(&self) -> String {
        match &self.location {
            Some(location) => format!("at {}\n{}", location, self.backtrace),
            None => self.backtrace.clone(),
        }
    }
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicTrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install the panic hook that records the panic site. Idempotent.
///
/// The previously installed hook still runs.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = PanicTrace {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Trace of the most recent panic on this thread.
pub fn take_panic_trace() -> Option<PanicTrace> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Outcome of the guarded handler path.
#[derive(Debug)]
pub struct Completion {
    pub result: Result<Bytes, DispatchError>,
    /// Set when the fault came from a panic.
    pub trace: Option<PanicTrace>,
}

impl From<Result<Bytes, DispatchError>> for Completion {
    fn from(result: Result<Bytes, DispatchError>) -> Self {
        Self {
            result,
            trace: None,
        }
    }
}

/// Run `fut`, converting a panic into [`DispatchError::Fault`].
pub async fn guard<F>(fut: F) -> Completion
where
    F: Future<Output = Result<Bytes, DispatchError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => Completion::from(result),
        // The hook ran on this thread during the same poll.
        Err(payload) => Completion {
            result: Err(DispatchError::Fault(Fault::from_panic(payload))),
            trace: take_panic_trace(),
        },
    }
}

/// Finalize a request: respond, log, record and release the context.
pub fn finish(
    state: &AppState,
    mut ctx: PooledContext,
    completion: Completion,
    route: &'static str,
    start: Instant,
) -> Response {
    let Completion { result, trace } = completion;
    let settings = &state.settings;

    let envelope = match &result {
        Ok(payload) => Envelope::ok(payload),
        Err(err) => Envelope::message(
            err.status(),
            err.client_message(settings.expose_store_errors),
        ),
    };
    ctx.respond(envelope);
    let status = ctx.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if settings.debug {
        tracing::debug!(
            request_id = %ctx.request_id(),
            status = status.as_u16(),
            method = %ctx.http_method(),
            path = %ctx.path(),
            "Request finished"
        );
    }

    state
        .logs
        .access(status.as_u16(), ctx.http_method().as_str(), ctx.path());

    match &result {
        Ok(_) => {}
        Err(DispatchError::Fault(fault)) => {
            tracing::error!(
                request_id = %ctx.request_id(),
                kind = fault.kind(),
                location = trace.as_ref().and_then(|t| t.location.as_deref()).unwrap_or("unknown"),
                fault = %fault,
                "Recovered fault"
            );
            let stack = trace.as_ref().map(PanicTrace::render);
            state.logs.error(fault, stack.as_deref());
            metrics::record_fault(fault.kind());
        }
        Err(DispatchError::Upstream(err)) => {
            tracing::error!(
                request_id = %ctx.request_id(),
                method = ctx.param("method").unwrap_or_default(),
                error = %err,
                "Method call failed"
            );
        }
        Err(err) => {
            tracing::debug!(
                request_id = %ctx.request_id(),
                error = %err,
                "Request rejected"
            );
        }
    }

    metrics::record_request(route, status.as_u16(), start);

    let envelope = ctx.take_response().unwrap_or_else(Envelope::system_error);
    drop(ctx);
    envelope.into_response()
}
