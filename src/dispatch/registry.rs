//! Method registry.
//!
//! Maps the `method` field of a call to its handler. The registry is built
//! once before serving and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::dispatch::context::RequestContext;
use crate::dispatch::error::Fault;
use crate::upstream::UpstreamError;

/// Error returned by a method handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("missing parameter '{0}'")]
    MissingParam(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Reported as a recovered fault rather than a masked upstream failure.
    #[error(transparent)]
    Fault(#[from] Fault),
}

pub type HandlerResult = Result<Bytes, HandlerError>;

/// A callable method. The returned bytes become the `data` field of the
/// response envelope.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn call(&self, ctx: &RequestContext) -> HandlerResult;
}

#[async_trait]
impl<F> MethodHandler for F
where
    F: for<'a> Fn(&'a RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &RequestContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Immutable name → handler table.
#[derive(Default, Clone)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. A later registration under the same name replaces the
    /// earlier one.
    pub fn register(mut self, name: impl Into<String>, handler: impl MethodHandler) -> Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(method = %name, "Method registered twice, keeping the latest");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MethodHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}
